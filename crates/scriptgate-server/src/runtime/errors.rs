// Copyright 2025 ScriptGate Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Mapping engine errors onto the gateway's taxonomy.
//!
//! Native functions fail by raising a [`GateError`] wrapped in a runtime
//! error ([`raise`]). Everything the engine raises on its own is classified
//! by [`Failure::from_eval`] into the closest exception kind, and the chain
//! of script function calls becomes the traceback.

use std::time::Duration;

use rhai::{Dynamic, EvalAltResult, ParseError, ParseErrorType, Position};
use scriptgate_common::{ExceptionKind, GateError};

pub type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

/// Raises `error` inside the running script.
pub fn raise(error: GateError) -> Box<EvalAltResult> {
    EvalAltResult::ErrorRuntime(Dynamic::from(error), Position::NONE).into()
}

/// Raises a runtime exception of `kind`.
pub fn exception(kind: ExceptionKind, message: impl Into<String>) -> Box<EvalAltResult> {
    raise(GateError::exec(kind, message))
}

pub fn type_error(message: impl Into<String>) -> Box<EvalAltResult> {
    raise(GateError::type_error(message))
}

pub fn value_error(message: impl Into<String>) -> Box<EvalAltResult> {
    raise(GateError::value_error(message))
}

/// A classified failure and the script frames active when it happened,
/// as `(line, function)` pairs, outermost first.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub error: GateError,
    pub frames: Vec<(usize, String)>,
}

/// What the classifier needs to know about the run that failed.
pub struct Context<'a> {
    pub timeout: Duration,
    /// Whether a function name is bound in the namespace.
    pub is_bound: &'a dyn Fn(&str) -> bool,
}

impl Failure {
    pub fn new(error: GateError) -> Self {
        Self {
            error,
            frames: Vec::new(),
        }
    }

    /// Classifies a compilation failure.
    ///
    /// A read of an undeclared variable is a name error; anything else is a
    /// syntax error at the reported position.
    pub fn from_parse(err: &ParseError) -> Self {
        let position = err.position();
        let line = position.line().unwrap_or(1);
        let error = match err.err_type() {
            ParseErrorType::VariableUndefined(name) => {
                GateError::NameResolution(format!("name '{}' is not defined", name))
            }
            ParseErrorType::ModuleUndefined(name) => {
                GateError::NameResolution(format!("name '{}' is not defined", name))
            }
            other => GateError::Syntax {
                message: other.to_string(),
                line,
                column: position.position().unwrap_or(1),
            },
        };
        Self {
            error,
            frames: vec![(line, "<script>".to_string())],
        }
    }

    /// Classifies a runtime failure and unwinds its call chain.
    pub fn from_eval(err: &EvalAltResult, context: &Context<'_>) -> Self {
        let mut frames = Vec::new();
        let mut function = "<script>".to_string();
        let mut line = 0;
        let mut current = err;

        while let EvalAltResult::ErrorInFunctionCall(name, _, inner, position) = current {
            line = position.line().unwrap_or(line);
            frames.push((line, function));
            function = name.to_string();
            current = inner;
        }
        frames.push((current.position().line().unwrap_or(line), function));

        Self {
            error: classify(current, context),
            frames,
        }
    }
}

fn classify(err: &EvalAltResult, context: &Context<'_>) -> GateError {
    use EvalAltResult::*;

    match err {
        ErrorRuntime(value, _) => match value.clone().try_cast::<GateError>() {
            Some(error) => error,
            None => GateError::exec(ExceptionKind::RuntimeError, value.to_string()),
        },
        ErrorArithmetic(message, _) => {
            let lower = message.to_lowercase();
            if lower.contains("by zero") {
                GateError::exec(ExceptionKind::ZeroDivisionError, "division by zero")
            } else if lower.contains("overflow") {
                GateError::exec(ExceptionKind::OverflowError, message.clone())
            } else {
                GateError::value_error(message.clone())
            }
        }
        ErrorStackOverflow(_) => GateError::exec(
            ExceptionKind::RecursionError,
            "maximum recursion depth exceeded",
        ),
        ErrorTerminated(..) | ErrorTooManyOperations(_) => GateError::exec(
            ExceptionKind::TimeoutError,
            format!(
                "execution exceeded {} ms",
                context.timeout.as_millis()
            ),
        ),
        ErrorDataTooLarge(what, _) => GateError::exec(
            ExceptionKind::MemoryError,
            format!("{} exceeds the collection limit", what),
        ),
        ErrorVariableNotFound(name, _) => {
            GateError::NameResolution(format!("name '{}' is not defined", name))
        }
        ErrorModuleNotFound(name, _) => {
            GateError::NameResolution(format!("name '{}' is not defined", name))
        }
        ErrorFunctionNotFound(signature, _) => function_not_found(signature, context),
        ErrorPropertyNotFound(name, _) => GateError::exec(
            ExceptionKind::AttributeError,
            format!("no attribute '{}'", name),
        ),
        ErrorIndexNotFound(key, _) => GateError::exec(ExceptionKind::KeyError, key.to_string()),
        ErrorArrayBounds(len, index, _) | ErrorStringBounds(len, index, _) => GateError::exec(
            ExceptionKind::IndexError,
            format!("index {} out of range for length {}", index, len),
        ),
        ErrorMismatchDataType(expected, actual, _) | ErrorMismatchOutputType(expected, actual, _) => {
            GateError::type_error(format!("expected {}, found {}", expected, actual))
        }
        ErrorIndexingType(ty, _) => GateError::type_error(format!("{} cannot be indexed", ty)),
        ErrorFor(_) => GateError::type_error("for loop requires an iterable value"),
        ErrorDotExpr(message, _) => GateError::type_error(message.clone()),
        ErrorAssignmentToConstant(name, _) => {
            GateError::type_error(format!("cannot assign to constant '{}'", name))
        }
        ErrorParsing(kind, position) => GateError::Syntax {
            message: kind.to_string(),
            line: position.line().unwrap_or(1),
            column: position.position().unwrap_or(1),
        },
        other => GateError::exec(ExceptionKind::RuntimeError, other.to_string()),
    }
}

/// Unmatched calls are type errors when the name exists with another
/// signature (or is an operator), and name errors otherwise.
fn function_not_found(signature: &str, context: &Context<'_>) -> GateError {
    let name = signature
        .split_once(" (")
        .map_or(signature, |(name, _)| name)
        .trim();
    let operator = !name
        .chars()
        .any(|c| c.is_alphanumeric() || c == '_');

    if operator {
        let operands = signature.trim_start_matches(name).trim();
        GateError::type_error(format!("unsupported operand types for {}: {}", name, operands))
    } else if (context.is_bound)(name) {
        GateError::type_error(format!("no overload of {} accepts {}", name, signature))
    } else {
        GateError::NameResolution(format!("function '{}' is not defined", signature))
    }
}
