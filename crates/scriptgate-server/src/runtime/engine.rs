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

//! Script Execution Engine
//!
//! Turns script text into an [`ExecutionResult`]:
//!
//! 1. Prepare: terminate statements at line breaks, declare assigned names
//!    and capture a trailing bare expression into the reserved result slot
//! 2. Compile; a failure is a `SyntaxError` and nothing runs
//! 3. Resolve module paths and calls against the capability set
//! 4. Run on a fresh namespace with a private output buffer
//! 5. Resolve the result: the captured tail value, then the first of
//!    [`RESULT_NAMES`] that is bound and not `()`
//! 6. Render the value to text before leaving the execution thread
//!
//! Every failure is captured in the result; nothing propagates out of
//! [`Engine::execute`], including panics in the execution thread.
//!
//! The engine holds no state between calls and can be shared freely.

use std::any::Any;
use std::time::{Duration, Instant};

use rhai::{Dynamic, Scope};
use scriptgate_common::{ExceptionKind, GateError};
use tracing::{debug, info, warn};

use super::errors::{Context, Failure};
use super::format::{render_error, render_success, render_value};
use super::resolve::check_names;
use super::rewrite::{prepare, RESULT_SLOT};
use crate::namespace::{CapabilitySet, Namespace};
use crate::resource_limits::ResourceLimits;

/// Well-known variables checked, in order, when no tail value was captured.
pub const RESULT_NAMES: &[&str] = &["result", "data", "output", "res"];

/// Stack for the execution thread. Deep user recursion and nested
/// expressions are bounded separately, this just has to cover them.
const EXEC_STACK_SIZE: usize = 64 * 1024 * 1024;

const EXEC_THREAD_NAME: &str = "scriptgate-exec";

/// Expression nesting allowed at the top level and inside functions.
const MAX_EXPR_DEPTH: usize = 256;
const MAX_FUNCTION_EXPR_DEPTH: usize = 128;

/// Operations between deadline checks.
const DEADLINE_CHECK_INTERVAL: u64 = 256;

/// One traceback entry, outermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    pub line: usize,
    pub function: String,
    /// The offending source line, trimmed.
    pub source: Option<String>,
    /// Caret offset into `source`, for syntax errors.
    pub caret: Option<usize>,
}

/// A failed execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorInfo {
    pub error: GateError,
    pub traceback: Vec<TraceFrame>,
}

impl ErrorInfo {
    /// An error with no traceback, e.g. one raised before parsing.
    pub fn new(error: GateError) -> Self {
        Self {
            error,
            traceback: Vec::new(),
        }
    }

    /// Builds the traceback from a classified failure and the script text.
    pub fn from_failure(failure: Failure, text: &str) -> Self {
        if let GateError::Syntax { line, column, .. } = &failure.error {
            let (source, caret) = match source_line(text, *line) {
                Some((trimmed, indent)) => {
                    (Some(trimmed), Some(column.saturating_sub(1).saturating_sub(indent)))
                }
                None => (None, None),
            };
            let frame = TraceFrame {
                line: *line,
                function: "<script>".to_string(),
                source,
                caret,
            };
            return Self {
                error: failure.error,
                traceback: vec![frame],
            };
        }

        let traceback = failure
            .frames
            .into_iter()
            .map(|(line, function)| TraceFrame {
                line,
                function,
                source: source_line(text, line).map(|(trimmed, _)| trimmed),
                caret: None,
            })
            .collect();
        Self {
            error: failure.error,
            traceback,
        }
    }
}

/// Trimmed source line and the width of its indentation, in characters.
fn source_line(text: &str, line: usize) -> Option<(String, usize)> {
    let raw = text.lines().nth(line.checked_sub(1)?)?;
    let trimmed = raw.trim_start();
    let indent = raw.chars().count() - trimmed.chars().count();
    Some((trimmed.trim_end().to_string(), indent))
}

/// Outcome of one script run.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Everything the script printed, including before a failure.
    pub stdout: String,
    /// Rendered result value.
    pub value: Option<String>,
    pub error: Option<ErrorInfo>,
    pub elapsed: Duration,
}

impl ExecutionResult {
    /// A result for an error raised outside the script itself.
    pub fn failure(error: GateError) -> Self {
        Self {
            stdout: String::new(),
            value: None,
            error: Some(ErrorInfo::new(error)),
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Renders the result as the text returned to the caller.
    pub fn render(&self, show_diagnostics: bool) -> String {
        match &self.error {
            None => render_success(&self.stdout, self.value.as_deref()),
            Some(info) => render_error(info, &self.stdout, show_diagnostics),
        }
    }
}

/// Stateless script executor.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    limits: ResourceLimits,
}

impl Engine {
    pub fn new(limits: ResourceLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Runs a script on a dedicated thread and waits for it.
    ///
    /// The calling thread only blocks; script values never leave the
    /// execution thread. A panic there becomes a `RuntimeError` result.
    pub fn execute(&self, text: &str, capabilities: &CapabilitySet) -> ExecutionResult {
        let started = Instant::now();
        let result = std::thread::scope(|scope| {
            let spawned = std::thread::Builder::new()
                .name(EXEC_THREAD_NAME.to_string())
                .stack_size(EXEC_STACK_SIZE)
                .spawn_scoped(scope, || self.run(text, capabilities));

            match spawned {
                Ok(handle) => handle.join().unwrap_or_else(|panic| {
                    let message = panic_message(panic.as_ref());
                    warn!(%message, "Execution thread panicked");
                    ExecutionResult::failure(GateError::exec(
                        ExceptionKind::RuntimeError,
                        format!("execution aborted: {}", message),
                    ))
                }),
                Err(err) => ExecutionResult::failure(GateError::exec(
                    ExceptionKind::RuntimeError,
                    format!("failed to start execution thread: {}", err),
                )),
            }
        });
        ExecutionResult {
            elapsed: started.elapsed(),
            ..result
        }
    }

    /// Runs a script on the current thread.
    pub fn run(&self, text: &str, capabilities: &CapabilitySet) -> ExecutionResult {
        let started = Instant::now();
        debug!(len = text.len(), prefix = %preview(text), "Executing script");

        let result = match self.run_program(text, capabilities) {
            Ok((stdout, value)) => ExecutionResult {
                stdout,
                value,
                error: None,
                elapsed: started.elapsed(),
            },
            Err((stdout, failure)) => ExecutionResult {
                stdout,
                value: None,
                error: Some(ErrorInfo::from_failure(failure, text)),
                elapsed: started.elapsed(),
            },
        };

        match &result.error {
            None => info!(
                elapsed_ms = result.elapsed.as_millis() as u64,
                len = text.len(),
                "Script executed"
            ),
            Some(info) => info!(
                elapsed_ms = result.elapsed.as_millis() as u64,
                category = info.error.category(),
                "Script failed: {}",
                info.error
            ),
        }
        result
    }

    fn configure(&self, namespace: &mut Namespace) {
        let engine = namespace.engine_mut();
        engine.set_max_call_levels(self.limits.max_call_depth);
        engine.set_max_array_size(self.limits.max_collection_len);
        engine.set_max_map_size(self.limits.max_collection_len);
        engine.set_max_string_size(self.limits.max_collection_len);
        engine.set_max_expr_depths(MAX_EXPR_DEPTH, MAX_FUNCTION_EXPR_DEPTH);

        let deadline = Instant::now() + self.limits.execution_timeout;
        engine.on_progress(move |ops| {
            if ops % DEADLINE_CHECK_INTERVAL == 0 && Instant::now() >= deadline {
                Some(Dynamic::UNIT)
            } else {
                None
            }
        });
    }

    #[allow(clippy::type_complexity)]
    fn run_program(
        &self,
        text: &str,
        capabilities: &CapabilitySet,
    ) -> Result<(String, Option<String>), (String, Failure)> {
        let prepared = prepare(text);
        let mut namespace = capabilities.instantiate();
        self.configure(&mut namespace);

        let mut scope = Scope::new();
        scope.push_dynamic(RESULT_SLOT, Dynamic::UNIT);
        for name in &prepared.declared {
            scope.push_dynamic(name.as_str(), Dynamic::UNIT);
        }

        let ast = namespace
            .engine()
            .compile_with_scope(&scope, &prepared.source)
            .map_err(|err| {
                let mut failure = Failure::from_parse(&err);
                if let GateError::Syntax { line, column, .. } = &mut failure.error {
                    *column = prepared.original_column(*line, *column);
                }
                (String::new(), failure)
            })?;
        check_names(&prepared, &namespace).map_err(|(error, line)| {
            let mut failure = Failure::new(error);
            failure.frames.push((line, "<script>".to_string()));
            (String::new(), failure)
        })?;

        let outcome = namespace.engine().run_ast_with_scope(&mut scope, &ast);
        let stdout = namespace.take_output();
        if let Err(err) = outcome {
            let is_bound = |name: &str| namespace.is_bound(name);
            let context = Context {
                timeout: self.limits.execution_timeout,
                is_bound: &is_bound,
            };
            return Err((stdout, Failure::from_eval(&err, &context)));
        }

        let value = resolve_result(&scope, prepared.captured).map(|v| render_value(&v));
        Ok((stdout, value))
    }
}

fn resolve_result(scope: &Scope<'_>, captured: bool) -> Option<Dynamic> {
    let present = |name: &str| {
        scope
            .get_value::<Dynamic>(name)
            .map(Dynamic::flatten)
            .filter(|v| !v.is_unit())
    };
    if captured {
        if let Some(value) = present(RESULT_SLOT) {
            return Some(value);
        }
    }
    RESULT_NAMES.iter().find_map(|name| present(name))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn preview(text: &str) -> String {
    const PREVIEW_CHARS: usize = 60;
    let mut prefix: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        prefix.push_str("...");
    }
    prefix.replace('\n', "\\n")
}
