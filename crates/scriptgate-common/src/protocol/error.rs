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

use std::fmt;

use thiserror::Error;

/// Runtime exception categories a script can raise.
///
/// The names match what script authors expect to read in a traceback, so
/// `Display` prints the bare category (`ZeroDivisionError`, `KeyError`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    TypeError,
    ValueError,
    ZeroDivisionError,
    IndexError,
    KeyError,
    AttributeError,
    OverflowError,
    RecursionError,
    TimeoutError,
    MemoryError,
    RuntimeError,
}

impl ExceptionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ExceptionKind::TypeError => "TypeError",
            ExceptionKind::ValueError => "ValueError",
            ExceptionKind::ZeroDivisionError => "ZeroDivisionError",
            ExceptionKind::IndexError => "IndexError",
            ExceptionKind::KeyError => "KeyError",
            ExceptionKind::AttributeError => "AttributeError",
            ExceptionKind::OverflowError => "OverflowError",
            ExceptionKind::RecursionError => "RecursionError",
            ExceptionKind::TimeoutError => "TimeoutError",
            ExceptionKind::MemoryError => "MemoryError",
            ExceptionKind::RuntimeError => "RuntimeError",
        }
    }
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fault reported by the external terminal when it rejects an operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("terminal error {code}: {message}")]
pub struct TerminalFault {
    pub code: i64,
    pub message: String,
}

impl TerminalFault {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GateError {
    #[error("SyntaxError: {message} (line {line}, column {column})")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("ForbiddenPatternError: script contains forbidden pattern '{pattern}' ({reason})")]
    ForbiddenPattern { pattern: String, reason: String },

    #[error("NameError: {0}")]
    NameResolution(String),

    #[error("{kind}: {message}")]
    Execution { kind: ExceptionKind, message: String },

    #[error("ResourceError: {operation} failed{}", fault_suffix(.fault))]
    Resource {
        operation: String,
        #[source]
        fault: Option<TerminalFault>,
    },

    #[error("AdmissionRejected: Rate limit exceeded: {limit} requests per {window_secs}s")]
    AdmissionRejected { limit: u32, window_secs: u64 },

    #[error("LifecycleError: {0}")]
    Lifecycle(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),
}

fn fault_suffix(fault: &Option<TerminalFault>) -> String {
    match fault {
        Some(fault) => format!(" (code {}): {}", fault.code, fault.message),
        None => String::new(),
    }
}

impl GateError {
    /// Shorthand for a runtime exception of the given kind.
    pub fn exec(kind: ExceptionKind, message: impl Into<String>) -> Self {
        GateError::Execution {
            kind,
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::exec(ExceptionKind::TypeError, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::exec(ExceptionKind::ValueError, message)
    }

    /// Taxonomy bucket this error belongs to.
    ///
    /// Runtime exceptions of every kind collapse into `ExecutionError`; the
    /// precise kind is still available through [`GateError::exception_name`].
    pub fn category(&self) -> &'static str {
        match self {
            GateError::Syntax { .. } => "SyntaxError",
            GateError::ForbiddenPattern { .. } => "ForbiddenPatternError",
            GateError::NameResolution(_) => "NameResolutionError",
            GateError::Execution { .. } => "ExecutionError",
            GateError::Resource { .. } => "ResourceError",
            GateError::AdmissionRejected { .. } => "AdmissionRejected",
            GateError::Lifecycle(_) => "LifecycleError",
            GateError::InvalidRequest(_) => "InvalidRequest",
            GateError::Transport(_) | GateError::JsonSerialization(_) => "TransportError",
            GateError::Timeout(_) => "Timeout",
        }
    }

    /// Name shown as the last line of a traceback.
    pub fn exception_name(&self) -> &'static str {
        match self {
            GateError::NameResolution(_) => "NameError",
            GateError::Execution { kind, .. } => kind.name(),
            other => other.category(),
        }
    }

    /// Whether this error is rejected before any terminal call is attempted.
    pub fn is_pre_execution(&self) -> bool {
        matches!(
            self,
            GateError::Syntax { .. }
                | GateError::ForbiddenPattern { .. }
                | GateError::NameResolution(_)
                | GateError::AdmissionRejected { .. }
        )
    }
}

impl From<serde_json::Error> for GateError {
    fn from(err: serde_json::Error) -> Self {
        GateError::JsonSerialization(err.to_string())
    }
}

impl From<std::io::Error> for GateError {
    fn from(err: std::io::Error) -> Self {
        GateError::Transport(err.to_string())
    }
}

impl From<std::net::AddrParseError> for GateError {
    fn from(err: std::net::AddrParseError) -> Self {
        GateError::InvalidRequest(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GateError>;
