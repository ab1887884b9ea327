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

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

pub type RequestId = u64;

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A single script submission.
///
/// On the wire the script text may be sent as `text` or `command`, and the
/// diagnostics flag as `show_diagnostics` or `show_traceback`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScriptRequest {
    #[serde(alias = "command")]
    pub text: String,
    #[serde(default, alias = "show_traceback")]
    pub show_diagnostics: bool,
}

impl ScriptRequest {
    pub fn new(text: impl Into<String>) -> Self {
        ScriptRequest {
            text: text.into(),
            show_diagnostics: false,
        }
    }

    pub fn with_diagnostics(mut self, show_diagnostics: bool) -> Self {
        self.show_diagnostics = show_diagnostics;
        self
    }
}

/// A structured terminal query: one whitelisted read-only operation with
/// named parameters, answered as JSON instead of rendered text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryRequest {
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl QueryRequest {
    pub fn new(operation: impl Into<String>) -> Self {
        QueryRequest {
            operation: operation.into(),
            symbol: None,
            parameters: Map::new(),
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }
}

/// Generates a process-unique JSON-RPC request id.
pub fn generate_request_id() -> RequestId {
    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    let counter = REQUEST_ID_COUNTER.fetch_add(1, Ordering::SeqCst);

    // upper 32 bits from the clock, lower 32 bits from the counter
    (timestamp & 0xFFFFFFFF00000000) | (counter & 0xFFFFFFFF)
}
