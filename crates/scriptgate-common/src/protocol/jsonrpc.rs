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

//! JSON-RPC 2.0 Envelope
//!
//! Every call to a node is one JSON-RPC 2.0 request posted over HTTP. A node
//! answers these methods:
//!
//! | Method | Params | Result |
//! |--------|--------|--------|
//! | `execute` | `{"command": str, "show_traceback"?: bool}` | rendered script output (string) |
//! | `query` | `{"operation": str, "args"?: object}` | terminal data as JSON |
//! | `_info` | none | node description (object) |
//! | `_health` | none | `{"status": "healthy"}` |
//!
//! Script failures are not protocol errors: they come back as a successful
//! response whose text starts with `Error`. Error objects are reserved for
//! requests the node refuses to run.
//!
//! # Error Codes
//!
//! | Code | Meaning | HTTP status |
//! |------|---------|-------------|
//! | `-32700` | body is not JSON | 200 |
//! | `-32600` | not a request object | 200 |
//! | `-32601` | unknown method | 200 |
//! | `-32602` | missing or malformed params | 200 |
//! | `-32603` | handler failed | 200 |
//! | `-32000` | other gateway error | 200 |
//! | `-32001` | body over the size limit | 413 |
//! | `-32029` | caller over its admission budget | 429 |
//!
//! The HTTP status column is applied by
//! [`HttpTransport::status_for`](crate::transport::http::HttpTransport::status_for).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const SERVER_ERROR: i32 = -32000;
/// Body exceeded the node's size limit.
pub const REQUEST_TOO_LARGE: i32 = -32001;
/// Caller exceeded its admission budget.
pub const RATE_LIMITED: i32 = -32029;

const VERSION: &str = "2.0";

/// A call to one of the node's methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    /// `null` when the caller sent no params.
    #[serde(default)]
    pub params: Value,
    pub id: Value,
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Value, id: Value) -> Self {
        Self {
            jsonrpc: VERSION.into(),
            method: method.into(),
            params,
            id,
        }
    }
}

/// Reply to a [`JsonRpcRequest`]. Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: VERSION.into(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: VERSION.into(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error() -> Self {
        Self::new(PARSE_ERROR, "Parse error")
    }

    pub fn invalid_request() -> Self {
        Self::new(INVALID_REQUEST, "Invalid Request")
    }

    pub fn method_not_found() -> Self {
        Self::new(METHOD_NOT_FOUND, "Method not found")
    }

    pub fn invalid_params(msg: &str) -> Self {
        Self::new(INVALID_PARAMS, msg)
    }

    pub fn internal_error(msg: &str) -> Self {
        Self::new(INTERNAL_ERROR, msg)
    }

    pub fn server_error(msg: &str) -> Self {
        Self::new(SERVER_ERROR, msg)
    }

    pub fn request_too_large(limit: usize) -> Self {
        Self::new(
            REQUEST_TOO_LARGE,
            format!("Request body too large (max {} bytes)", limit),
        )
    }

    /// Admission rejection.
    ///
    /// `message` is the sentence shown to web callers; `data` repeats the
    /// threshold and window so clients can rebuild the typed error.
    pub fn rate_limited(limit: u32, window_secs: u64) -> Self {
        let per = match window_secs {
            60 => "minute".to_string(),
            secs => format!("{} seconds", secs),
        };
        Self {
            data: Some(json!({ "max_requests": limit, "window_secs": window_secs })),
            ..Self::new(
                RATE_LIMITED,
                format!("Rate limit exceeded: {} requests per {}.", limit, per),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_request_from_wire() {
        let body = r#"{"jsonrpc":"2.0","method":"execute","params":{"command":"1/0","show_traceback":true},"id":"a1"}"#;
        let request: JsonRpcRequest = serde_json::from_str(body).unwrap();
        assert_eq!(request.method, "execute");
        assert_eq!(request.params["command"], "1/0");
        assert_eq!(request.params["show_traceback"], true);
        assert_eq!(request.id, json!("a1"));
    }

    #[test]
    fn test_info_request_without_params() {
        let request: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"_info","id":7}"#).unwrap();
        assert_eq!(request.params, Value::Null);

        let sent = serde_json::to_value(JsonRpcRequest::new("_info", Value::Null, json!(7))).unwrap();
        assert_eq!(sent, json!({"jsonrpc": "2.0", "method": "_info", "params": null, "id": 7}));
    }

    #[test]
    fn test_success_omits_error_member() {
        let response = JsonRpcResponse::success(json!(1), json!("40"));
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"jsonrpc": "2.0", "result": "40", "id": 1})
        );
    }

    #[test]
    fn test_error_omits_result_member() {
        let response = JsonRpcResponse::error(json!(2), JsonRpcError::method_not_found());
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"jsonrpc": "2.0", "error": {"code": -32601, "message": "Method not found"}, "id": 2})
        );

        let parsed: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","result":null,"error":{"code":-32602,"message":"missing 'command'","data":null},"id":2}"#,
        )
        .unwrap();
        assert_eq!(parsed.result, None);
        assert_eq!(parsed.error, Some(JsonRpcError::invalid_params("missing 'command'")));
    }

    #[test]
    fn test_rate_limited_wording_and_data() {
        let error = JsonRpcError::rate_limited(10, 60);
        assert_eq!(error.code, RATE_LIMITED);
        assert_eq!(error.message, "Rate limit exceeded: 10 requests per minute.");
        assert_eq!(error.data, Some(json!({"max_requests": 10, "window_secs": 60})));

        let error = JsonRpcError::rate_limited(3, 5);
        assert_eq!(error.message, "Rate limit exceeded: 3 requests per 5 seconds.");
    }

    #[test]
    fn test_request_too_large_names_limit() {
        let error = JsonRpcError::request_too_large(1024);
        assert_eq!(error.code, REQUEST_TOO_LARGE);
        assert_eq!(error.message, "Request body too large (max 1024 bytes)");
        assert_eq!(error.data, None);
    }
}
