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

//! HTTP Transport Utilities
//!
//! This module provides HTTP-specific utilities for the JSON-RPC protocol
//! spoken between ScriptGate clients and nodes.
//!
//! # Architecture
//!
//! The HTTP transport layer provides:
//! - Parsing JSON-RPC requests from HTTP bodies
//! - Creating HTTP responses from JSON-RPC responses
//! - Mapping [`GateError`] values onto JSON-RPC error objects and status codes
//!
//! # Example
//!
//! ```no_run
//! use scriptgate_common::transport::http::HttpTransport;
//! use scriptgate_common::protocol::JsonRpcResponse;
//! use serde_json::json;
//!
//! let request = HttpTransport::build_request(
//!     "execute",
//!     json!({"command": "result = 2 + 2"}),
//!     json!(1)
//! );
//!
//! let jsonrpc_response = JsonRpcResponse::success(json!(1), json!("4"));
//! let http_response = HttpTransport::to_http_response(jsonrpc_response);
//! ```

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Request, Response, StatusCode};

use crate::protocol::error::GateError;
use crate::protocol::jsonrpc::{INVALID_PARAMS, RATE_LIMITED, REQUEST_TOO_LARGE};
use crate::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};

/// Type alias for Hyper incoming requests
pub type HyperRequest = Request<Incoming>;

/// Type alias for Hyper responses with full body
pub type HyperResponse = Response<Full<Bytes>>;

/// HTTP transport utility functions
///
/// Provides conversion between HTTP and JSON-RPC protocol messages.
pub struct HttpTransport;

impl HttpTransport {
    /// Parse a JSON-RPC request from an HTTP body
    ///
    /// # Arguments
    ///
    /// * `body` - Raw HTTP body bytes
    ///
    /// # Returns
    ///
    /// A parsed `JsonRpcRequest` or a `GateError` if parsing fails
    ///
    /// # Example
    ///
    /// ```
    /// use scriptgate_common::transport::http::HttpTransport;
    /// use hyper::body::Bytes;
    ///
    /// let body = Bytes::from(r#"{"jsonrpc":"2.0","method":"execute","params":{"command":"1"},"id":1}"#);
    /// let request = HttpTransport::parse_jsonrpc(body).unwrap();
    /// assert_eq!(request.method, "execute");
    /// ```
    pub fn parse_jsonrpc(body: Bytes) -> Result<JsonRpcRequest, GateError> {
        serde_json::from_slice(&body).map_err(GateError::from)
    }

    /// Create a `200 OK` HTTP response from a JSON-RPC response
    pub fn to_http_response(jsonrpc: JsonRpcResponse) -> HyperResponse {
        Self::to_http_response_with_status(jsonrpc, StatusCode::OK)
    }

    /// Create an HTTP error response from a JSON-RPC error
    ///
    /// The HTTP status follows the error code (see [`HttpTransport::status_for`]).
    pub fn to_http_error(id: serde_json::Value, error: JsonRpcError) -> HyperResponse {
        let status = Self::status_for(&error);
        Self::to_http_response_with_status(JsonRpcResponse::error(id, error), status)
    }

    /// Build a JSON-RPC request
    ///
    /// # Arguments
    ///
    /// * `method` - Method name to invoke
    /// * `params` - Method parameters (can be an object or array)
    /// * `id` - Request identifier
    pub fn build_request(
        method: &str,
        params: serde_json::Value,
        id: serde_json::Value,
    ) -> JsonRpcRequest {
        JsonRpcRequest::new(method, params, id)
    }

    /// Create an HTTP response with a custom status code
    pub fn to_http_response_with_status(
        jsonrpc: JsonRpcResponse,
        status: StatusCode,
    ) -> HyperResponse {
        let body = serde_json::to_vec(&jsonrpc).unwrap_or_default();

        let mut response = Response::new(Full::new(Bytes::from(body)));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }

    /// HTTP status used to carry a JSON-RPC error.
    ///
    /// Admission rejections become `429`, oversized bodies `413`; everything
    /// else stays `200` as JSON-RPC over HTTP expects.
    pub fn status_for(error: &JsonRpcError) -> StatusCode {
        match error.code {
            RATE_LIMITED => StatusCode::TOO_MANY_REQUESTS,
            REQUEST_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::OK,
        }
    }

    /// Map a gateway error onto the JSON-RPC error object sent to callers.
    pub fn error_for(err: &GateError) -> JsonRpcError {
        match err {
            GateError::AdmissionRejected { limit, window_secs } => {
                JsonRpcError::rate_limited(*limit, *window_secs)
            }
            GateError::InvalidRequest(msg) => JsonRpcError::invalid_params(msg),
            GateError::JsonSerialization(_) => JsonRpcError::parse_error(),
            other => JsonRpcError::server_error(&other.to_string()),
        }
    }

    /// Decode the error object of a JSON-RPC response back into a `GateError`.
    pub fn gate_error_from(error: &JsonRpcError) -> GateError {
        match error.code {
            RATE_LIMITED => {
                let field = |name: &str| {
                    error
                        .data
                        .as_ref()
                        .and_then(|d| d.get(name))
                        .and_then(|v| v.as_u64())
                        .unwrap_or(0)
                };
                GateError::AdmissionRejected {
                    limit: field("max_requests") as u32,
                    window_secs: field("window_secs"),
                }
            }
            INVALID_PARAMS => GateError::InvalidRequest(error.message.clone()),
            code => GateError::Transport(format!("server returned {}: {}", code, error.message)),
        }
    }
}
