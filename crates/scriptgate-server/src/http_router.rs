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

//! JSON-RPC router for a ScriptGate node
//!
//! # Methods
//!
//! - **`execute`**: params `{"command" | "text": str, "show_traceback" |
//!   "show_diagnostics": bool}`; the result is the formatted output string.
//!   Script failures are part of that string, not JSON-RPC errors.
//! - **`query`**: params `{"operation": str, "symbol": str?, "parameters": {...}}`;
//!   the result is the terminal's answer as JSON (see [`crate::query`]). Bad
//!   parameters are `INVALID_PARAMS`; terminal failures are server errors.
//! - **`_info`**: server info ([`InfoResponse`](scriptgate_common::protocol::builtin::InfoResponse))
//! - **`_health`**: connection health
//!
//! Only `execute` and `query` go through admission control.

use std::sync::Arc;

use scriptgate_common::protocol::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, QueryRequest, ScriptRequest,
};
use scriptgate_common::transport::HttpTransport;
use serde::Serialize;
use serde_json::Value;

use crate::node::Node;

/// Routes JSON-RPC requests to a [`Node`].
pub struct HttpRouter {
    node: Arc<Node>,
}

impl HttpRouter {
    pub fn new(node: Arc<Node>) -> Self {
        Self { node }
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Handles a JSON-RPC request on behalf of `identity`.
    ///
    /// Every failure is reported inside the returned response; the HTTP
    /// layer picks the status code from the error code.
    pub async fn handle_request(&self, identity: &str, req: JsonRpcRequest) -> JsonRpcResponse {
        let id = req.id.clone();

        match req.method.as_str() {
            "execute" => {
                let request = match Self::script_request(req.params) {
                    Ok(request) => request,
                    Err(error) => return JsonRpcResponse::error(id, error),
                };
                match self.node.submit(identity, request).await {
                    Ok(text) => JsonRpcResponse::success(id, Value::String(text)),
                    Err(e) => JsonRpcResponse::error(id, HttpTransport::error_for(&e)),
                }
            }
            "query" => {
                let request: QueryRequest = match serde_json::from_value(req.params) {
                    Ok(request) => request,
                    Err(e) => {
                        return JsonRpcResponse::error(
                            id,
                            JsonRpcError::invalid_params(&format!(
                                "expected {{\"operation\": <name>}}: {}",
                                e
                            )),
                        )
                    }
                };
                match self.node.submit_query(identity, request).await {
                    Ok(value) => JsonRpcResponse::success(id, value),
                    Err(e) => JsonRpcResponse::error(id, HttpTransport::error_for(&e)),
                }
            }
            "_info" => Self::respond(id, &self.node.info()),
            "_health" => Self::respond(id, &self.node.health()),
            other => {
                tracing::debug!(method = other, "Unknown method");
                JsonRpcResponse::error(id, JsonRpcError::method_not_found())
            }
        }
    }

    fn script_request(params: Value) -> Result<ScriptRequest, JsonRpcError> {
        serde_json::from_value(params).map_err(|e| {
            JsonRpcError::invalid_params(&format!(
                "expected {{\"command\": <script text>}}: {}",
                e
            ))
        })
    }

    fn respond(id: Value, body: &impl Serialize) -> JsonRpcResponse {
        match serde_json::to_value(body) {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => JsonRpcResponse::error(id, JsonRpcError::internal_error(&e.to_string())),
        }
    }
}
