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

//! HTTP Server for a ScriptGate node
//!
//! JSON-RPC 2.0 over HTTP/1.1 using hyper. The server:
//! - Listens on a TCP socket and spawns a tokio task per connection
//! - Uses the peer IP address as the caller identity for admission control
//! - Rejects non-POST requests (`405`) and bodies over the size cap (`413`)
//! - Hands parsed requests to the [`HttpRouter`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use scriptgate_server::{HttpServer, Node, NodeConfig};
//! use scriptgate_server::terminal::SimulatedTerminal;
//!
//! #[tokio::main]
//! async fn main() {
//!     let node = Node::new(SimulatedTerminal::default(), NodeConfig::default()).unwrap();
//!     node.start().unwrap();
//!     let server = HttpServer::new(Arc::new(node));
//!     server.run("127.0.0.1:8080".parse().unwrap()).await.unwrap();
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::header::CONTENT_LENGTH;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, StatusCode};
use hyper_util::rt::TokioIo;
use scriptgate_common::protocol::error::{GateError, Result};
use scriptgate_common::protocol::{JsonRpcError, JsonRpcResponse};
use scriptgate_common::transport::{HttpTransport, HyperRequest, HyperResponse};
use serde_json::json;
use tokio::net::TcpListener;

use crate::http_router::HttpRouter;
use crate::node::Node;

/// Default cap on request bodies.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// HTTP front-end for a [`Node`].
pub struct HttpServer {
    router: Arc<HttpRouter>,
    max_body_bytes: usize,
}

impl HttpServer {
    pub fn new(node: Arc<Node>) -> Self {
        Self {
            router: Arc::new(HttpRouter::new(node)),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Sets the largest accepted request body.
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Binds `addr` and serves until the task is dropped.
    ///
    /// # Errors
    ///
    /// Returns `GateError::Transport` if binding or accepting fails.
    pub async fn run(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GateError::Transport(format!("Failed to bind to {}: {}", addr, e)))?;
        self.serve(listener).await
    }

    /// Serves connections from an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let local = listener
            .local_addr()
            .map_err(|e| GateError::Transport(format!("Failed to get local address: {}", e)))?;
        tracing::info!("HTTP server listening on {}", local);

        loop {
            let (stream, peer) = listener
                .accept()
                .await
                .map_err(|e| GateError::Transport(format!("Failed to accept connection: {}", e)))?;

            let io = TokioIo::new(stream);
            let router = Arc::clone(&self.router);
            let max_body_bytes = self.max_body_bytes;

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let router = Arc::clone(&router);
                    async move { Self::handle_request(router, peer, max_body_bytes, req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    tracing::error!("Error serving connection from {}: {}", peer, err);
                }
            });
        }
    }

    async fn handle_request(
        router: Arc<HttpRouter>,
        peer: SocketAddr,
        max_body_bytes: usize,
        req: HyperRequest,
    ) -> Result<HyperResponse> {
        if req.method() != Method::POST {
            let mut error = JsonRpcError::invalid_request();
            error.message = "Only POST requests are supported".to_string();
            return Ok(HttpTransport::to_http_response_with_status(
                JsonRpcResponse::error(json!(null), error),
                StatusCode::METHOD_NOT_ALLOWED,
            ));
        }

        let declared = req
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > max_body_bytes) {
            tracing::warn!(%peer, "Request body too large");
            return Ok(HttpTransport::to_http_error(
                json!(null),
                JsonRpcError::request_too_large(max_body_bytes),
            ));
        }

        let body = match Limited::new(req.into_body(), max_body_bytes).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                tracing::warn!(%peer, "Request body too large");
                return Ok(HttpTransport::to_http_error(
                    json!(null),
                    JsonRpcError::request_too_large(max_body_bytes),
                ));
            }
            Err(e) => {
                return Err(GateError::Transport(format!("Failed to read request body: {}", e)));
            }
        };

        let jsonrpc_req = match HttpTransport::parse_jsonrpc(body) {
            Ok(req) => req,
            Err(e) => {
                tracing::error!("Failed to parse JSON-RPC request: {}", e);
                return Ok(HttpTransport::to_http_error(json!(null), JsonRpcError::parse_error()));
            }
        };

        let identity = peer.ip().to_string();
        let jsonrpc_res = router.handle_request(&identity, jsonrpc_req).await;
        let status = jsonrpc_res
            .error
            .as_ref()
            .map_or(StatusCode::OK, HttpTransport::status_for);
        Ok(HttpTransport::to_http_response_with_status(jsonrpc_res, status))
    }
}
