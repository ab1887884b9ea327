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

use std::time::Duration;

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::{Method, Request, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use scriptgate_common::protocol::builtin::{HealthResponse, InfoResponse};
use scriptgate_common::protocol::error::{GateError, Result};
use scriptgate_common::protocol::{generate_request_id, JsonRpcResponse, QueryRequest, ScriptRequest};
use scriptgate_common::transport::HttpTransport;
use serde_json::{json, Value};

use crate::retry::RetryConfig;

/// Default per-attempt timeout. Scripts may run for up to 30s on the node.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(45);

/// ScriptGate client for submitting scripts to a node.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Clone)]
pub struct GateClient {
    uri: Uri,
    client: Client<HttpConnector, Full<Bytes>>,
    retry: RetryConfig,
    timeout: Duration,
}

/// One failed attempt and whether repeating it may help.
struct Failure {
    error: GateError,
    transient: bool,
}

impl Failure {
    fn permanent(error: GateError) -> Self {
        Self {
            error,
            transient: false,
        }
    }

    fn transient(error: GateError) -> Self {
        Self {
            error,
            transient: true,
        }
    }
}

impl GateClient {
    /// Creates a client for the node at `base_url` (e.g. `http://127.0.0.1:8080`).
    ///
    /// No connection is made until the first call.
    ///
    /// # Errors
    ///
    /// Returns `GateError::InvalidRequest` if `base_url` is not an absolute
    /// http URL.
    pub fn new(base_url: &str) -> Result<Self> {
        let uri: Uri = base_url
            .parse()
            .map_err(|e| GateError::InvalidRequest(format!("invalid node URL '{}': {}", base_url, e)))?;
        if uri.scheme_str() != Some("http") || uri.host().is_none() {
            return Err(GateError::InvalidRequest(format!(
                "node URL must look like http://host:port (got '{}')",
                base_url
            )));
        }

        let client = Client::builder(TokioExecutor::new()).build_http();
        Ok(Self {
            uri,
            client,
            retry: RetryConfig::default(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &Uri {
        &self.uri
    }

    /// Submits a script and returns the node's formatted output.
    ///
    /// A script that fails still yields `Ok`: the error text is the output.
    ///
    /// # Errors
    ///
    /// `GateError::AdmissionRejected` when the node's rate limit is exceeded,
    /// otherwise transport and protocol errors.
    pub async fn execute(&self, request: &ScriptRequest) -> Result<String> {
        let params = serde_json::to_value(request)?;
        match self.call("execute", params).await? {
            Value::String(text) => Ok(text),
            other => Err(GateError::Transport(format!(
                "expected a string result from execute, got {}",
                other
            ))),
        }
    }

    /// Runs one read-only terminal operation and returns its JSON result.
    ///
    /// # Errors
    ///
    /// `GateError::InvalidRequest` for an unknown operation or bad
    /// parameters; a terminal rejection arrives as `GateError::Transport`
    /// carrying the node's message.
    pub async fn query(&self, request: &QueryRequest) -> Result<Value> {
        self.call("query", serde_json::to_value(request)?).await
    }

    pub async fn info(&self) -> Result<InfoResponse> {
        let value = self.call("_info", json!({})).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let value = self.call("_health", json!({})).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Calls a JSON-RPC method, retrying transient failures.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request = HttpTransport::build_request(method, params, json!(generate_request_id()));
        let body = Bytes::from(serde_json::to_vec(&request)?);

        let mut attempt = 1;
        loop {
            match self.attempt(body.clone()).await {
                Ok(value) => return Ok(value),
                Err(failure) if failure.transient && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    tracing::debug!(
                        method,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after transient failure: {}",
                        failure.error
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(failure) => return Err(failure.error),
            }
        }
    }

    async fn attempt(&self, body: Bytes) -> std::result::Result<Value, Failure> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(self.uri.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(body))
            .map_err(|e| Failure::permanent(GateError::InvalidRequest(e.to_string())))?;

        let response = tokio::time::timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| Failure::transient(GateError::Timeout(self.timeout.as_millis() as u64)))?
            .map_err(|e| Failure::transient(GateError::Transport(format!("request failed: {}", e))))?;

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| Failure::transient(GateError::Transport(format!("failed to read response: {}", e))))?
            .to_bytes();

        let decoded: JsonRpcResponse = match serde_json::from_slice(&bytes) {
            Ok(decoded) => decoded,
            Err(_) if status.is_server_error() => {
                return Err(Failure::transient(GateError::Transport(format!(
                    "server returned HTTP {}",
                    status
                ))));
            }
            Err(e) => {
                return Err(Failure::permanent(GateError::Transport(format!(
                    "invalid JSON-RPC response (HTTP {}): {}",
                    status, e
                ))));
            }
        };

        if let Some(error) = decoded.error {
            let transient = status.is_server_error();
            return Err(Failure {
                error: HttpTransport::gate_error_from(&error),
                transient,
            });
        }
        decoded.result.ok_or_else(|| {
            Failure::permanent(GateError::Transport("response has neither result nor error".into()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = GateClient::new("http://127.0.0.1:8080").unwrap();
        assert_eq!(client.url().port_u16(), Some(8080));
    }

    #[test]
    fn test_client_rejects_bad_urls() {
        for url in ["127.0.0.1:8080", "not a url", "https://127.0.0.1:8080", "/rpc"] {
            assert!(
                matches!(GateClient::new(url), Err(GateError::InvalidRequest(_))),
                "{url} accepted"
            );
        }
    }

    #[tokio::test]
    async fn test_client_is_clonable() {
        let client = GateClient::new("http://127.0.0.1:8080").unwrap();
        let client2 = client.clone().with_timeout(Duration::from_secs(1));
        assert_eq!(client.url(), client2.url());
        assert_eq!(client2.timeout, Duration::from_secs(1));
    }
}
