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

//! HTTP Client Integration Tests
//!
//! These tests verify the client's ability to:
//! - Submit scripts to a real node and read `_info`/`_health`
//! - Surface admission rejections as `AdmissionRejected`
//! - Retry on transient errors (5xx, refused connections) and only those
//!
//! Stub servers are bound to `127.0.0.1:0` so tests never collide on ports.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use scriptgate_client::{GateClient, RetryConfig};
use scriptgate_common::protocol::builtin::ConnectionStatus;
use scriptgate_common::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use scriptgate_common::rate_limit::RateLimitConfig;
use scriptgate_common::{GateError, QueryRequest, ScriptRequest};
use scriptgate_server::terminal::SimulatedTerminal;
use scriptgate_server::{HttpServer, Node, NodeConfig};
use serde_json::json;
use tokio::net::TcpListener;

async fn start_node(config: NodeConfig) -> String {
    let node = Node::new(SimulatedTerminal::default(), config).unwrap();
    node.start().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(HttpServer::new(Arc::new(node)).serve(listener));
    format!("http://{}", addr)
}

/// Starts a stub server answering with `respond(call_index, request)`.
async fn stub_server<F>(respond: F) -> (String, Arc<AtomicUsize>)
where
    F: Fn(usize, JsonRpcRequest) -> (StatusCode, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let calls = Arc::new(AtomicUsize::new(0));
    let respond = Arc::new(respond);

    let counter = Arc::clone(&calls);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                continue;
            };
            let respond = Arc::clone(&respond);
            let counter = Arc::clone(&counter);

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let respond = Arc::clone(&respond);
                    let index = counter.fetch_add(1, Ordering::SeqCst);
                    async move {
                        let body = req.into_body().collect().await?.to_bytes();
                        let jsonrpc_req: JsonRpcRequest = serde_json::from_slice(&body).unwrap();
                        let (status, text) = respond(index, jsonrpc_req);
                        Ok::<_, hyper::Error>(
                            Response::builder()
                                .status(status)
                                .header("Content-Type", "application/json")
                                .body(Full::new(Bytes::from(text)))
                                .unwrap(),
                        )
                    }
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    (base_url, calls)
}

fn fast_retry() -> RetryConfig {
    RetryConfig::new(3, 10, 50, 2.0).unwrap()
}

// ============================================================================
// Against a real node
// ============================================================================

#[tokio::test]
async fn test_client_executes_script() {
    let url = start_node(NodeConfig::default()).await;
    let client = GateClient::new(&url).unwrap();

    let output = client
        .execute(&ScriptRequest::new("x = 2 + 2\nresult = x * 10"))
        .await
        .unwrap();
    assert_eq!(output, "40");

    let output = client
        .execute(&ScriptRequest::new("1/0").with_diagnostics(true))
        .await
        .unwrap();
    assert!(output.contains("ZeroDivisionError"));
}

#[tokio::test]
async fn test_client_query() {
    let url = start_node(NodeConfig::default()).await;
    let client = GateClient::new(&url).unwrap();

    let tick = client
        .query(&QueryRequest::new("symbol_info_tick").with_symbol("XAUUSD"))
        .await
        .unwrap();
    assert!(tick["ask"].as_f64().unwrap() > tick["bid"].as_f64().unwrap());

    let bad = client
        .query(&QueryRequest::new("copy_rates_from_pos").with_symbol("XAUUSD"))
        .await;
    assert!(matches!(bad, Err(GateError::InvalidRequest(_))), "{bad:?}");
}

#[tokio::test]
async fn test_client_info_and_health() {
    let url = start_node(NodeConfig::default()).await;
    let client = GateClient::new(&url).unwrap();

    let info = client.info().await.unwrap();
    assert_eq!(info.server_type, "node");
    assert_eq!(info.connection, ConnectionStatus::Active);
    assert!(info.capabilities.iter().any(|c| c == "ta"));

    let health = client.health().await.unwrap();
    assert_eq!(health.status, "healthy");
}

#[tokio::test]
async fn test_client_admission_rejected_is_not_retried() {
    let url = start_node(NodeConfig::default().with_rate_limit(RateLimitConfig::per_minute(2))).await;
    let client = GateClient::new(&url).unwrap().with_retry_config(fast_retry());

    for _ in 0..2 {
        client.execute(&ScriptRequest::new("1")).await.unwrap();
    }
    let err = client.execute(&ScriptRequest::new("1")).await.unwrap_err();
    assert_eq!(
        err,
        GateError::AdmissionRejected {
            limit: 2,
            window_secs: 60
        }
    );
}

#[tokio::test]
async fn test_client_concurrent_calls() {
    let url = start_node(NodeConfig::default().with_rate_limit(RateLimitConfig::disabled())).await;
    let client = GateClient::new(&url).unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client
                .execute(&ScriptRequest::new(format!("result = {} * 2", i)))
                .await
        }));
    }
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.unwrap().unwrap(), (i * 2).to_string());
    }
}

// ============================================================================
// Error handling and retries
// ============================================================================

#[tokio::test]
async fn test_client_no_retry_on_permanent_error() {
    let (url, calls) = stub_server(|_, req| {
        let response = JsonRpcResponse::error(req.id, JsonRpcError::invalid_params("bad params"));
        (StatusCode::OK, serde_json::to_string(&response).unwrap())
    })
    .await;
    let client = GateClient::new(&url).unwrap().with_retry_config(fast_retry());

    let err = client.call("execute", json!({"bad": "params"})).await.unwrap_err();
    assert_eq!(err, GateError::InvalidRequest("bad params".into()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_client_retry_on_transient_error() {
    let (url, calls) = stub_server(|index, req| {
        if index < 2 {
            return (StatusCode::INTERNAL_SERVER_ERROR, "server error".to_string());
        }
        let response = JsonRpcResponse::success(req.id, req.params);
        (StatusCode::OK, serde_json::to_string(&response).unwrap())
    })
    .await;
    let client = GateClient::new(&url).unwrap().with_retry_config(fast_retry());

    let params = json!({"test": "retry"});
    assert_eq!(client.call("test", params.clone()).await.unwrap(), params);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_client_retry_exhausted() {
    let (url, calls) = stub_server(|_, _| (StatusCode::SERVICE_UNAVAILABLE, String::new())).await;
    let client = GateClient::new(&url).unwrap().with_retry_config(fast_retry());

    let err = client.call("test", json!({})).await.unwrap_err();
    assert!(matches!(err, GateError::Transport(_)), "{err:?}");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_client_malformed_json_response() {
    let (url, calls) = stub_server(|_, _| (StatusCode::OK, "{not json".to_string())).await;
    let client = GateClient::new(&url).unwrap().with_retry_config(fast_retry());

    let err = client.call("test", json!({})).await.unwrap_err();
    assert!(err.to_string().contains("invalid JSON-RPC response"), "{err}");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_client_execute_requires_string_result() {
    let (url, _) = stub_server(|_, req| {
        let response = JsonRpcResponse::success(req.id, json!({"not": "text"}));
        (StatusCode::OK, serde_json::to_string(&response).unwrap())
    })
    .await;
    let client = GateClient::new(&url).unwrap();

    let err = client.execute(&ScriptRequest::new("1")).await.unwrap_err();
    assert!(matches!(err, GateError::Transport(_)));
}

#[tokio::test]
async fn test_client_connection_refused() {
    // bind and drop to find a port nobody listens on
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let client = GateClient::new(&format!("http://127.0.0.1:{}", port))
        .unwrap()
        .with_retry_config(fast_retry())
        .with_timeout(Duration::from_secs(2));

    let err = client.call("test", json!({})).await.unwrap_err();
    assert!(matches!(err, GateError::Transport(_)), "{err:?}");
}
