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

//! HTTP Node Integration Tests
//!
//! Runs a real `HttpServer` on an ephemeral port and talks to it with reqwest.
//! Tests cover:
//! - `execute` with both parameter spellings
//! - Built-in methods (`_info`, `_health`)
//! - Admission rejection (429), oversized bodies (413) and non-POST (405)
//! - Malformed JSON

use std::sync::Arc;

use reqwest::{Client, StatusCode};
use scriptgate_common::protocol::JsonRpcRequest;
use scriptgate_common::rate_limit::RateLimitConfig;
use scriptgate_server::terminal::SimulatedTerminal;
use scriptgate_server::{HttpServer, Node, NodeConfig};
use serde_json::{json, Value};
use tokio::net::TcpListener;

async fn start_server(config: NodeConfig, max_body_bytes: usize) -> String {
    let node = Node::new(SimulatedTerminal::default(), config).unwrap();
    node.start().unwrap();
    let server = HttpServer::new(Arc::new(node)).with_max_body_bytes(max_body_bytes);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server.serve(listener));
    format!("http://{}", addr)
}

async fn default_server() -> String {
    start_server(NodeConfig::default(), 64 * 1024).await
}

/// Helper to make a JSON-RPC request
async fn jsonrpc_request(url: &str, method: &str, params: Value) -> (StatusCode, Value) {
    let body = JsonRpcRequest {
        jsonrpc: "2.0".into(),
        method: method.into(),
        params,
        id: json!(1),
    };

    let res = Client::new().post(url).json(&body).send().await.unwrap();
    let status = res.status();
    (status, res.json().await.unwrap())
}

// ============================================================================
// execute
// ============================================================================

#[tokio::test]
async fn test_execute_returns_formatted_text() {
    let url = default_server().await;
    let (status, response) =
        jsonrpc_request(&url, "execute", json!({"command": "x = 2 + 2\nresult = x * 10"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["result"], "40");
    assert!(response["error"].is_null());
}

#[tokio::test]
async fn test_execute_error_is_result_text() {
    let url = default_server().await;

    let (_, short) = jsonrpc_request(&url, "execute", json!({"command": "1/0"})).await;
    assert_eq!(short["result"], "Error: ZeroDivisionError: division by zero");

    let (_, full) = jsonrpc_request(
        &url,
        "execute",
        json!({"text": "1/0", "show_traceback": true}),
    )
    .await;
    let text = full["result"].as_str().unwrap();
    assert!(text.starts_with("Error executing command:"), "{text}");
    assert!(text.contains("ZeroDivisionError"));
}

#[tokio::test]
async fn test_execute_rejects_forbidden_pattern() {
    let url = default_server().await;
    let (_, response) =
        jsonrpc_request(&url, "execute", json!({"command": "import subprocess"})).await;
    let text = response["result"].as_str().unwrap();
    assert!(text.starts_with("Error: ForbiddenPatternError"), "{text}");
}

#[tokio::test]
async fn test_execute_without_command_is_invalid_params() {
    let url = default_server().await;
    let (status, response) = jsonrpc_request(&url, "execute", json!({"code": "1"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["error"]["code"], -32602);
}

// ============================================================================
// query
// ============================================================================

#[tokio::test]
async fn test_query_returns_json() {
    let url = default_server().await;
    let (status, response) = jsonrpc_request(
        &url,
        "query",
        json!({"operation": "symbol_info", "symbol": "gbpusd"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["result"]["name"], "GBPUSD");
    assert!(response["result"]["bid"].is_number());
}

#[tokio::test]
async fn test_query_counts_against_rate_limit() {
    let url = start_server(
        NodeConfig::default().with_rate_limit(RateLimitConfig::per_minute(1)),
        64 * 1024,
    )
    .await;

    let (status, _) = jsonrpc_request(&url, "query", json!({"operation": "version"})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, response) = jsonrpc_request(&url, "execute", json!({"command": "1"})).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response["error"]["code"], -32029);
}

#[tokio::test]
async fn test_query_bad_parameters() {
    let url = default_server().await;
    let (status, response) = jsonrpc_request(
        &url,
        "query",
        json!({
            "operation": "copy_rates_from_pos",
            "symbol": "EURUSD",
            "parameters": {"timeframe": "X9", "count": 5}
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["error"]["code"], -32602);
    assert!(response["error"]["message"].as_str().unwrap().contains("invalid timeframe"));
}

// ============================================================================
// Built-in methods
// ============================================================================

#[tokio::test]
async fn test_builtin_info() {
    let url = default_server().await;
    let (_, response) = jsonrpc_request(&url, "_info", json!({})).await;

    assert_eq!(response["result"]["server_type"], "node");
    assert_eq!(response["result"]["connection"], "active");
    assert!(response["result"]["uptime_ms"].is_number());
    let capabilities = response["result"]["capabilities"].as_array().unwrap();
    assert!(capabilities.contains(&json!("mt5")));
    assert!(!capabilities.contains(&json!("shutdown")));
}

#[tokio::test]
async fn test_builtin_health() {
    let url = default_server().await;
    let (_, response) = jsonrpc_request(&url, "_health", json!({})).await;
    assert_eq!(response["result"]["status"], "healthy");
}

#[tokio::test]
async fn test_method_not_found() {
    let url = default_server().await;
    let (_, response) = jsonrpc_request(&url, "order_send", json!({})).await;
    assert_eq!(response["error"]["code"], -32601);
}

// ============================================================================
// HTTP-level rejections
// ============================================================================

#[tokio::test]
async fn test_rate_limit_maps_to_429() {
    let url = start_server(
        NodeConfig::default().with_rate_limit(RateLimitConfig::per_minute(3)),
        64 * 1024,
    )
    .await;

    for _ in 0..3 {
        let (status, _) = jsonrpc_request(&url, "execute", json!({"command": "1"})).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, response) = jsonrpc_request(&url, "execute", json!({"command": "1"})).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response["error"]["code"], -32029);
    assert_eq!(
        response["error"]["message"],
        "Rate limit exceeded: 3 requests per minute."
    );
}

#[tokio::test]
async fn test_oversized_body_maps_to_413() {
    let url = start_server(NodeConfig::default(), 256).await;
    let script = "x = 1\n".repeat(200);
    let (status, response) = jsonrpc_request(&url, "execute", json!({"command": script})).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(response["error"]["code"], -32001);
}

#[tokio::test]
async fn test_get_is_method_not_allowed() {
    let url = default_server().await;
    let res = Client::new().get(&url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_invalid_json_is_parse_error() {
    let url = default_server().await;
    let res = Client::new()
        .post(&url)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], -32700);
}
