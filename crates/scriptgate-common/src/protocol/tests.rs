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

//! Tests for the protocol module
//!
//! These tests cover script request decoding, request ID generation and the
//! rendering of the error taxonomy.

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::protocol::builtin::{ConnectionStatus, HealthResponse, InfoResponse, RateLimitInfo};
    use serde_json::json;
    use std::collections::HashSet;
    use std::error::Error as _;

    #[test]
    fn test_script_request_creation() {
        let req = ScriptRequest::new("result = 1");
        assert_eq!(req.text, "result = 1");
        assert!(!req.show_diagnostics);

        let req = req.with_diagnostics(true);
        assert!(req.show_diagnostics);
    }

    #[test]
    fn test_script_request_accepts_aliases() {
        let req: ScriptRequest =
            serde_json::from_value(json!({"command": "1/0", "show_traceback": true})).unwrap();
        assert_eq!(req.text, "1/0");
        assert!(req.show_diagnostics);

        let req: ScriptRequest = serde_json::from_value(json!({"text": "x"})).unwrap();
        assert_eq!(req.text, "x");
        assert!(!req.show_diagnostics);
    }

    #[test]
    fn test_script_request_requires_text() {
        let req: std::result::Result<ScriptRequest, _> =
            serde_json::from_value(json!({"show_diagnostics": true}));
        assert!(req.is_err());
    }

    #[test]
    fn test_query_request_defaults() {
        let req: QueryRequest = serde_json::from_value(json!({"operation": "version"})).unwrap();
        assert_eq!(req, QueryRequest::new("version"));
        assert!(req.symbol.is_none());
        assert!(req.parameters.is_empty());

        let req = QueryRequest::new("copy_rates_from_pos")
            .with_symbol("EURUSD")
            .with_parameter("timeframe", "H1")
            .with_parameter("count", 10);
        let wire = serde_json::to_value(&req).unwrap();
        assert_eq!(wire["parameters"], json!({"timeframe": "H1", "count": 10}));
        assert_eq!(wire["symbol"], "EURUSD");

        assert!(serde_json::from_value::<QueryRequest>(json!({"symbol": "EURUSD"})).is_err());
    }

    #[test]
    fn test_request_id_uniqueness() {
        let ids: HashSet<_> = (0..1000).map(|_| generate_request_id()).collect();
        assert_eq!(ids.len(), 1000, "All request IDs should be unique");
    }

    // ========================================================================
    // Error taxonomy
    // ========================================================================

    #[test]
    fn test_execution_error_display() {
        let err = GateError::exec(ExceptionKind::ZeroDivisionError, "division by zero");
        assert_eq!(err.to_string(), "ZeroDivisionError: division by zero");
        assert_eq!(err.category(), "ExecutionError");
        assert_eq!(err.exception_name(), "ZeroDivisionError");
    }

    #[test]
    fn test_syntax_error_display() {
        let err = GateError::Syntax {
            message: "unexpected ')'".into(),
            line: 2,
            column: 7,
        };
        assert_eq!(err.to_string(), "SyntaxError: unexpected ')' (line 2, column 7)");
        assert!(err.is_pre_execution());
    }

    #[test]
    fn test_name_resolution_display() {
        let err = GateError::NameResolution("name 'order_send' is not defined".into());
        assert_eq!(err.to_string(), "NameError: name 'order_send' is not defined");
        assert_eq!(err.category(), "NameResolutionError");
        assert_eq!(err.exception_name(), "NameError");
    }

    #[test]
    fn test_resource_error_carries_terminal_code() {
        let err = GateError::Resource {
            operation: "symbol_info".into(),
            fault: Some(TerminalFault::new(-4, "Terminal: Not found")),
        };
        assert_eq!(
            err.to_string(),
            "ResourceError: symbol_info failed (code -4): Terminal: Not found"
        );
        let source = err.source().expect("fault is exposed as the source");
        assert_eq!(source.to_string(), "terminal error -4: Terminal: Not found");
        assert!(!err.is_pre_execution());
    }

    #[test]
    fn test_resource_error_without_code() {
        let err = GateError::Resource {
            operation: "account_info".into(),
            fault: None,
        };
        assert_eq!(err.to_string(), "ResourceError: account_info failed");
        assert!(err.source().is_none());
    }

    #[test]
    fn test_admission_rejected_display() {
        let err = GateError::AdmissionRejected {
            limit: 3,
            window_secs: 60,
        };
        assert!(err.to_string().contains("3 requests per 60s"));
        assert_eq!(err.category(), "AdmissionRejected");
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: GateError = parse.unwrap_err().into();
        assert!(matches!(err, GateError::JsonSerialization(_)));
        assert_eq!(err.category(), "TransportError");
    }

    // ========================================================================
    // Built-in responses
    // ========================================================================

    #[test]
    fn test_health_response_status() {
        assert_eq!(HealthResponse::from_status(ConnectionStatus::Active).status, "healthy");
        assert_eq!(HealthResponse::from_status(ConnectionStatus::Closed).status, "degraded");
    }

    #[test]
    fn test_info_response_serialization() {
        let info = InfoResponse {
            server_type: "node".into(),
            version: "0.1.0".into(),
            connection: ConnectionStatus::Uninitialized,
            capabilities: vec!["mt5".into(), "print".into()],
            rate_limit: RateLimitInfo {
                max_requests: 10,
                window_secs: 60,
            },
            uptime_ms: 5,
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["connection"], json!("uninitialized"));
        assert_eq!(value["rate_limit"]["max_requests"], json!(10));
        let back: InfoResponse = serde_json::from_value(value).unwrap();
        assert_eq!(back, info);
    }
}
