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

//! Node Integration Tests
//!
//! Exercises a whole node (filter, namespace, engine, gateway, admission)
//! through its public API. Terminal access is checked with a recording test
//! double that notices overlapping calls.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use scriptgate_common::rate_limit::RateLimitConfig;
use scriptgate_common::{GateError, ScriptRequest, TerminalFault};
use scriptgate_server::namespace::DEFAULT_FORBIDDEN;
use scriptgate_server::terminal::{Datum, SimulatedTerminal, Terminal};
use scriptgate_server::{Node, NodeConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Enter(usize),
    Exit(usize),
}

/// Terminal that logs every call and counts overlapping ones.
#[derive(Clone, Default)]
struct RecordingTerminal {
    events: Arc<Mutex<Vec<Event>>>,
    busy: Arc<AtomicBool>,
    overlaps: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl Terminal for RecordingTerminal {
    fn initialize(&mut self) -> bool {
        true
    }

    fn shutdown(&mut self) {}

    fn last_error(&self) -> TerminalFault {
        TerminalFault::new(-4, "Terminal: Not found")
    }

    fn symbol_info_tick(&mut self, symbol: &str) -> Option<Datum> {
        if symbol != "EURUSD" {
            return None;
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.busy.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.events.lock().push(Event::Enter(call));
        std::thread::sleep(Duration::from_millis(5));
        self.events.lock().push(Event::Exit(call));
        self.busy.store(false, Ordering::SeqCst);

        Some(Datum::record(
            "tick",
            vec![("bid", Datum::Float(1.1)), ("ask", Datum::Float(1.1002))],
        ))
    }
}

fn recording_node(terminal: RecordingTerminal, config: NodeConfig) -> Arc<Node> {
    let node = Node::new(terminal, config).unwrap();
    node.start().unwrap();
    Arc::new(node)
}

fn simulated_node(config: NodeConfig) -> Arc<Node> {
    let node = Node::new(SimulatedTerminal::default(), config).unwrap();
    node.start().unwrap();
    Arc::new(node)
}

// ============================================================================
// Resource serialization
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_terminal_calls_never_interleave() {
    let terminal = RecordingTerminal::default();
    let node = recording_node(
        terminal.clone(),
        NodeConfig::default().with_rate_limit(RateLimitConfig::disabled()),
    );

    let script = "total = 0\n\
                  for i in 0..5 {\n    \
                      tick = mt5::symbol_info_tick(\"EURUSD\")\n    \
                      total += 1\n\
                  }\n\
                  result = total";

    let mut handles = Vec::new();
    for worker in 0..4 {
        let node = Arc::clone(&node);
        handles.push(tokio::spawn(async move {
            node.submit(&format!("worker-{}", worker), ScriptRequest::new(script))
                .await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "5");
    }

    assert_eq!(terminal.calls.load(Ordering::SeqCst), 20);
    assert_eq!(terminal.overlaps.load(Ordering::SeqCst), 0);

    let events = terminal.events.lock().clone();
    assert_eq!(events.len(), 40);
    for pair in events.chunks(2) {
        match pair {
            [Event::Enter(a), Event::Exit(b)] => assert_eq!(a, b),
            other => panic!("interleaved terminal calls: {:?}", other),
        }
    }
}

#[test]
fn test_terminal_rejection_releases_gateway() {
    let terminal = RecordingTerminal::default();
    let node = recording_node(terminal.clone(), NodeConfig::default());

    let text = node.execute(&ScriptRequest::new("mt5::symbol_info_tick(\"NOPE\")"));
    assert!(text.starts_with("Error: ResourceError: symbol_info_tick failed (code -4)"), "{text}");

    // the failed call must not leave the connection locked
    let text = node.execute(&ScriptRequest::new("mt5::symbol_info_tick(\"EURUSD\").bid"));
    assert_eq!(text, "1.1");
}

// ============================================================================
// Admission
// ============================================================================

#[tokio::test]
async fn test_fourth_request_rejected_with_threshold_three() {
    let node = simulated_node(NodeConfig::default().with_rate_limit(RateLimitConfig::per_minute(3)));
    for _ in 0..3 {
        assert!(node.submit("198.51.100.7", ScriptRequest::new("1")).await.is_ok());
    }
    let err = node
        .submit("198.51.100.7", ScriptRequest::new("1"))
        .await
        .unwrap_err();
    assert_eq!(err.category(), "AdmissionRejected");
}

#[tokio::test]
async fn test_rejected_requests_do_not_execute() {
    let terminal = RecordingTerminal::default();
    let node = recording_node(
        terminal.clone(),
        NodeConfig::default().with_rate_limit(RateLimitConfig::per_minute(1)),
    );
    let request = ScriptRequest::new("mt5::symbol_info_tick(\"EURUSD\")");
    assert!(node.submit("peer", request.clone()).await.is_ok());
    assert!(matches!(
        node.submit("peer", request).await,
        Err(GateError::AdmissionRejected { .. })
    ));
    assert_eq!(terminal.calls.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Namespace and error surface
// ============================================================================

#[test]
fn test_namespace_excludes_lifecycle_names() {
    let node = simulated_node(NodeConfig::default());
    let info = node.info();
    for name in DEFAULT_FORBIDDEN {
        assert!(!info.capabilities.iter().any(|c| c == name), "{name} is bound");
        let text = node.execute(&ScriptRequest::new(format!("{}()", name)));
        assert!(text.starts_with("Error: "), "{name}() gave {text}");
    }
}

#[test]
fn test_malformed_input_never_crashes() {
    let node = simulated_node(NodeConfig::default());
    let samples = [
        "",
        "\n\n\n",
        "fn",
        "x = (",
        "]]]",
        "    indented = 1",
        "if x {\n",
        "|x| (",
        "`${",
        "x = 1 +* 2",
        "\u{0}\u{1}\u{2}",
        "print(\"a\"",
        "while true\n    1",
        "#{a: ",
    ];
    for text in samples {
        let rendered = node.execute(&ScriptRequest::new(text).with_diagnostics(true));
        assert!(!rendered.is_empty());
    }

    let rendered = node.execute(&ScriptRequest::new("x = (1,"));
    assert!(rendered.starts_with("Error: SyntaxError"), "{rendered}");
}

#[test]
fn test_end_to_end_analysis_script() {
    let node = simulated_node(NodeConfig::default());
    let script = "rates = mt5::copy_rates_from_pos(\"EURUSD\", mt5::TIMEFRAME_H1, 0, 50)\n\
                  closes = rates.map(|r| r.close)\n\
                  fast = ta::sma(closes, 5)[-1]\n\
                  slow = ta::sma(closes, 20)[-1]\n\
                  print(`fast=${fast} slow=${slow}`)\n\
                  result = if fast > slow { \"up\" } else { \"down\" }";
    let text = node.execute(&ScriptRequest::new(script));
    let (printed, value) = text.split_once("\n\n").unwrap();
    assert!(printed.starts_with("fast="), "{text}");
    assert!(value == "up" || value == "down", "{text}");
}
