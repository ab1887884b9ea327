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

use std::sync::Arc;
use std::time::Instant;

use scriptgate_common::protocol::builtin::{HealthResponse, InfoResponse, RateLimitInfo};
use scriptgate_common::rate_limit::{RateLimitConfig, RateLimiter};
use scriptgate_common::{ExceptionKind, GateError, QueryRequest, Result, ScriptRequest};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::filter::DangerFilter;
use crate::namespace::{NamespaceBuilder, NamespacePolicy};
use crate::query;
use crate::resource_limits::ResourceLimits;
use crate::runtime::{Engine, ExecutionResult};
use crate::terminal::{Terminal, TerminalGateway};

/// Settings for a [`Node`].
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    pub limits: ResourceLimits,
    pub rate_limit: RateLimitConfig,
    pub policy: NamespacePolicy,
    pub filter: DangerFilter,
}

impl NodeConfig {
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_policy(mut self, policy: NamespacePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_filter(mut self, filter: DangerFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// ScriptGate node - admits, screens and executes script submissions.
///
/// A node owns the only connection to the terminal (through its
/// [`TerminalGateway`]) and runs every request through the same chain:
///
/// 1. **Admission**: the per-identity [`RateLimiter`] (async path only)
/// 2. **Filter**: the [`DangerFilter`] pre-parse scan
/// 3. **Namespace**: the capability set for the active connection
/// 4. **Engine**: parse, resolve and run the script on its own thread
///
/// Any number of requests may execute concurrently; the gateway serializes
/// their terminal calls.
pub struct Node {
    gateway: Arc<TerminalGateway>,
    namespace: NamespaceBuilder,
    filter: DangerFilter,
    engine: Engine,
    limiter: RateLimiter,
    started: Instant,
}

impl Node {
    /// Creates a node around `terminal`.
    ///
    /// The terminal connection is not opened; call [`Node::start`] before
    /// submitting scripts.
    ///
    /// # Errors
    ///
    /// Returns `GateError::InvalidRequest` if the resource limits are invalid.
    pub fn new(terminal: impl Terminal + 'static, config: NodeConfig) -> Result<Self> {
        config.limits.validate().map_err(GateError::InvalidRequest)?;

        let gateway = Arc::new(TerminalGateway::new(terminal));
        Ok(Self {
            namespace: NamespaceBuilder::new(Arc::clone(&gateway), config.policy),
            gateway,
            filter: config.filter,
            engine: Engine::new(config.limits),
            limiter: RateLimiter::new(config.rate_limit),
            started: Instant::now(),
        })
    }

    /// Opens the terminal connection.
    pub fn start(&self) -> Result<()> {
        self.gateway.start()
    }

    /// Closes the terminal connection for good.
    pub fn shutdown(&self) {
        self.gateway.stop();
    }

    pub fn gateway(&self) -> &Arc<TerminalGateway> {
        &self.gateway
    }

    /// Runs a script without admission control.
    pub fn run(&self, request: &ScriptRequest) -> ExecutionResult {
        if let Err(err) = self.filter.check(&request.text) {
            return ExecutionResult::failure(err);
        }

        let capabilities = match self.namespace.build() {
            Ok(capabilities) => capabilities,
            Err(err) => {
                warn!("Rejecting script: {}", err);
                return ExecutionResult::failure(err);
            }
        };

        self.engine.execute(&request.text, &capabilities)
    }

    /// Runs a script and renders the outcome as the caller-facing text.
    pub fn execute(&self, request: &ScriptRequest) -> String {
        self.run(request).render(request.show_diagnostics)
    }

    /// Admits and executes a request on the blocking pool.
    ///
    /// # Arguments
    ///
    /// * `identity` - Caller identity used for admission, e.g. the peer IP
    /// * `request` - The script submission
    ///
    /// # Errors
    ///
    /// Returns `GateError::AdmissionRejected` without running anything if
    /// `identity` is over its budget. Script failures are not errors here;
    /// they are part of the rendered text.
    pub async fn submit(self: &Arc<Self>, identity: &str, request: ScriptRequest) -> Result<String> {
        if let Err(err) = self.limiter.admit(identity).into_result() {
            warn!(identity, "Admission rejected");
            return Err(err);
        }
        debug!(identity, len = request.text.len(), "Request admitted");

        let node = Arc::clone(self);
        let show_diagnostics = request.show_diagnostics;
        match tokio::task::spawn_blocking(move || node.execute(&request)).await {
            Ok(text) => Ok(text),
            Err(err) => {
                error!("Execution worker failed: {}", err);
                let failure = ExecutionResult::failure(GateError::exec(
                    ExceptionKind::RuntimeError,
                    format!("execution worker failed: {}", err),
                ));
                Ok(failure.render(show_diagnostics))
            }
        }
    }

    /// Runs a structured query without admission control.
    ///
    /// # Errors
    ///
    /// See [`query::dispatch`].
    pub fn query(&self, request: &QueryRequest) -> Result<Value> {
        query::dispatch(&self.gateway, self.namespace.policy(), request)
    }

    /// Admits a structured query and runs it on the blocking pool.
    ///
    /// Queries share the per-identity budget with script submissions.
    ///
    /// # Errors
    ///
    /// Returns `GateError::AdmissionRejected` if `identity` is over its
    /// budget, otherwise whatever [`Node::query`] returns.
    pub async fn submit_query(self: &Arc<Self>, identity: &str, request: QueryRequest) -> Result<Value> {
        if let Err(err) = self.limiter.admit(identity).into_result() {
            warn!(identity, "Admission rejected");
            return Err(err);
        }
        debug!(identity, operation = %request.operation, "Query admitted");

        let node = Arc::clone(self);
        tokio::task::spawn_blocking(move || node.query(&request))
            .await
            .unwrap_or_else(|err| {
                error!("Query worker failed: {}", err);
                Err(GateError::exec(
                    ExceptionKind::RuntimeError,
                    format!("query worker failed: {}", err),
                ))
            })
    }

    /// Changes the admission threshold. `0` disables admission control.
    pub fn set_rate_limit(&self, max_requests: u32) {
        self.limiter.set_threshold(max_requests);
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Gets server information for the `_info` endpoint.
    ///
    /// The capability list is empty while the terminal is not active.
    pub fn info(&self) -> InfoResponse {
        let mut capabilities: Vec<String> = match self.namespace.build() {
            Ok(set) => set.names().map(str::to_string).collect(),
            Err(_) => Vec::new(),
        };
        capabilities.sort();

        InfoResponse {
            server_type: "node".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            connection: self.gateway.state(),
            capabilities,
            rate_limit: RateLimitInfo {
                max_requests: self.limiter.threshold(),
                window_secs: self.limiter.window().as_secs(),
            },
            uptime_ms: self.started.elapsed().as_millis() as u64,
        }
    }

    /// Gets the `_health` response.
    pub fn health(&self) -> HealthResponse {
        HealthResponse::from_status(self.gateway.state())
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if self.gateway.is_active() {
            info!("Node dropped; closing terminal connection");
        }
        self.gateway.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::DEFAULT_FORBIDDEN;
    use crate::terminal::{SimulatedConfig, SimulatedTerminal};
    use scriptgate_common::protocol::builtin::ConnectionStatus;

    fn node_with(config: NodeConfig) -> Arc<Node> {
        let node = Node::new(SimulatedTerminal::default(), config).unwrap();
        node.start().unwrap();
        Arc::new(node)
    }

    fn node() -> Arc<Node> {
        node_with(NodeConfig::default())
    }

    #[test]
    fn test_node_executes_script() {
        let node = node();
        let text = node.execute(&ScriptRequest::new("x = 2 + 2\nresult = x * 10"));
        assert!(text.contains("40"));
    }

    #[test]
    fn test_node_rejects_forbidden_pattern() {
        let node = node();
        let result = node.run(&ScriptRequest::new("import \"os\" as os;\nresult = 1"));
        let info = result.error.unwrap();
        assert!(matches!(info.error, GateError::ForbiddenPattern { .. }));
    }

    #[test]
    fn test_node_requires_active_terminal() {
        let node = Node::new(SimulatedTerminal::default(), NodeConfig::default()).unwrap();
        let text = node.execute(&ScriptRequest::new("result = 1"));
        assert!(text.starts_with("Error: LifecycleError"), "{text}");
        assert_eq!(node.health().connection, ConnectionStatus::Uninitialized);
        assert_eq!(node.health().status, "degraded");
    }

    #[test]
    fn test_node_rejects_invalid_limits() {
        let limits = ResourceLimits::default().with_max_call_depth(0);
        let result = Node::new(
            SimulatedTerminal::default(),
            NodeConfig::default().with_limits(limits),
        );
        assert!(matches!(result, Err(GateError::InvalidRequest(_))));
    }

    #[test]
    fn test_node_refusing_terminal() {
        let node = Node::new(
            SimulatedTerminal::new(SimulatedConfig::default().refusing()),
            NodeConfig::default(),
        )
        .unwrap();
        assert!(matches!(node.start(), Err(GateError::Lifecycle(_))));
    }

    #[tokio::test]
    async fn test_submit_rate_limit() {
        let node = node_with(NodeConfig::default().with_rate_limit(RateLimitConfig::per_minute(3)));
        for _ in 0..3 {
            let text = node.submit("10.0.0.1", ScriptRequest::new("result = 1")).await.unwrap();
            assert_eq!(text, "1");
        }
        let rejected = node.submit("10.0.0.1", ScriptRequest::new("result = 1")).await;
        assert!(matches!(
            rejected,
            Err(GateError::AdmissionRejected { limit: 3, window_secs: 60 })
        ));

        // other identities have their own budget
        assert!(node.submit("10.0.0.2", ScriptRequest::new("result = 1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_set_rate_limit_zero_disables() {
        let node = node_with(NodeConfig::default().with_rate_limit(RateLimitConfig::per_minute(1)));
        assert!(node.submit("a", ScriptRequest::new("1")).await.is_ok());
        assert!(node.submit("a", ScriptRequest::new("1")).await.is_err());

        node.set_rate_limit(0);
        for _ in 0..20 {
            assert!(node.submit("a", ScriptRequest::new("1")).await.is_ok());
        }
        assert_eq!(node.info().rate_limit.max_requests, 0);
    }

    #[tokio::test]
    async fn test_submit_renders_script_errors() {
        let node = node();
        let short = node.submit("a", ScriptRequest::new("1/0")).await.unwrap();
        assert_eq!(short, "Error: ZeroDivisionError: division by zero");

        let full = node
            .submit("a", ScriptRequest::new("1/0").with_diagnostics(true))
            .await
            .unwrap();
        assert!(full.contains("Traceback (most recent call last):"));
    }

    #[test]
    fn test_node_query() {
        let node = node();
        let request = QueryRequest::new("copy_rates_from_pos")
            .with_symbol("EURUSD")
            .with_parameter("timeframe", "D1")
            .with_parameter("count", 4);
        let rates = node.query(&request).unwrap();
        assert_eq!(rates.as_array().unwrap().len(), 4);

        // lifecycle operations are never reachable
        let err = node.query(&QueryRequest::new("shutdown")).unwrap_err();
        assert!(matches!(err, GateError::InvalidRequest(_)));
        assert!(node.gateway().is_active());
    }

    #[test]
    fn test_node_query_honours_policy() {
        let policy = NamespacePolicy::default().forbid("terminal_info");
        let node = node_with(NodeConfig::default().with_policy(policy));
        assert!(node.query(&QueryRequest::new("terminal_info")).is_err());
        assert!(node.query(&QueryRequest::new("account_info")).is_ok());
    }

    #[tokio::test]
    async fn test_submit_query_shares_budget() {
        let node = node_with(NodeConfig::default().with_rate_limit(RateLimitConfig::per_minute(2)));
        assert!(node.submit("peer", ScriptRequest::new("1")).await.is_ok());
        assert!(node.submit_query("peer", QueryRequest::new("version")).await.is_ok());

        let rejected = node.submit_query("peer", QueryRequest::new("version")).await;
        assert!(matches!(rejected, Err(GateError::AdmissionRejected { limit: 2, .. })));
    }

    #[test]
    fn test_info() {
        let node = node();
        let info = node.info();
        assert_eq!(info.server_type, "node");
        assert_eq!(info.connection, ConnectionStatus::Active);
        assert!(info.capabilities.iter().any(|name| name == "mt5"));
        for forbidden in DEFAULT_FORBIDDEN {
            assert!(!info.capabilities.iter().any(|name| name == forbidden));
        }
        let mut sorted = info.capabilities.clone();
        sorted.sort();
        assert_eq!(sorted, info.capabilities);
        assert_eq!(node.health().status, "healthy");
    }

    #[test]
    fn test_shutdown_closes_connection() {
        let node = node();
        node.shutdown();
        assert_eq!(node.health().connection, ConnectionStatus::Closed);
        assert!(node.execute(&ScriptRequest::new("1")).starts_with("Error: LifecycleError"));
        assert!(node.info().capabilities.is_empty());
    }
}
