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

//! # ScriptGate CLI
//!
//! Command-line interface for ScriptGate.
//!
//! ## Key Commands
//!
//! - `scriptgate serve`: Start a node over the simulated terminal
//! - `scriptgate exec`: Run a script locally and print the formatted output
//! - `scriptgate call`: Submit a script to a running node
//! - `scriptgate query`: Run one read-only terminal operation on a node
//! - `scriptgate info`: Print a node's `_info` response
//!
//! This library half holds the pieces of the binary that are worth testing
//! without spawning a process.

use std::io::Read;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use scriptgate_common::rate_limit::RateLimitConfig;
use scriptgate_common::QueryRequest;
use scriptgate_server::namespace::NamespacePolicy;
use scriptgate_server::terminal::{SimulatedConfig, SimulatedTerminal};
use scriptgate_server::{Node, NodeConfig, ResourceLimits};
use serde_json::Value;

/// Node settings taken from the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct ServeOptions {
    /// Requests per window per peer; `0` disables admission control
    pub rate_limit: u32,
    pub window_secs: u64,
    pub max_execution_time_ms: u64,
    /// Names removed from the namespace on top of the defaults
    pub forbid: Vec<String>,
    pub seed: Option<u64>,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            rate_limit: 10,
            window_secs: 60,
            max_execution_time_ms: 30_000,
            forbid: Vec::new(),
            seed: None,
        }
    }
}

/// Validates that a URL string starts with http://
pub fn validate_http_url(url: &str, description: &str) -> Result<()> {
    if url.starts_with("http://") {
        Ok(())
    } else {
        bail!("Invalid {}: '{}' must start with http://", description, url)
    }
}

/// Reads the script to run from `--code`, a file, or stdin (`-`).
///
/// Exactly one source must be given.
pub fn load_script(file: Option<&Path>, code: Option<String>) -> Result<String> {
    match (file, code) {
        (Some(_), Some(_)) => bail!("pass either a script file or --code, not both"),
        (None, Some(code)) => Ok(code),
        (Some(path), None) if path == Path::new("-") => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read script from stdin")?;
            Ok(text)
        }
        (Some(path), None) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read script {}", path.display())),
        (None, None) => bail!("no script given: pass a file, '-' for stdin, or --code"),
    }
}

/// Builds a query from `--param name=value` pairs.
///
/// Values that parse as JSON keep their type, so `count=10` is a number and
/// `enable=false` a boolean; anything else is taken as a string.
pub fn query_request(operation: &str, symbol: Option<String>, params: &[String]) -> Result<QueryRequest> {
    let mut request = QueryRequest::new(operation);
    request.symbol = symbol;
    for param in params {
        let Some((name, raw)) = param.split_once('=') else {
            bail!("invalid --param '{}': expected name=value", param);
        };
        let name = name.trim();
        if name.is_empty() {
            bail!("invalid --param '{}': empty name", param);
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        request = request.with_parameter(name, value);
    }
    Ok(request)
}

/// Builds the node configuration for `options`.
pub fn node_config(options: &ServeOptions) -> Result<NodeConfig> {
    if options.window_secs == 0 {
        bail!("--window-secs must be greater than zero");
    }

    let limits = ResourceLimits::new()
        .with_execution_timeout(Duration::from_millis(options.max_execution_time_ms));
    limits.validate().map_err(anyhow::Error::msg)?;

    let policy = options
        .forbid
        .iter()
        .fold(NamespacePolicy::default(), |policy, name| policy.forbid(name.as_str()));

    Ok(NodeConfig::default()
        .with_limits(limits)
        .with_rate_limit(RateLimitConfig::new(
            options.rate_limit,
            Duration::from_secs(options.window_secs),
        ))
        .with_policy(policy))
}

/// Creates a node over the simulated terminal and opens the connection.
pub fn simulated_node(options: &ServeOptions) -> Result<Node> {
    let mut terminal = SimulatedConfig::default();
    if let Some(seed) = options.seed {
        terminal = terminal.with_seed(seed);
    }
    let node = Node::new(SimulatedTerminal::new(terminal), node_config(options)?)?;
    node.start()?;
    Ok(node)
}
