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

//! ScriptGate Server
//!
//! This crate provides the node that runs untrusted analysis scripts against
//! a read-only view of a trading terminal.
//!
//! A request flows through:
//!
//! - [`filter::DangerFilter`]: a textual pre-parse scan
//! - [`namespace::NamespaceBuilder`]: the closed set of callable names
//! - [`runtime::Engine`]: statement rewriting, compilation, name resolution
//!   and evaluation on an embedded Rhai engine
//! - [`terminal::TerminalGateway`]: the fair mutex in front of the terminal
//!
//! [`query`] answers structured single-operation requests straight from the
//! gateway, without a script.
//!
//! [`Node`] chains them behind a per-identity rate limiter, and
//! [`HttpServer`] exposes the node as JSON-RPC over HTTP.

pub mod filter;
pub mod http_router;
pub mod http_server;
pub mod namespace;
pub mod node;
pub mod query;
pub mod resource_limits;
pub mod runtime;
pub mod terminal;

pub use filter::DangerFilter;
pub use http_server::HttpServer;
pub use node::{Node, NodeConfig};
pub use resource_limits::ResourceLimits;
