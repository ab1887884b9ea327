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

//! ScriptGate Common Types and Transport
//!
//! This crate provides the pieces shared by ScriptGate nodes, clients and the
//! CLI.
//!
//! # Overview
//!
//! ScriptGate lets a semi-trusted caller submit short scripts that run
//! against a fixed, read-only set of capabilities backed by a single stateful
//! terminal connection. This crate contains:
//!
//! - **Protocol Layer**: the [`GateError`] taxonomy, [`ScriptRequest`], the
//!   JSON-RPC 2.0 envelope and the built-in `_info`/`_health` schemas
//! - **Transport Layer**: HTTP helpers converting between hyper and JSON-RPC
//! - **Admission Control**: the per-identity sliding-window [`rate_limit::RateLimiter`]
//!
//! # Example
//!
//! ```
//! use scriptgate_common::{GateError, ScriptRequest};
//! use scriptgate_common::rate_limit::{RateLimitConfig, RateLimiter};
//!
//! let limiter = RateLimiter::new(RateLimitConfig::per_minute(1));
//! let request = ScriptRequest::new("result = 2 + 2").with_diagnostics(true);
//!
//! assert!(limiter.admit("127.0.0.1").is_allowed());
//! let rejected = limiter.admit("127.0.0.1").into_result();
//! assert!(matches!(rejected, Err(GateError::AdmissionRejected { .. })));
//! # let _ = request;
//! ```

pub mod protocol;
pub mod rate_limit;
pub mod transport;

pub use protocol::*;
