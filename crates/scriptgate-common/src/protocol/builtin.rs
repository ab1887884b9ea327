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

//! Built-in procedure response types
//!
//! This module defines the response schemas for the built-in procedures a
//! node answers besides `execute` (`_info`, `_health`). They are the single
//! source of truth for the wire format of those endpoints.

use serde::{Deserialize, Serialize};

// ============================================================================
// Connection State
// ============================================================================

/// Lifecycle state of the terminal connection as reported over the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// `start` has not succeeded yet
    Uninitialized,
    /// Capability calls are accepted
    Active,
    /// The connection was shut down and cannot be reopened
    Closed,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Uninitialized => "uninitialized",
            ConnectionStatus::Active => "active",
            ConnectionStatus::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Health Response
// ============================================================================

/// Health check response returned by the `_health` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    /// `healthy` when the terminal is active, `degraded` otherwise
    pub status: String,
    pub connection: ConnectionStatus,
}

impl HealthResponse {
    /// Builds a health response from the current connection state.
    ///
    /// # Example
    /// ```rust
    /// use scriptgate_common::protocol::builtin::{ConnectionStatus, HealthResponse};
    ///
    /// let response = HealthResponse::from_status(ConnectionStatus::Active);
    /// assert_eq!(response.status, "healthy");
    /// ```
    pub fn from_status(connection: ConnectionStatus) -> Self {
        let status = match connection {
            ConnectionStatus::Active => "healthy",
            _ => "degraded",
        };
        Self {
            status: status.to_string(),
            connection,
        }
    }
}

// ============================================================================
// Info Response
// ============================================================================

/// Admission settings currently in force.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Requests allowed per window; `0` means admission control is off
    pub max_requests: u32,
    pub window_secs: u64,
}

/// Response of the `_info` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InfoResponse {
    pub server_type: String,
    pub version: String,
    pub connection: ConnectionStatus,
    /// Names bound in every script namespace, sorted
    pub capabilities: Vec<String>,
    pub rate_limit: RateLimitInfo,
    pub uptime_ms: u64,
}
