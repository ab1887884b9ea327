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

use scriptgate_common::{GateError, Result};

/// Retry policy for transient failures.
///
/// Only connection failures and `5xx` responses are retried. Admission
/// rejections, invalid parameters and script errors are returned at once:
/// repeating those requests cannot succeed and would only spend the caller's
/// rate-limit budget.
///
/// # Example
///
/// ```
/// use scriptgate_client::RetryConfig;
/// use std::time::Duration;
///
/// let retry = RetryConfig::new(4, 50, 400, 2.0).unwrap();
/// assert_eq!(retry.backoff(1), Duration::from_millis(50));
/// assert_eq!(retry.backoff(3), Duration::from_millis(200));
/// assert_eq!(retry.backoff(9), Duration::from_millis(400));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl RetryConfig {
    /// # Errors
    ///
    /// Returns `GateError::InvalidRequest` if `max_attempts` is zero, the
    /// multiplier is below 1, or the initial backoff exceeds the maximum.
    pub fn new(
        max_attempts: u32,
        initial_backoff_ms: u64,
        max_backoff_ms: u64,
        multiplier: f64,
    ) -> Result<Self> {
        if max_attempts == 0 {
            return Err(GateError::InvalidRequest("max_attempts must be at least 1".into()));
        }
        if !(multiplier >= 1.0 && multiplier.is_finite()) {
            return Err(GateError::InvalidRequest(format!(
                "multiplier must be a finite number >= 1 (got {})",
                multiplier
            )));
        }
        if initial_backoff_ms > max_backoff_ms {
            return Err(GateError::InvalidRequest(format!(
                "initial backoff ({}ms) exceeds max backoff ({}ms)",
                initial_backoff_ms, max_backoff_ms
            )));
        }
        Ok(Self {
            max_attempts,
            initial_backoff_ms,
            max_backoff_ms,
            multiplier,
        })
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            multiplier: 1.0,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(32) as i32;
        let delay = self.initial_backoff_ms as f64 * self.multiplier.powi(exponent);
        Duration::from_millis(delay.min(self.max_backoff_ms as f64) as u64)
    }
}

impl Default for RetryConfig {
    /// Three attempts, 100ms doubling up to 2s.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 2000,
            multiplier: 2.0,
        }
    }
}
