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

//! Resource limits for script execution.
//!
//! The script engine checks these limits cooperatively: the deadline every
//! few hundred operations, the call depth on every function call and the
//! collection cap whenever an array, map or string grows. Breaching one
//! aborts the script like any other failure, so the terminal lock and the
//! output buffer are released on the same path.

use std::time::Duration;

/// Resource limits for script execution.
///
/// # Fields
///
/// - `execution_timeout` - Wall-clock budget for one script (default: 30 seconds)
/// - `max_call_depth` - Nesting depth of user function calls (default: 64)
/// - `max_collection_len` - Largest array, map or string a script may build (default: 10 million)
///
/// # Memory Limiting
///
/// There is no general memory ceiling. `max_collection_len` only stops the
/// obvious blow-ups such as padding an array to a trillion elements.
///
/// # Example
///
/// ```
/// use scriptgate_server::ResourceLimits;
/// use std::time::Duration;
///
/// let limits = ResourceLimits::new()
///     .with_execution_timeout(Duration::from_secs(5))
///     .with_max_call_depth(32);
/// assert!(limits.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceLimits {
    pub execution_timeout: Duration,
    pub max_call_depth: usize,
    pub max_collection_len: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            execution_timeout: Duration::from_secs(30),
            max_call_depth: 64,
            max_collection_len: 10_000_000,
        }
    }
}

impl ResourceLimits {
    /// Creates a new ResourceLimits with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum execution timeout.
    ///
    /// # Parameters
    ///
    /// * `timeout` - Maximum wall-clock duration of one script
    ///
    /// # Returns
    ///
    /// `Self` for builder pattern chaining.
    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_max_collection_len(mut self, len: usize) -> Self {
        self.max_collection_len = len;
        self
    }

    /// Validates the resource limits configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Execution timeout is zero or longer than one hour
    /// - Call depth is zero or above 1000 (deeper recursion would overflow the native stack)
    /// - Collection cap is zero
    pub fn validate(&self) -> Result<(), String> {
        if self.execution_timeout.is_zero() {
            return Err("execution timeout must be greater than zero".to_string());
        }

        if self.execution_timeout.as_secs() > 3600 {
            return Err(format!(
                "execution timeout must be <= 1 hour (got {} seconds)",
                self.execution_timeout.as_secs()
            ));
        }

        if self.max_call_depth == 0 || self.max_call_depth > 1000 {
            return Err(format!(
                "max call depth must be between 1 and 1000 (got {})",
                self.max_call_depth
            ));
        }

        if self.max_collection_len == 0 {
            return Err("max collection length must be greater than zero".to_string());
        }

        Ok(())
    }
}
