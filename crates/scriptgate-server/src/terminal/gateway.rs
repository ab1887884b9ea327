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

//! Serialized access to the terminal connection.
//!
//! # Guarantees
//!
//! - At most one operation is inside the terminal at any instant.
//! - Waiters are served in arrival order: the lock is released with
//!   [`MutexGuard::unlock_fair`], which hands it straight to the next queued
//!   thread instead of letting a late arrival barge in.
//! - A rejection sentinel is converted into a `ResourceError` while the lock
//!   is still held, so the diagnostic read from `last_error` belongs to the
//!   same call and cannot be overwritten by another caller.
//! - The lock is released on every exit path, including a panicking call
//!   (`parking_lot` mutexes do not poison).
//!
//! The connection state lives in an atomic next to the lock so health checks
//! and namespace builds can read it without queueing behind a slow call.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use parking_lot::{Mutex, MutexGuard};
use scriptgate_common::protocol::builtin::ConnectionStatus;
use scriptgate_common::GateError;
use tracing::{debug, info, warn};

use super::Terminal;

const UNINITIALIZED: u8 = 0;
const ACTIVE: u8 = 1;
const CLOSED: u8 = 2;

/// Owner of the single terminal connection.
pub struct TerminalGateway {
    terminal: Mutex<Box<dyn Terminal>>,
    state: AtomicU8,
    /// Incremented on every successful `start`
    epoch: AtomicU64,
}

impl TerminalGateway {
    pub fn new(terminal: impl Terminal + 'static) -> Self {
        Self::from_boxed(Box::new(terminal))
    }

    pub fn from_boxed(terminal: Box<dyn Terminal>) -> Self {
        Self {
            terminal: Mutex::new(terminal),
            state: AtomicU8::new(UNINITIALIZED),
            epoch: AtomicU64::new(0),
        }
    }

    /// Opens the connection.
    ///
    /// Starting an active gateway is a no-op. A closed gateway cannot be
    /// restarted.
    ///
    /// # Errors
    ///
    /// Returns `GateError::Lifecycle` if the gateway is closed or the terminal
    /// refuses to initialize; the state then stays `Uninitialized`.
    pub fn start(&self) -> Result<(), GateError> {
        let mut terminal = self.terminal.lock();

        let result = match self.state.load(Ordering::Acquire) {
            ACTIVE => Ok(()),
            CLOSED => Err(GateError::Lifecycle(
                "terminal connection was closed and cannot be restarted".to_string(),
            )),
            _ if terminal.initialize() => {
                let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
                self.state.store(ACTIVE, Ordering::Release);
                info!(epoch, "Terminal connection active");
                Ok(())
            }
            _ => {
                let fault = terminal.last_error();
                warn!(code = fault.code, message = %fault.message, "Terminal refused to initialize");
                Err(GateError::Lifecycle(format!(
                    "terminal refused to initialize: {}",
                    fault
                )))
            }
        };

        MutexGuard::unlock_fair(terminal);
        result
    }

    /// Shuts the connection down. Idempotent; the gateway ends `Closed`.
    pub fn stop(&self) {
        let mut terminal = self.terminal.lock();
        let previous = self.state.swap(CLOSED, Ordering::AcqRel);
        if previous == ACTIVE {
            terminal.shutdown();
            info!("Terminal connection closed");
        }
        MutexGuard::unlock_fair(terminal);
    }

    pub fn state(&self) -> ConnectionStatus {
        match self.state.load(Ordering::Acquire) {
            ACTIVE => ConnectionStatus::Active,
            CLOSED => ConnectionStatus::Closed,
            _ => ConnectionStatus::Uninitialized,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.load(Ordering::Acquire) == ACTIVE
    }

    /// Number of successful starts so far. Changes whenever the connection is re-established.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Runs `f` against the terminal with exclusive access.
    ///
    /// # Errors
    ///
    /// - `GateError::Lifecycle` if the connection is not active
    /// - `GateError::Resource` if `f` returns the rejection sentinel; the
    ///   error carries the terminal's `last_error` diagnostic
    pub fn call<T, F>(&self, operation: &str, f: F) -> Result<T, GateError>
    where
        F: FnOnce(&mut dyn Terminal) -> Option<T>,
    {
        let mut terminal = self.terminal.lock();

        // checked under the lock so `stop` cannot slip in between check and call
        if self.state.load(Ordering::Acquire) != ACTIVE {
            let state = self.state();
            MutexGuard::unlock_fair(terminal);
            return Err(GateError::Lifecycle(format!(
                "cannot call {}: terminal connection is {}",
                operation, state
            )));
        }

        let result = match f(terminal.as_mut()) {
            Some(value) => Ok(value),
            None => {
                let fault = terminal.last_error();
                debug!(operation, code = fault.code, "Terminal rejected operation");
                Err(GateError::Resource {
                    operation: operation.to_string(),
                    fault: Some(fault),
                })
            }
        };

        MutexGuard::unlock_fair(terminal);
        result
    }
}

impl Drop for TerminalGateway {
    fn drop(&mut self) {
        if *self.state.get_mut() == ACTIVE {
            self.terminal.get_mut().shutdown();
        }
    }
}
