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

//! Request Admission for ScriptGate
//!
//! This module bounds how many script submissions a single caller identity
//! (typically the peer IP address) may make within a trailing time window.
//!
//! # Architecture
//!
//! Each identity owns a [`RateRecord`]: the ordered timestamps of its admitted
//! requests that still fall inside the window. An admission check:
//!
//! 1. purges timestamps older than the window,
//! 2. rejects if the remaining count is at or above the threshold (the record
//!    is left untouched),
//! 3. otherwise appends `now` and admits.
//!
//! A threshold of `0` disables admission control entirely. Disabled checks
//! do not record anything, so the store cannot grow while limiting is off.
//!
//! # Concurrency
//!
//! The outer map lock is only held long enough to find (or create) the
//! identity's record. The purge/check/append sequence runs under that
//! record's own lock, so distinct identities never contend with each other
//! while a single identity's read-modify-write stays atomic.
//!
//! Cleanup removes a record only while holding its lock and marks it
//! detached. An admission that locks a detached record looks the identity up
//! again, so a timestamp is never appended to a record the store has dropped.
//!
//! # Example
//!
//! ```
//! use scriptgate_common::rate_limit::{RateLimiter, RateLimitConfig};
//! use std::time::Duration;
//!
//! let limiter = RateLimiter::new(RateLimitConfig::new(3, Duration::from_secs(60)));
//!
//! for _ in 0..3 {
//!     assert!(limiter.admit("10.0.0.1").is_allowed());
//! }
//! assert!(!limiter.admit("10.0.0.1").is_allowed());
//!
//! // other callers keep their own budget
//! assert!(limiter.admit("10.0.0.2").is_allowed());
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::protocol::error::GateError;

/// Default number of requests admitted per window.
pub const DEFAULT_MAX_REQUESTS: u32 = 10;

/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Configuration for admission control.
///
/// # Fields
///
/// * `max_requests` - Requests admitted per identity per window (`0` disables limiting)
/// * `window` - Length of the trailing window
/// * `cleanup_interval` - How often idle identities are dropped from the store
///
/// # Example
///
/// ```
/// use scriptgate_common::rate_limit::RateLimitConfig;
///
/// let config = RateLimitConfig::per_minute(10);
/// assert_eq!(config.max_requests, 10);
/// assert_eq!(config.window.as_secs(), 60);
/// ```
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
    pub cleanup_interval: Duration,
}

impl RateLimitConfig {
    /// Creates a configuration admitting `max_requests` per `window`.
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            cleanup_interval: Duration::from_secs(60),
        }
    }

    /// Creates a configuration admitting `max_requests` per minute.
    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    /// Creates a configuration with admission control switched off.
    pub fn disabled() -> Self {
        Self::new(0, DEFAULT_WINDOW)
    }

    /// Sets how often idle identities are purged from the store.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}

impl Default for RateLimitConfig {
    /// Ten requests per minute per identity.
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }
}

/// Result of an admission check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Request may proceed
    Allowed,
    /// Request exceeds the identity's budget for the current window
    Rejected {
        /// Threshold in force when the request was rejected
        limit: u32,
        /// Window length
        window: Duration,
        /// Time until the oldest recorded request leaves the window
        retry_after: Duration,
    },
}

impl Admission {
    /// Returns whether the request is allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Returns the retry-after duration if rejected.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Allowed => None,
            Self::Rejected { retry_after, .. } => Some(*retry_after),
        }
    }

    /// Converts a rejection into the error surfaced to the transport layer.
    pub fn into_result(self) -> Result<(), GateError> {
        match self {
            Self::Allowed => Ok(()),
            Self::Rejected { limit, window, .. } => Err(GateError::AdmissionRejected {
                limit,
                window_secs: window.as_secs(),
            }),
        }
    }
}

/// Timestamps of one identity's admitted requests inside the window.
#[derive(Debug, Default)]
pub struct RateRecord {
    stamps: VecDeque<Instant>,
    /// Set once cleanup has removed the record from the store.
    detached: bool,
}

impl RateRecord {
    /// Drops every timestamp that is older than `window` relative to `now`.
    fn purge(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.stamps.front() {
            if now.saturating_duration_since(*oldest) >= window {
                self.stamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Number of requests currently counted against the identity.
    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }
}

/// Sliding-window rate limiter keyed by caller identity.
///
/// # Thread Safety
///
/// Cloning is cheap and yields a handle to the same store and threshold.
#[derive(Clone)]
pub struct RateLimiter {
    threshold: Arc<AtomicU32>,
    window: Duration,
    cleanup_interval: Duration,
    records: Arc<Mutex<HashMap<String, Arc<Mutex<RateRecord>>>>>,
    last_cleanup: Arc<Mutex<Instant>>,
}

impl RateLimiter {
    /// Creates a new rate limiter with the given configuration.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            threshold: Arc::new(AtomicU32::new(config.max_requests)),
            window: config.window,
            cleanup_interval: config.cleanup_interval,
            records: Arc::new(Mutex::new(HashMap::new())),
            last_cleanup: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Creates a rate limiter that admits everything.
    pub fn disabled() -> Self {
        Self::new(RateLimitConfig::disabled())
    }

    /// Current threshold; `0` means disabled.
    pub fn threshold(&self) -> u32 {
        self.threshold.load(Ordering::Acquire)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Reconfigures the threshold.
    ///
    /// Takes effect on the next admission check. Already recorded timestamps
    /// are kept, so lowering the threshold can reject an identity that was
    /// within budget a moment ago.
    pub fn set_threshold(&self, max_requests: u32) {
        let previous = self.threshold.swap(max_requests, Ordering::AcqRel);
        if previous != max_requests {
            tracing::info!(previous, max_requests, "rate limit threshold changed");
        }
    }

    /// Checks whether `identity` may submit a request right now.
    pub fn admit(&self, identity: &str) -> Admission {
        self.admit_at(identity, Instant::now())
    }

    /// Checks whether `identity` may submit a request at `now`.
    ///
    /// # Arguments
    ///
    /// * `identity` - Caller identity, e.g. the peer IP rendered as a string
    /// * `now` - Time of the request; callers must pass non-decreasing values
    ///
    /// # Returns
    ///
    /// [`Admission::Allowed`] after recording `now`, or
    /// [`Admission::Rejected`] without touching the record
    pub fn admit_at(&self, identity: &str, now: Instant) -> Admission {
        let limit = self.threshold();
        if limit == 0 {
            return Admission::Allowed;
        }

        self.maybe_cleanup(now);

        loop {
            let record = self.record_for(identity);
            let mut record = record.lock();
            if record.detached {
                continue;
            }
            record.purge(now, self.window);

            if record.len() >= limit as usize {
                let retry_after = record
                    .stamps
                    .front()
                    .map(|oldest| self.window.saturating_sub(now.saturating_duration_since(*oldest)))
                    .unwrap_or(self.window);
                tracing::debug!(identity, limit, "admission rejected");
                return Admission::Rejected {
                    limit,
                    window: self.window,
                    retry_after,
                };
            }

            record.stamps.push_back(now);
            return Admission::Allowed;
        }
    }

    /// The store's record for `identity`, created empty if missing.
    fn record_for(&self, identity: &str) -> Arc<Mutex<RateRecord>> {
        let mut records = self.records.lock();
        Arc::clone(records.entry(identity.to_string()).or_default())
    }

    /// Number of requests currently counted for `identity`.
    pub fn recorded(&self, identity: &str) -> usize {
        let record = self.records.lock().get(identity).cloned();
        record.map(|r| r.lock().len()).unwrap_or(0)
    }

    /// Number of identities with a record in the store.
    pub fn tracked_identities(&self) -> usize {
        self.records.lock().len()
    }

    fn maybe_cleanup(&self, now: Instant) {
        {
            let mut last_cleanup = self.last_cleanup.lock();
            if now.saturating_duration_since(*last_cleanup) < self.cleanup_interval {
                return;
            }
            *last_cleanup = now;
        }
        self.cleanup(now);
    }

    /// Drops records whose every timestamp has left the window.
    fn cleanup(&self, now: Instant) {
        let window = self.window;
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, record| {
            let mut record = record.lock();
            record.purge(now, window);
            if record.is_empty() {
                record.detached = true;
                return false;
            }
            true
        });
        let removed = before - records.len();
        if removed > 0 {
            tracing::debug!(removed, "dropped idle rate records");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig::new(
            max_requests,
            Duration::from_secs(window_secs),
        ))
    }

    #[test]
    fn test_fourth_request_in_window_is_rejected() {
        let limiter = limiter(3, 60);
        let start = Instant::now();

        for i in 0..3 {
            let now = start + Duration::from_secs(i);
            assert!(limiter.admit_at("1.2.3.4", now).is_allowed());
        }
        let fourth = limiter.admit_at("1.2.3.4", start + Duration::from_secs(3));
        match fourth {
            Admission::Rejected { limit, window, retry_after } => {
                assert_eq!(limit, 3);
                assert_eq!(window, Duration::from_secs(60));
                assert_eq!(retry_after, Duration::from_secs(57));
            }
            Admission::Allowed => panic!("fourth request should be rejected"),
        }
    }

    #[test]
    fn test_rejection_does_not_record() {
        let limiter = limiter(2, 60);
        let now = Instant::now();
        limiter.admit_at("a", now);
        limiter.admit_at("a", now);
        for _ in 0..5 {
            assert!(!limiter.admit_at("a", now).is_allowed());
        }
        assert_eq!(limiter.recorded("a"), 2);
    }

    #[test]
    fn test_allowed_again_after_window() {
        let limiter = limiter(3, 60);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.admit_at("a", start);
        }
        assert!(!limiter.admit_at("a", start + Duration::from_secs(59)).is_allowed());
        assert!(limiter.admit_at("a", start + Duration::from_secs(60)).is_allowed());
        assert_eq!(limiter.recorded("a"), 1);
    }

    #[test]
    fn test_window_slides_per_timestamp() {
        let limiter = limiter(2, 10);
        let start = Instant::now();
        assert!(limiter.admit_at("a", start).is_allowed());
        assert!(limiter.admit_at("a", start + Duration::from_secs(5)).is_allowed());
        assert!(!limiter.admit_at("a", start + Duration::from_secs(9)).is_allowed());
        // only the first stamp has expired
        assert!(limiter.admit_at("a", start + Duration::from_secs(10)).is_allowed());
        assert!(!limiter.admit_at("a", start + Duration::from_secs(14)).is_allowed());
    }

    #[test]
    fn test_identities_are_independent() {
        let limiter = limiter(1, 60);
        let now = Instant::now();
        assert!(limiter.admit_at("a", now).is_allowed());
        assert!(!limiter.admit_at("a", now).is_allowed());
        assert!(limiter.admit_at("b", now).is_allowed());
    }

    #[test]
    fn test_zero_threshold_disables_without_recording() {
        let limiter = limiter(0, 60);
        for _ in 0..100 {
            assert!(limiter.admit("a").is_allowed());
        }
        assert_eq!(limiter.recorded("a"), 0);
        assert_eq!(limiter.tracked_identities(), 0);
    }

    #[test]
    fn test_set_threshold_applies_to_next_check() {
        let limiter = limiter(5, 60);
        let now = Instant::now();
        for _ in 0..3 {
            assert!(limiter.admit_at("a", now).is_allowed());
        }
        limiter.set_threshold(3);
        assert!(!limiter.admit_at("a", now).is_allowed());

        limiter.set_threshold(0);
        assert!(limiter.admit_at("a", now).is_allowed());
        assert_eq!(limiter.recorded("a"), 3);

        limiter.set_threshold(4);
        assert!(limiter.admit_at("a", now).is_allowed());
        assert!(!limiter.admit_at("a", now).is_allowed());
    }

    #[test]
    fn test_into_result() {
        let limiter = limiter(1, 60);
        assert!(limiter.admit("a").into_result().is_ok());
        let err = limiter.admit("a").into_result().unwrap_err();
        assert_eq!(
            err,
            GateError::AdmissionRejected {
                limit: 1,
                window_secs: 60
            }
        );
    }

    #[test]
    fn test_cleanup_drops_idle_identities() {
        let limiter = RateLimiter::new(
            RateLimitConfig::new(5, Duration::from_secs(10))
                .with_cleanup_interval(Duration::from_secs(1)),
        );
        let start = Instant::now();
        limiter.admit_at("a", start);
        limiter.admit_at("b", start);
        assert_eq!(limiter.tracked_identities(), 2);

        limiter.admit_at("c", start + Duration::from_secs(30));
        assert_eq!(limiter.tracked_identities(), 1);
    }

    #[test]
    fn test_detached_record_is_not_reused() {
        let limiter = limiter(3, 10);
        let start = Instant::now();
        limiter.admit_at("a", start);

        let stale = limiter.record_for("a");
        limiter.cleanup(start + Duration::from_secs(20));
        assert!(stale.lock().detached);
        assert_eq!(limiter.tracked_identities(), 0);

        assert!(limiter.admit_at("a", start + Duration::from_secs(21)).is_allowed());
        assert_eq!(limiter.recorded("a"), 1);
        assert!(stale.lock().is_empty());
    }

    #[test]
    fn test_concurrent_admissions_with_constant_cleanup() {
        let limiter = RateLimiter::new(
            RateLimitConfig::new(100, Duration::from_secs(60))
                .with_cleanup_interval(Duration::ZERO),
        );
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .filter(|_| limiter.admit("shared").is_allowed())
                        .count()
                })
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(admitted, 100);
        assert_eq!(limiter.recorded("shared"), 100);
    }

    #[test]
    fn test_clone_shares_state() {
        let limiter = limiter(1, 60);
        let other = limiter.clone();
        assert!(limiter.admit("a").is_allowed());
        assert!(!other.admit("a").is_allowed());
        other.set_threshold(2);
        assert_eq!(limiter.threshold(), 2);
    }
}
