//! Per-backend request pacing.
//!
//! [`RateLimiter`] enforces a minimum interval of `60s / requests_per_minute`
//! between dispatches to the same backend identity. It is time-based, not a
//! token bucket: each identity has one reserved "next dispatch" slot.
//!
//! A caller reserves the next slot under a short lock, then sleeps until
//! that instant outside the lock. Callers for other identities are never
//! held up, and concurrent callers for one identity queue up one interval
//! apart.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Minimum spacing between calls at `rpm` requests per minute.
///
/// `None` when `rpm == 0` (unpaced).
pub fn min_interval(rpm: u32) -> Option<Duration> {
    (rpm > 0).then(|| Duration::from_millis(60_000 / u64::from(rpm)))
}

/// Paces calls per backend identity.
#[derive(Debug, Default)]
pub struct RateLimiter {
    default_rpm: u32,
    limits: HashMap<String, u32>,
    /// Last reserved dispatch instant per identity.
    last_dispatch: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    /// Create a limiter applying `default_rpm` to identities without an
    /// explicit limit (`0` = unpaced).
    pub fn new(default_rpm: u32) -> Self {
        Self {
            default_rpm,
            ..Self::default()
        }
    }

    /// Set the requests-per-minute ceiling for one identity.
    pub fn with_limit(mut self, identity: impl Into<String>, rpm: u32) -> Self {
        self.set_limit(identity, rpm);
        self
    }

    /// Set the requests-per-minute ceiling for one identity.
    pub fn set_limit(&mut self, identity: impl Into<String>, rpm: u32) {
        self.limits.insert(identity.into(), rpm);
    }

    /// Effective ceiling for `identity`.
    pub fn limit_for(&self, identity: &str) -> u32 {
        self.limits
            .get(identity)
            .copied()
            .unwrap_or(self.default_rpm)
    }

    /// Run `f` once the identity's pacing interval has elapsed.
    ///
    /// The first call for an identity runs immediately.
    pub async fn throttle<F, Fut, T>(&self, identity: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if let Some(wait) = self.reserve(identity) {
            debug!(
                backend = identity,
                wait_ms = wait.as_millis() as u64,
                "pacing request"
            );
            tokio::time::sleep(wait).await;
        }
        f().await
    }

    /// Reserve the next dispatch slot; returns how long to wait for it.
    fn reserve(&self, identity: &str) -> Option<Duration> {
        let interval = min_interval(self.limit_for(identity))?;
        let now = Instant::now();
        let mut last = self
            .last_dispatch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let slot = match last.get(identity) {
            Some(prev) => (*prev + interval).max(now),
            None => now,
        };
        last.insert(identity.to_string(), slot);
        drop(last);

        let wait = slot.saturating_duration_since(now);
        (!wait.is_zero()).then_some(wait)
    }

    /// Forget all recorded dispatches; the next call per identity runs
    /// immediately.
    ///
    /// For separating unrelated workloads (e.g. comparison runs), not for
    /// use between batches of one run.
    pub fn reset(&self) {
        self.last_dispatch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}
