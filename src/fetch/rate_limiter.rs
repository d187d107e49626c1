//! Per-domain sliding-window rate limiter
//!
//! No more than `limit` calls to one destination domain may start within any
//! `window`. State is process-local and resets on restart.

use crate::state::DomainWindow;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Source of the current instant
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Clock backed by tokio's timer (honors paused time in tests)
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Sliding-window rate limiter keyed by domain
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    clock: Arc<dyn Clock>,
    domains: Mutex<HashMap<String, DomainWindow>>,
}

impl RateLimiter {
    /// Creates a limiter allowing `limit` call starts per `window` per domain
    pub fn new(limit: u32, window: Duration) -> Self {
        Self::with_clock(limit, window, Arc::new(TokioClock))
    }

    /// Creates a limiter reading time from `clock`
    pub fn with_clock(limit: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            limit: limit.max(1) as usize,
            window,
            clock,
            domains: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Admits a call to `domain` if the window has capacity
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The call start was recorded
    /// * `Err(Duration)` - How long to wait before trying again
    pub fn try_acquire(&self, domain: &str) -> Result<(), Duration> {
        let now = self.clock.now();
        let mut domains = self
            .domains
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let entry = domains.entry(domain.to_string()).or_default();
        entry.prune(self.window, now);

        match entry.time_until_next_request(self.limit, self.window, now) {
            None => {
                entry.record_request(now);
                Ok(())
            }
            Some(wait) => Err(wait),
        }
    }

    /// Waits until a call to `domain` may start, then records it
    pub async fn acquire(&self, domain: &str) {
        loop {
            match self.try_acquire(domain) {
                Ok(()) => return,
                Err(wait) => {
                    debug!(domain = %domain, wait_ms = wait.as_millis() as u64, "Rate limited");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Blocks `domain` for one full window (used after HTTP 429)
    pub fn mark_throttled(&self, domain: &str) {
        let until = self.clock.now() + self.window;
        let mut domains = self
            .domains
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        domains
            .entry(domain.to_string())
            .or_default()
            .mark_throttled(until);
    }

    /// Total calls admitted to `domain` since startup
    pub fn request_count(&self, domain: &str) -> u64 {
        let domains = self
            .domains
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        domains.get(domain).map(|d| d.request_count).unwrap_or(0)
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("limit", &self.limit)
            .field("window", &self.window)
            .finish()
    }
}
