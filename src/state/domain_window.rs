use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Tracks request starts to one destination domain
///
/// This structure keeps a sliding-window log of when calls to the domain
/// started, which is what the rate limiter consults before admitting a new
/// call. It also remembers whether the domain asked us to back off (HTTP 429).
#[derive(Debug, Clone, Default)]
pub struct DomainWindow {
    /// Start instants of calls still inside the current window, oldest first
    starts: VecDeque<Instant>,

    /// Total number of calls admitted to this domain since process start
    pub request_count: u64,

    /// Timestamp of the last admitted call
    pub last_request_time: Option<Instant>,

    /// The domain answered 429; no calls are admitted before this instant
    pub throttled_until: Option<Instant>,
}

impl DomainWindow {
    /// Creates an empty window
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops call starts that have left the window
    pub fn prune(&mut self, window: Duration, now: Instant) {
        while let Some(oldest) = self.starts.front() {
            if now.saturating_duration_since(*oldest) >= window {
                self.starts.pop_front();
            } else {
                break;
            }
        }

        if matches!(self.throttled_until, Some(until) if now >= until) {
            self.throttled_until = None;
        }
    }

    /// Checks if a call can start now
    ///
    /// # Arguments
    ///
    /// * `limit` - Maximum call starts allowed within one window
    /// * `window` - Length of the sliding window
    /// * `now` - The current time instant
    pub fn can_request(&self, limit: usize, window: Duration, now: Instant) -> bool {
        self.time_until_next_request(limit, window, now).is_none()
    }

    /// Calculates the time until the next call can start
    ///
    /// Returns None if a call can start now, or the duration to wait otherwise.
    pub fn time_until_next_request(
        &self,
        limit: usize,
        window: Duration,
        now: Instant,
    ) -> Option<Duration> {
        if let Some(until) = self.throttled_until {
            if now < until {
                return Some(until - now);
            }
        }

        let live: Vec<&Instant> = self
            .starts
            .iter()
            .filter(|start| now.saturating_duration_since(**start) < window)
            .collect();

        if live.len() < limit {
            return None;
        }

        // The call that frees a slot is the one `limit` positions from the end
        let blocking = live[live.len() - limit];
        let frees_at = *blocking + window;
        Some(frees_at.saturating_duration_since(now).max(Duration::from_millis(1)))
    }

    /// Records that a call to this domain started
    pub fn record_request(&mut self, now: Instant) {
        self.starts.push_back(now);
        self.request_count += 1;
        self.last_request_time = Some(now);
    }

    /// Blocks the domain until `until` (e.g., after HTTP 429)
    pub fn mark_throttled(&mut self, until: Instant) {
        self.throttled_until = Some(match self.throttled_until {
            Some(existing) if existing > until => existing,
            _ => until,
        });
    }

    /// Number of call starts currently inside the window
    pub fn in_window(&self) -> usize {
        self.starts.len()
    }
}
