//! The shared fetch primitive
//!
//! Every page request made by an adapter goes through `FetchClient::fetch`:
//!
//! 1. Wait for a rate-limit slot for the destination domain
//! 2. Pick a user agent and (if enabled) a proxy
//! 3. Send the request through the transport
//! 4. Classify the outcome and retry transient failures with backoff
//!
//! Each attempt takes its own rate-limit slot, retries included.

use crate::config::{FetchConfig, ScrapeSettings};
use crate::fetch::rate_limiter::RateLimiter;
use crate::fetch::retry::RetryPolicy;
use crate::fetch::transport::{ReqwestTransport, Transport, TransportRequest};
use crate::FetchError;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// Per-configuration fetch behavior
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Replaces the rotating user-agent pool when set
    pub user_agent: Option<String>,

    pub proxy_enabled: bool,

    /// Tenant proxy, added to the service-wide pool
    pub proxy_url: Option<String>,
}

impl FetchPolicy {
    /// Extracts the fetch-related settings of a configuration
    pub fn from_settings(settings: &ScrapeSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            user_agent: settings.user_agent.clone(),
            proxy_enabled: settings.proxy_enabled,
            proxy_url: settings.proxy_url.clone(),
        }
    }
}

/// A successfully fetched page
#[derive(Debug, Clone)]
pub struct PageContent {
    /// URL after redirects
    pub final_url: Url,
    pub status: u16,
    pub body: String,

    /// Number of attempts it took (1 = first try)
    pub attempts: u32,
}

/// Rate-limited, retrying HTTP fetch client
pub struct FetchClient {
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
    base_delay: Duration,
    max_delay: Duration,
    user_agents: Vec<String>,
    proxies: Vec<String>,
}

impl FetchClient {
    /// Creates a client over an explicit transport and rate limiter
    ///
    /// Backoff defaults to 500 ms doubling up to 30 s; the user-agent and
    /// proxy pools start empty.
    pub fn new(transport: Arc<dyn Transport>, limiter: Arc<RateLimiter>) -> Self {
        let defaults = RetryPolicy::default();
        Self {
            transport,
            limiter,
            base_delay: defaults.base_delay,
            max_delay: defaults.max_delay,
            user_agents: Vec::new(),
            proxies: Vec::new(),
        }
    }

    /// Builds the production client from the `[fetch]` config section
    pub fn from_config(config: &FetchConfig) -> Self {
        let transport = ReqwestTransport::new(
            Duration::from_secs(config.timeout_seconds),
            Duration::from_secs(config.connect_timeout_seconds),
        );
        let limiter = RateLimiter::new(
            config.requests_per_window,
            Duration::from_secs(config.window_seconds),
        );

        Self::new(Arc::new(transport), Arc::new(limiter))
            .with_backoff(
                Duration::from_millis(config.backoff_base_ms),
                Duration::from_millis(config.backoff_max_ms),
            )
            .with_user_agents(config.user_agents.clone())
            .with_proxies(config.proxies.clone())
    }

    pub fn with_backoff(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    pub fn with_user_agents(mut self, user_agents: Vec<String>) -> Self {
        self.user_agents = user_agents;
        self
    }

    pub fn with_proxies(mut self, proxies: Vec<String>) -> Self {
        self.proxies = proxies;
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Service-wide proxies shared by configurations that enable proxying
    pub fn proxy_pool(&self) -> &[String] {
        &self.proxies
    }

    /// Fetches a page
    ///
    /// # Arguments
    ///
    /// * `url` - The page to fetch
    /// * `policy` - Retry budget, user-agent override and proxy settings
    /// * `cancel` - Observed while waiting for a slot, in flight and during backoff
    ///
    /// # Returns
    ///
    /// * `Ok(PageContent)` - A 2xx response
    /// * `Err(FetchError::Rejected)` - A non-retryable HTTP status
    /// * `Err(FetchError::Exhausted)` - Transient failures used up the retry budget
    /// * `Err(FetchError::Cancelled)` - The token was cancelled
    pub async fn fetch(
        &self,
        url: &Url,
        policy: &FetchPolicy,
        cancel: &CancellationToken,
    ) -> Result<PageContent, FetchError> {
        let domain = url
            .host_str()
            .ok_or_else(|| FetchError::InvalidUrl(url.to_string()))?
            .to_lowercase();
        let retry = RetryPolicy::new(policy.max_retries, self.base_delay, self.max_delay);
        let cancelled = || FetchError::Cancelled {
            url: url.to_string(),
        };

        let mut attempt: u32 = 0;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                _ = self.limiter.acquire(&domain) => {}
            }

            let request = TransportRequest {
                url: url.clone(),
                user_agent: self.pick_user_agent(policy),
                proxy: self.pick_proxy(policy),
            };
            let proxied = request.proxy.is_some();

            let started = Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                outcome = self.transport.get(request) => outcome,
            };
            let latency_ms = started.elapsed().as_millis() as u64;

            let last_error = match outcome {
                Ok(response) if (200..300).contains(&response.status) => {
                    debug!(
                        url = %url,
                        status = response.status,
                        latency_ms,
                        attempt = attempt + 1,
                        proxied,
                        "Fetched page"
                    );
                    return Ok(PageContent {
                        final_url: response.final_url,
                        status: response.status,
                        body: response.body,
                        attempts: attempt + 1,
                    });
                }
                Ok(response) if response.status == 429 => {
                    self.limiter.mark_throttled(&domain);
                    warn!(url = %url, status = 429, latency_ms, attempt = attempt + 1, "Throttled by server");
                    "HTTP 429".to_string()
                }
                Ok(response) if response.status >= 500 => {
                    warn!(url = %url, status = response.status, latency_ms, attempt = attempt + 1, "Server error");
                    format!("HTTP {}", response.status)
                }
                Ok(response) => {
                    warn!(url = %url, status = response.status, latency_ms, attempt = attempt + 1, "Request rejected");
                    return Err(FetchError::Rejected {
                        url: url.to_string(),
                        status: response.status,
                    });
                }
                Err(e) if !e.is_transient() => {
                    return Err(FetchError::Client(e.to_string()));
                }
                Err(e) => {
                    warn!(url = %url, error = %e, latency_ms, attempt = attempt + 1, "Request failed");
                    e.to_string()
                }
            };

            if !retry.should_retry(attempt) {
                return Err(FetchError::Exhausted {
                    url: url.to_string(),
                    attempts: attempt + 1,
                    last_error,
                });
            }

            let delay = retry.delay_for(attempt);
            debug!(url = %url, delay_ms = delay.as_millis() as u64, "Backing off before retry");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    fn pick_user_agent(&self, policy: &FetchPolicy) -> Option<String> {
        if let Some(user_agent) = &policy.user_agent {
            return Some(user_agent.clone());
        }
        self.user_agents.choose(&mut rand::thread_rng()).cloned()
    }

    fn pick_proxy(&self, policy: &FetchPolicy) -> Option<String> {
        if !policy.proxy_enabled {
            return None;
        }

        let pool: Vec<&String> = policy.proxy_url.iter().chain(self.proxies.iter()).collect();
        pool.choose(&mut rand::thread_rng()).map(|p| (*p).clone())
    }
}

impl std::fmt::Debug for FetchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchClient")
            .field("limiter", &self.limiter)
            .field("user_agents", &self.user_agents.len())
            .field("proxies", &self.proxies.len())
            .finish()
    }
}
