use crate::config::settings::ScrapeSettings;
use serde::Deserialize;

/// Main configuration structure for the harvest service
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub service: ServiceSection,
    pub fetch: FetchConfig,
    #[serde(default, rename = "source")]
    pub sources: Vec<SourceEntry>,
    #[serde(default, rename = "tenant")]
    pub tenants: Vec<TenantEntry>,
}

/// Process-level settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSection {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Seconds between scheduler evaluations
    #[serde(rename = "tick-seconds", default = "default_tick_seconds")]
    pub tick_seconds: u64,

    /// Maximum number of jobs running at once across all configurations
    #[serde(rename = "max-concurrent-jobs", default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: u32,
}

/// Shared fetch client settings
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Maximum call starts per destination domain within one window
    #[serde(rename = "requests-per-window")]
    pub requests_per_window: u32,

    /// Length of the rate-limit window
    #[serde(rename = "window-seconds")]
    pub window_seconds: u64,

    /// Overall request timeout
    #[serde(rename = "timeout-seconds", default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// TCP connect timeout
    #[serde(
        rename = "connect-timeout-seconds",
        default = "default_connect_timeout_seconds"
    )]
    pub connect_timeout_seconds: u64,

    /// First retry backoff, doubled on every further attempt
    #[serde(rename = "backoff-base-ms", default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound for a single backoff sleep (before jitter)
    #[serde(rename = "backoff-max-ms", default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Pool of user agents rotated per request
    #[serde(rename = "user-agents")]
    pub user_agents: Vec<String>,

    /// Service-wide proxy pool used by configurations that enable proxying
    #[serde(default)]
    pub proxies: Vec<String>,
}

/// A registered listing source
#[derive(Debug, Clone, Deserialize)]
pub struct SourceEntry {
    /// Name tenants use to enable this source
    pub name: String,

    /// Which adapter parses this source
    pub kind: AdapterKind,

    /// Root URL search pages are built from
    #[serde(rename = "base-url")]
    pub base_url: String,
}

/// Adapter implementations shipped with the crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdapterKind {
    CardGrid,
    JsonLd,
}

/// Tenant configuration seeded into the store by `--seed`
#[derive(Debug, Clone, Deserialize)]
pub struct TenantEntry {
    #[serde(rename = "tenant-id")]
    pub tenant_id: String,

    #[serde(flatten)]
    pub settings: ScrapeSettings,
}

fn default_tick_seconds() -> u64 {
    60
}

fn default_max_concurrent_jobs() -> u32 {
    4
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_connect_timeout_seconds() -> u64 {
    10
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    30_000
}
