//! listing-harvest: a scheduled listing scraping engine
//!
//! This crate ingests third-party listing pages for many tenants, normalizes
//! them into result records and keeps a job history of every run. It is built
//! from four layers:
//!
//! - `fetch`: a rate-limited, retrying, proxy-capable HTTP fetch primitive
//! - `adapters`: per-source adapters and the shared pagination cursor
//! - `engine`: the job controller and the periodic scheduler
//! - `service`: the operations exposed to the surrounding application

pub mod adapters;
pub mod config;
pub mod engine;
pub mod fetch;
pub mod output;
pub mod service;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Unsupported source: no adapter registered for '{name}'")]
    UnsupportedSource { name: String },

    #[error("Job cancelled")]
    Cancelled,

    #[error("Job not found: {0}")]
    JobNotFound(i64),

    #[error("Configuration not found: {0}")]
    ConfigurationNotFound(i64),

    #[error("Invalid job transition: {from} -> {to}")]
    InvalidTransition {
        from: state::JobStatus,
        to: state::JobStatus,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    /// Returns true for failures of the store rather than of a single job
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Database(_) | Self::Io(_))
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Errors raised by the fetch client
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Fetch of {url} failed after {attempts} attempts: {last_error}")]
    Exhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Fetch of {url} rejected with HTTP {status}")]
    Rejected { url: String, status: u16 },

    #[error("Fetch of {url} cancelled")]
    Cancelled { url: String },

    #[error("Invalid fetch URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP client error: {0}")]
    Client(String),
}

/// Result type alias for harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::{ScrapeSettings, ServiceConfig, SettingsPatch};
pub use engine::{JobController, Scheduler};
pub use fetch::FetchClient;
pub use service::HarvestService;
pub use state::JobStatus;
