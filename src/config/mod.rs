//! Configuration module
//!
//! Two kinds of configuration live here:
//!
//! - the service configuration file (TOML) that sets up the process: database,
//!   scheduler tick, fetch policy and registered sources
//! - per-tenant scrape settings, which are stored on configuration records and
//!   validated on every create and update
//!
//! # Example
//!
//! ```no_run
//! use listing_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Registered sources: {}", config.sources.len());
//! ```

mod parser;
mod settings;
mod types;
mod validation;

// Re-export types
pub use settings::{
    ScrapeSettings, SettingsPatch, DEFAULT_INTERVAL_HOURS, MAX_INTERVAL_HOURS, MIN_INTERVAL_HOURS,
};
pub use types::{
    AdapterKind, FetchConfig, ServiceConfig, ServiceSection, SourceEntry, TenantEntry,
};

// Re-export parser and validation functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::{
    validate_settings, validate_settings_with_pool, MAX_PAGES_PER_SOURCE, MAX_REQUEST_DELAY_MS,
    MAX_RETRIES,
};
