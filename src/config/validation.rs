use crate::config::settings::{ScrapeSettings, MAX_INTERVAL_HOURS, MIN_INTERVAL_HOURS};
use crate::config::types::{FetchConfig, ServiceConfig, ServiceSection, SourceEntry, TenantEntry};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Upper bound on pages fetched per (source, location, property type)
pub const MAX_PAGES_PER_SOURCE: u32 = 100;

/// Upper bound on transient-failure retries per fetch
pub const MAX_RETRIES: u32 = 10;

/// Upper bound on the pause between page fetches (one minute)
pub const MAX_REQUEST_DELAY_MS: u64 = 60_000;

/// Validates the entire service configuration
pub fn validate(config: &ServiceConfig) -> Result<(), ConfigError> {
    validate_service_section(&config.service)?;
    validate_fetch_config(&config.fetch)?;
    validate_sources(&config.sources)?;
    validate_tenants(&config.tenants, &config.fetch.proxies)?;
    Ok(())
}

/// Validates process-level settings
fn validate_service_section(config: &ServiceSection) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.tick_seconds < 1 {
        return Err(ConfigError::Validation(format!(
            "tick_seconds must be >= 1, got {}",
            config.tick_seconds
        )));
    }

    if config.max_concurrent_jobs < 1 || config.max_concurrent_jobs > 64 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_jobs must be between 1 and 64, got {}",
            config.max_concurrent_jobs
        )));
    }

    Ok(())
}

/// Validates shared fetch client settings
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.requests_per_window < 1 {
        return Err(ConfigError::Validation(format!(
            "requests_per_window must be >= 1, got {}",
            config.requests_per_window
        )));
    }

    if config.window_seconds < 1 {
        return Err(ConfigError::Validation(format!(
            "window_seconds must be >= 1, got {}",
            config.window_seconds
        )));
    }

    if config.timeout_seconds < 1 || config.connect_timeout_seconds < 1 {
        return Err(ConfigError::Validation(
            "timeouts must be at least one second".to_string(),
        ));
    }

    if config.backoff_base_ms > config.backoff_max_ms {
        return Err(ConfigError::Validation(format!(
            "backoff_base_ms ({}) cannot exceed backoff_max_ms ({})",
            config.backoff_base_ms, config.backoff_max_ms
        )));
    }

    if config.user_agents.is_empty() || config.user_agents.iter().any(|ua| ua.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "user_agents must contain at least one non-empty entry".to_string(),
        ));
    }

    for proxy in &config.proxies {
        Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy '{}': {}", proxy, e)))?;
    }

    Ok(())
}

/// Validates registered sources
fn validate_sources(sources: &[SourceEntry]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for entry in sources {
        if entry.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "source name cannot be empty".to_string(),
            ));
        }

        if !seen.insert(entry.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "source '{}' is registered more than once",
                entry.name
            )));
        }

        let url = Url::parse(&entry.base_url).map_err(|e| {
            ConfigError::InvalidUrl(format!(
                "Invalid base URL '{}' for source '{}': {}",
                entry.base_url, entry.name, e
            ))
        })?;

        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(ConfigError::Validation(format!(
                "Base URL '{}' must use HTTP(S)",
                entry.base_url
            )));
        }
    }

    Ok(())
}

/// Validates seeded tenant configurations
fn validate_tenants(tenants: &[TenantEntry], proxy_pool: &[String]) -> Result<(), ConfigError> {
    for entry in tenants {
        if entry.tenant_id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "tenant_id cannot be empty".to_string(),
            ));
        }
        validate_settings_with_pool(&entry.settings, proxy_pool)?;
    }
    Ok(())
}

/// Validates tenant scrape settings without a service-wide proxy pool
///
/// Enabling proxies then requires the tenant's own `proxy_url`.
pub fn validate_settings(settings: &ScrapeSettings) -> Result<(), ConfigError> {
    validate_settings_with_pool(settings, &[])
}

/// Validates tenant scrape settings against the service-wide proxy pool
///
/// Called synchronously by configuration create and update, so invalid
/// settings never reach the scheduler. Enabling proxies needs at least one
/// proxy to draw from: the tenant's `proxy_url` or an entry of `proxy_pool`.
pub fn validate_settings_with_pool(
    settings: &ScrapeSettings,
    proxy_pool: &[String],
) -> Result<(), ConfigError> {
    for (name, value) in [("price_min", settings.price_min), ("price_max", settings.price_max)] {
        if let Some(price) = value {
            if !price.is_finite() || price < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "{} must be a non-negative number, got {}",
                    name, price
                )));
            }
        }
    }

    if let (Some(min), Some(max)) = (settings.price_min, settings.price_max) {
        if max <= min {
            return Err(ConfigError::Validation(format!(
                "price_max ({}) must be greater than price_min ({})",
                max, min
            )));
        }
    }

    if settings.auto_scrape_interval_hours < MIN_INTERVAL_HOURS
        || settings.auto_scrape_interval_hours > MAX_INTERVAL_HOURS
    {
        return Err(ConfigError::Validation(format!(
            "auto_scrape_interval_hours must be between {} and {}, got {}",
            MIN_INTERVAL_HOURS, MAX_INTERVAL_HOURS, settings.auto_scrape_interval_hours
        )));
    }

    if settings.max_pages_per_source < 1 || settings.max_pages_per_source > MAX_PAGES_PER_SOURCE {
        return Err(ConfigError::Validation(format!(
            "max_pages_per_source must be between 1 and {}, got {}",
            MAX_PAGES_PER_SOURCE, settings.max_pages_per_source
        )));
    }

    if settings.max_retries > MAX_RETRIES {
        return Err(ConfigError::Validation(format!(
            "max_retries must be <= {}, got {}",
            MAX_RETRIES, settings.max_retries
        )));
    }

    if settings.request_delay_ms > MAX_REQUEST_DELAY_MS {
        return Err(ConfigError::Validation(format!(
            "request_delay_ms must be <= {}, got {}",
            MAX_REQUEST_DELAY_MS, settings.request_delay_ms
        )));
    }

    if let Some(proxy) = settings.proxy_url.as_deref() {
        Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy_url '{}': {}", proxy, e)))?;
    }

    if settings.proxy_enabled && settings.proxy_url.is_none() && proxy_pool.is_empty() {
        return Err(ConfigError::Validation(
            "proxy_enabled needs a proxy_url or a service-wide proxy pool".to_string(),
        ));
    }

    if matches!(settings.user_agent.as_deref(), Some(ua) if ua.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "user_agent override cannot be blank".to_string(),
        ));
    }

    if settings.auto_scrape_enabled && settings.work_item_count() == 0 {
        return Err(ConfigError::Validation(
            "auto-scrape needs at least one source, location and property type".to_string(),
        ));
    }

    Ok(())
}
