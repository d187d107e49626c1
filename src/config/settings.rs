//! Per-tenant scrape settings
//!
//! These are the values a tenant controls: what to scrape, how politely, and
//! how often. They are stored on the configuration record and validated on
//! every create and update.

use serde::Deserialize;
use std::collections::BTreeSet;

/// Smallest allowed auto-scrape interval
pub const MIN_INTERVAL_HOURS: u32 = 1;

/// Largest allowed auto-scrape interval (one week)
pub const MAX_INTERVAL_HOURS: u32 = 168;

/// Interval used when none is given
pub const DEFAULT_INTERVAL_HOURS: u32 = 24;

/// Tenant-controlled scrape settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ScrapeSettings {
    /// Source names with a registered adapter
    pub sources: BTreeSet<String>,
    pub locations: BTreeSet<String>,
    pub property_types: BTreeSet<String>,

    /// Listings with a known price below this are dropped
    pub price_min: Option<f64>,

    /// Listings with a known price above this are dropped
    pub price_max: Option<f64>,

    pub max_pages_per_source: u32,

    /// Pause between consecutive page fetches of one job (milliseconds)
    pub request_delay_ms: u64,

    /// Retries after the first attempt for transient fetch failures
    pub max_retries: u32,

    pub proxy_enabled: bool,
    pub proxy_url: Option<String>,

    /// Replaces the rotating user-agent pool when set
    pub user_agent: Option<String>,

    pub auto_scrape_enabled: bool,
    pub auto_scrape_interval_hours: u32,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            sources: BTreeSet::new(),
            locations: BTreeSet::new(),
            property_types: BTreeSet::new(),
            price_min: None,
            price_max: None,
            max_pages_per_source: 5,
            request_delay_ms: 1_000,
            max_retries: 3,
            proxy_enabled: false,
            proxy_url: None,
            user_agent: None,
            auto_scrape_enabled: false,
            auto_scrape_interval_hours: DEFAULT_INTERVAL_HOURS,
        }
    }
}

impl ScrapeSettings {
    /// Applies a partial update, leaving unset fields untouched
    pub fn apply(&mut self, patch: SettingsPatch) {
        if let Some(sources) = patch.sources {
            self.sources = sources;
        }
        if let Some(locations) = patch.locations {
            self.locations = locations;
        }
        if let Some(property_types) = patch.property_types {
            self.property_types = property_types;
        }
        if let Some(price_min) = patch.price_min {
            self.price_min = price_min;
        }
        if let Some(price_max) = patch.price_max {
            self.price_max = price_max;
        }
        if let Some(max_pages) = patch.max_pages_per_source {
            self.max_pages_per_source = max_pages;
        }
        if let Some(delay) = patch.request_delay_ms {
            self.request_delay_ms = delay;
        }
        if let Some(max_retries) = patch.max_retries {
            self.max_retries = max_retries;
        }
        if let Some(enabled) = patch.proxy_enabled {
            self.proxy_enabled = enabled;
        }
        if let Some(proxy_url) = patch.proxy_url {
            self.proxy_url = proxy_url;
        }
        if let Some(user_agent) = patch.user_agent {
            self.user_agent = user_agent;
        }
        if let Some(enabled) = patch.auto_scrape_enabled {
            self.auto_scrape_enabled = enabled;
        }
        if let Some(hours) = patch.auto_scrape_interval_hours {
            self.auto_scrape_interval_hours = hours;
        }
    }

    /// Returns true if a listing at `price` falls within the configured range
    ///
    /// A price of zero means the source did not publish one and always passes.
    pub fn accepts_price(&self, price: f64) -> bool {
        if price <= 0.0 {
            return true;
        }
        if matches!(self.price_min, Some(min) if price < min) {
            return false;
        }
        if matches!(self.price_max, Some(max) if price > max) {
            return false;
        }
        true
    }

    /// Number of (source, location, property type) work items per cycle
    pub fn work_item_count(&self) -> usize {
        self.sources.len() * self.locations.len() * self.property_types.len()
    }
}

/// Partial settings update
///
/// Outer `None` leaves a field unchanged; for nullable fields an inner `None`
/// clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsPatch {
    pub sources: Option<BTreeSet<String>>,
    pub locations: Option<BTreeSet<String>>,
    pub property_types: Option<BTreeSet<String>>,
    pub price_min: Option<Option<f64>>,
    pub price_max: Option<Option<f64>>,
    pub max_pages_per_source: Option<u32>,
    pub request_delay_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub proxy_enabled: Option<bool>,
    pub proxy_url: Option<Option<String>>,
    pub user_agent: Option<Option<String>>,
    pub auto_scrape_enabled: Option<bool>,
    pub auto_scrape_interval_hours: Option<u32>,
}
