//! Storage module for persisting configurations, jobs and results
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Tenant configuration records and their run timestamps
//! - Job records and their guarded status transitions
//! - Result persistence and paginated reads
//! - Per-configuration statistics queries

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::config::{ScrapeSettings, MAX_INTERVAL_HOURS, MIN_INTERVAL_HOURS};
use crate::state::JobStatus;
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Storage handle shared between the controller, scheduler and service
///
/// The mutex is only ever held for synchronous SQLite calls, never across an
/// `.await`.
pub type SharedStorage = Arc<Mutex<dyn Storage + Send>>;

/// Wraps a storage backend for sharing
pub fn share<S: Storage + Send + 'static>(storage: S) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

/// Locks the shared storage, mapping a poisoned lock to a storage error
pub fn lock_storage(
    storage: &SharedStorage,
) -> StorageResult<MutexGuard<'_, dyn Storage + Send + 'static>> {
    storage
        .lock()
        .map_err(|_| StorageError::Unavailable("storage lock poisoned".to_string()))
}

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// Formats a timestamp for storage
///
/// Fixed-width microsecond precision keeps text columns ordered by time.
pub fn to_db_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// A tenant configuration as stored
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationRecord {
    pub id: i64,
    pub tenant_id: String,
    pub settings: ScrapeSettings,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConfigurationRecord {
    /// Auto-scrape interval, clamped to the schedulable range
    pub fn interval(&self) -> chrono::Duration {
        let hours = self
            .settings
            .auto_scrape_interval_hours
            .clamp(MIN_INTERVAL_HOURS, MAX_INTERVAL_HOURS);
        chrono::Duration::hours(i64::from(hours))
    }

    /// Checks whether the scheduler should run this configuration at `now`
    ///
    /// A configuration that has never run is due immediately.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.settings.auto_scrape_enabled {
            return false;
        }

        match self.last_run_at {
            None => true,
            Some(last) => now - last >= self.interval(),
        }
    }
}

/// Fields needed to create a job
#[derive(Debug, Clone)]
pub struct NewJob {
    pub configuration_id: i64,
    pub tenant_id: String,
    pub source: String,
    pub location: String,
    pub property_type: String,
}

/// A job as stored
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub id: i64,
    pub configuration_id: i64,
    pub tenant_id: String,
    pub source: String,
    pub location: String,
    pub property_type: String,
    pub status: JobStatus,
    pub items_scraped: u64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A persisted listing
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub id: i64,
    pub job_id: i64,
    pub title: String,
    pub price: f64,
    pub location: String,
    pub property_type: String,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<u32>,
    /// Square feet
    pub area: Option<f64>,
    pub images: Vec<String>,
    pub source_url: String,
    pub metadata: serde_json::Value,
    pub scraped_at: DateTime<Utc>,
}

/// Filters for listing jobs; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub tenant_id: Option<String>,
    pub configuration_id: Option<i64>,
    pub source: Option<String>,
    pub status: Option<JobStatus>,
    /// Inclusive lower bound on created-at
    pub created_after: Option<DateTime<Utc>>,
    /// Exclusive upper bound on created-at
    pub created_before: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

/// Offset pagination for result reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub offset: u32,
    pub limit: u32,
}

impl Pagination {
    /// Builds pagination for a 1-based page number
    pub fn page(page: u32, per_page: u32) -> Self {
        Self {
            offset: page.saturating_sub(1).saturating_mul(per_page),
            limit: per_page,
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}
