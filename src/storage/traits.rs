//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::adapters::NewListing;
use crate::config::ScrapeSettings;
use crate::state::JobStatus;
use crate::storage::{
    ConfigurationRecord, JobFilter, JobRecord, NewJob, Pagination, ResultRecord,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Job not found: {0}")]
    JobNotFound(i64),

    #[error("Configuration not found: {0}")]
    ConfigurationNotFound(i64),

    #[error("Invalid job transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Job {id} is {status}, results can only be added while running")]
    JobNotRunning { id: i64, status: JobStatus },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// All records are tenant-scoped. Status writes are guarded: a transition is
/// only applied when the stored status is the expected predecessor, which is
/// what keeps terminal jobs immutable.
pub trait Storage {
    // ===== Configuration Management =====

    /// Inserts a configuration and returns its ID
    fn insert_configuration(
        &mut self,
        tenant_id: &str,
        settings: &ScrapeSettings,
    ) -> StorageResult<i64>;

    /// Gets a configuration by ID
    fn get_configuration(&self, id: i64) -> StorageResult<Option<ConfigurationRecord>>;

    /// Replaces the settings of a configuration
    fn update_configuration_settings(
        &mut self,
        id: i64,
        settings: &ScrapeSettings,
    ) -> StorageResult<()>;

    /// Deletes a configuration; job history is kept
    ///
    /// Returns false if no configuration had this ID.
    fn delete_configuration(&mut self, id: i64) -> StorageResult<bool>;

    /// Lists configurations, optionally for one tenant
    fn list_configurations(&self, tenant_id: Option<&str>)
        -> StorageResult<Vec<ConfigurationRecord>>;

    /// Lists every configuration with auto-scrape enabled
    fn list_auto_scrape_configurations(&self) -> StorageResult<Vec<ConfigurationRecord>>;

    /// Stores the outcome timestamps of a scheduler cycle
    fn record_configuration_run(
        &mut self,
        id: i64,
        last_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> StorageResult<()>;

    // ===== Job Management =====

    /// Creates a job in the `pending` state and returns its ID
    fn create_job(&mut self, job: &NewJob) -> StorageResult<i64>;

    /// Gets a job by ID
    fn get_job(&self, id: i64) -> StorageResult<Option<JobRecord>>;

    /// Moves a job from `pending` to `running` and sets started-at
    fn start_job(&mut self, id: i64, started_at: DateTime<Utc>) -> StorageResult<()>;

    /// Moves a job from `running` to a terminal status
    ///
    /// The items-scraped count is computed from the persisted results in the
    /// same transaction as the status change.
    fn finish_job(
        &mut self,
        id: i64,
        status: JobStatus,
        error_message: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> StorageResult<JobRecord>;

    /// Lists jobs matching a filter, newest first
    fn list_jobs(&self, filter: &JobFilter) -> StorageResult<Vec<JobRecord>>;

    // ===== Result Management =====

    /// Inserts listings for a running job in one transaction
    ///
    /// Returns the number of rows inserted.
    fn insert_results(
        &mut self,
        job_id: i64,
        listings: &[NewListing],
        scraped_at: DateTime<Utc>,
    ) -> StorageResult<usize>;

    /// Gets one page of a job's results in insertion order
    fn get_job_results(&self, job_id: i64, page: Pagination) -> StorageResult<Vec<ResultRecord>>;

    /// Counts a job's results
    fn count_results(&self, job_id: i64) -> StorageResult<u64>;

    // ===== Statistics =====

    /// Counts a configuration's jobs by status
    fn count_jobs_by_status(&self, configuration_id: i64)
        -> StorageResult<HashMap<JobStatus, u64>>;

    /// Sums items scraped over a configuration's jobs
    fn total_items(&self, configuration_id: i64) -> StorageResult<u64>;

    /// Counts a configuration's jobs per source
    fn source_distribution(&self, configuration_id: i64) -> StorageResult<HashMap<String, u64>>;
}
