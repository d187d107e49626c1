//! Job controller
//!
//! Owns the lifecycle of single scraping jobs:
//!
//! ```text
//! pending → running → completed | failed | cancelled
//! ```
//!
//! A job is one (configuration, source, location, property type) attempt.
//! Results are persisted page by page while the job runs, so a job that fails
//! halfway keeps what it already scraped.

use crate::adapters::{AdapterRegistry, ListingPager, NewListing, ScrapeTarget};
use crate::config::ScrapeSettings;
use crate::fetch::{FetchClient, FetchPolicy};
use crate::state::JobStatus;
use crate::storage::{lock_storage, JobRecord, NewJob, SharedStorage, StorageError};
use crate::{HarvestError, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Runs scraping jobs and tracks their cancellation tokens
pub struct JobController {
    storage: SharedStorage,
    registry: Arc<AdapterRegistry>,
    fetcher: Arc<FetchClient>,

    /// Tokens of jobs that are pending or running in this process
    tokens: Mutex<HashMap<i64, CancellationToken>>,
}

impl JobController {
    pub fn new(
        storage: SharedStorage,
        registry: Arc<AdapterRegistry>,
        fetcher: Arc<FetchClient>,
    ) -> Self {
        Self {
            storage,
            registry,
            fetcher,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn fetcher(&self) -> &Arc<FetchClient> {
        &self.fetcher
    }

    /// Creates a pending job for one work item of a configuration
    ///
    /// # Returns
    ///
    /// * `Ok(JobRecord)` - The new job, in the `pending` state
    /// * `Err(HarvestError::ConfigurationNotFound)` - No configuration with that ID
    pub fn create_job(
        &self,
        configuration_id: i64,
        source: &str,
        location: &str,
        property_type: &str,
    ) -> Result<JobRecord> {
        let job = {
            let mut store = lock_storage(&self.storage)?;
            let configuration = store
                .get_configuration(configuration_id)?
                .ok_or(HarvestError::ConfigurationNotFound(configuration_id))?;

            let id = store.create_job(&NewJob {
                configuration_id,
                tenant_id: configuration.tenant_id,
                source: source.to_string(),
                location: location.to_string(),
                property_type: property_type.to_string(),
            })?;
            store.get_job(id)?.ok_or(HarvestError::JobNotFound(id))?
        };

        self.tokens().insert(job.id, CancellationToken::new());
        debug!(
            job_id = job.id,
            configuration_id,
            source,
            location,
            property_type,
            "Job created"
        );
        Ok(job)
    }

    /// Runs a pending job to a terminal state
    ///
    /// Adapter and fetch failures end the job as `failed` and are not returned
    /// as errors; the terminal job record is returned instead. Only storage
    /// failures escape, after a best-effort attempt to mark the job failed.
    ///
    /// The job's cancellation token is released on every exit path. A job
    /// whose configuration cannot be read is left `pending`, never `running`.
    pub async fn run_job(&self, job_id: i64) -> Result<JobRecord> {
        let mut release = TokenRelease {
            tokens: &self.tokens,
            job_id,
            armed: true,
        };

        let started = {
            let mut store = lock_storage(&self.storage)?;
            let started = store
                .get_job(job_id)?
                .ok_or(HarvestError::JobNotFound(job_id))
                .and_then(|job| {
                    let settings = store
                        .get_configuration(job.configuration_id)?
                        .map(|configuration| configuration.settings);
                    store
                        .start_job(job_id, Utc::now())
                        .map_err(from_storage)?;
                    Ok((job, settings))
                });
            started
        };
        let (job, settings) = match started {
            Ok(started) => started,
            Err(e) => {
                // Another run owns the token of a job that is already running
                if matches!(e, HarvestError::InvalidTransition { .. }) {
                    release.armed = false;
                }
                return Err(e);
            }
        };

        info!(
            job_id,
            source = %job.source,
            location = %job.location,
            property_type = %job.property_type,
            "Job started"
        );

        let cancel = self.token_for(job_id);
        let outcome = self.scrape(&job, settings, &cancel).await;
        drop(release);

        let (status, message) = match &outcome {
            Ok(_) => (JobStatus::Completed, None),
            Err(HarvestError::Cancelled) => (JobStatus::Cancelled, None),
            Err(e) => (JobStatus::Failed, Some(e.to_string())),
        };

        let finished = lock_storage(&self.storage).and_then(|mut store| {
            store.finish_job(job_id, status, message.as_deref(), Utc::now())
        });

        match outcome {
            Err(e) if e.is_infrastructure() => {
                error!(job_id, error = %e, "Job aborted by storage failure");
                if let Err(finish_error) = finished {
                    error!(job_id, error = %finish_error, "Could not mark job failed");
                }
                Err(e)
            }
            _ => {
                let job = finished.map_err(from_storage)?;
                match job.status {
                    JobStatus::Completed => info!(
                        job_id,
                        source = %job.source,
                        items = job.items_scraped,
                        "Job completed"
                    ),
                    JobStatus::Cancelled => warn!(
                        job_id,
                        items = job.items_scraped,
                        "Job cancelled"
                    ),
                    _ => error!(
                        job_id,
                        source = %job.source,
                        items = job.items_scraped,
                        error = job.error_message.as_deref().unwrap_or(""),
                        "Job failed"
                    ),
                }
                Ok(job)
            }
        }
    }

    /// Requests cancellation of a pending or running job
    ///
    /// Returns false if the job is not active in this process.
    pub fn cancel_job(&self, job_id: i64) -> bool {
        match self.tokens().get(&job_id) {
            Some(token) => {
                token.cancel();
                info!(job_id, "Job cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Requests cancellation of every unfinished job, returning how many
    pub fn cancel_all(&self) -> usize {
        let tokens = self.tokens();
        for token in tokens.values() {
            token.cancel();
        }
        if !tokens.is_empty() {
            info!(jobs = tokens.len(), "Cancellation requested for all jobs");
        }
        tokens.len()
    }

    /// Number of jobs created or running but not yet finished
    pub fn active_jobs(&self) -> usize {
        self.tokens().len()
    }

    /// Drives the pager for a job, persisting each page as it arrives
    ///
    /// Returns the number of listings stored.
    async fn scrape(
        &self,
        job: &JobRecord,
        settings: Option<ScrapeSettings>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let settings = settings.ok_or(HarvestError::ConfigurationNotFound(job.configuration_id))?;
        let adapter = self
            .registry
            .get(&job.source)
            .ok_or_else(|| HarvestError::UnsupportedSource {
                name: job.source.clone(),
            })?;

        let mut pager = ListingPager::new(
            adapter,
            self.fetcher.clone(),
            FetchPolicy::from_settings(&settings),
            ScrapeTarget {
                location: job.location.clone(),
                property_type: job.property_type.clone(),
                max_pages: settings.max_pages_per_source,
                request_delay: Duration::from_millis(settings.request_delay_ms),
            },
            cancel.clone(),
        );

        let mut stored = 0u64;
        while let Some(batch) = pager.next_page().await {
            let listings = batch?;
            let total = listings.len();
            let kept: Vec<NewListing> = listings
                .into_iter()
                .filter(|listing| settings.accepts_price(listing.price))
                .collect();

            if kept.len() < total {
                debug!(
                    job_id = job.id,
                    dropped = total - kept.len(),
                    "Dropped listings outside the price range"
                );
            }

            if !kept.is_empty() {
                let mut store = lock_storage(&self.storage)?;
                stored += store.insert_results(job.id, &kept, Utc::now())? as u64;
            }
        }

        Ok(stored)
    }

    fn tokens(&self) -> MutexGuard<'_, HashMap<i64, CancellationToken>> {
        self.tokens
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the job's token, creating one for jobs made by another process
    fn token_for(&self, job_id: i64) -> CancellationToken {
        self.tokens().entry(job_id).or_default().clone()
    }
}

impl std::fmt::Debug for JobController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobController")
            .field("registry", &self.registry)
            .field("active_jobs", &self.active_jobs())
            .finish()
    }
}

/// Removes a job's token from the controller when dropped
struct TokenRelease<'a> {
    tokens: &'a Mutex<HashMap<i64, CancellationToken>>,
    job_id: i64,
    armed: bool,
}

impl Drop for TokenRelease<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.tokens
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(&self.job_id);
        }
    }
}

/// Maps record-level storage errors to their job-level counterparts
fn from_storage(error: StorageError) -> HarvestError {
    match error {
        StorageError::JobNotFound(id) => HarvestError::JobNotFound(id),
        StorageError::ConfigurationNotFound(id) => HarvestError::ConfigurationNotFound(id),
        StorageError::InvalidTransition { from, to } => HarvestError::InvalidTransition { from, to },
        other => HarvestError::Storage(other),
    }
}
