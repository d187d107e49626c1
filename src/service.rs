//! Service facade
//!
//! `HarvestService` is what the surrounding application talks to: it manages
//! tenant configurations (keeping the scheduler in sync with them), starts
//! and cancels jobs on demand, and reads job history, results and statistics.

use crate::adapters::AdapterRegistry;
use crate::config::{
    validate_settings_with_pool, ScrapeSettings, ServiceConfig, SettingsPatch, TenantEntry,
};
use crate::engine::{JobController, Scheduler};
use crate::fetch::FetchClient;
use crate::output::{load_statistics, JobStatistics};
use crate::storage::{
    lock_storage, ConfigurationRecord, JobFilter, JobRecord, Pagination, ResultRecord,
    SharedStorage,
};
use crate::{HarvestError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Entry point for configuration management, manual runs and reads
#[derive(Clone)]
pub struct HarvestService {
    storage: SharedStorage,
    controller: Arc<JobController>,
    scheduler: Arc<Scheduler>,
}

impl HarvestService {
    pub fn new(
        storage: SharedStorage,
        controller: Arc<JobController>,
        scheduler: Arc<Scheduler>,
    ) -> Self {
        Self {
            storage,
            controller,
            scheduler,
        }
    }

    /// Wires the fetch client, adapters, controller and scheduler from the
    /// service config
    ///
    /// # Returns
    ///
    /// * `Ok(HarvestService)` - Ready to use; the scheduler is not started
    /// * `Err(HarvestError)` - A source entry could not be turned into an adapter
    pub fn from_config(config: &ServiceConfig, storage: SharedStorage) -> Result<Self> {
        let registry = Arc::new(AdapterRegistry::from_sources(&config.sources)?);
        let fetcher = Arc::new(FetchClient::from_config(&config.fetch));
        let controller = Arc::new(JobController::new(storage.clone(), registry, fetcher));
        let scheduler = Arc::new(Scheduler::new(
            storage.clone(),
            controller.clone(),
            Duration::from_secs(config.service.tick_seconds),
            config.service.max_concurrent_jobs as usize,
        ));

        Ok(Self::new(storage, controller, scheduler))
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn controller(&self) -> &Arc<JobController> {
        &self.controller
    }

    // ===== Configurations =====

    fn validate(&self, settings: &ScrapeSettings) -> Result<()> {
        validate_settings_with_pool(settings, self.controller.fetcher().proxy_pool())?;
        Ok(())
    }

    /// Validates and stores a new configuration, scheduling it if auto-scrape is on
    pub fn create_configuration(
        &self,
        tenant_id: &str,
        settings: ScrapeSettings,
    ) -> Result<ConfigurationRecord> {
        self.validate(&settings)?;

        let record = {
            let mut store = lock_storage(&self.storage)?;
            let id = store.insert_configuration(tenant_id, &settings)?;
            store
                .get_configuration(id)?
                .ok_or(HarvestError::ConfigurationNotFound(id))?
        };

        self.scheduler.schedule_configuration(&record);
        info!(
            configuration_id = record.id,
            tenant_id,
            auto_scrape = record.settings.auto_scrape_enabled,
            "Configuration created"
        );
        Ok(record)
    }

    /// Applies a partial update; the merged settings are validated as a whole
    pub fn update_configuration(&self, id: i64, patch: SettingsPatch) -> Result<ConfigurationRecord> {
        let record = {
            let mut store = lock_storage(&self.storage)?;
            let existing = store
                .get_configuration(id)?
                .ok_or(HarvestError::ConfigurationNotFound(id))?;

            let mut settings = existing.settings;
            settings.apply(patch);
            self.validate(&settings)?;

            store.update_configuration_settings(id, &settings)?;
            store
                .get_configuration(id)?
                .ok_or(HarvestError::ConfigurationNotFound(id))?
        };

        self.scheduler.schedule_configuration(&record);
        info!(configuration_id = id, "Configuration updated");
        Ok(record)
    }

    /// Deletes a configuration and unschedules it; its job history is kept
    pub fn delete_configuration(&self, id: i64) -> Result<()> {
        let deleted = lock_storage(&self.storage)?.delete_configuration(id)?;
        if !deleted {
            return Err(HarvestError::ConfigurationNotFound(id));
        }

        self.scheduler.unschedule_configuration(id);
        info!(configuration_id = id, "Configuration deleted");
        Ok(())
    }

    pub fn get_configuration(&self, id: i64) -> Result<ConfigurationRecord> {
        lock_storage(&self.storage)?
            .get_configuration(id)?
            .ok_or(HarvestError::ConfigurationNotFound(id))
    }

    /// Lists configurations, optionally for one tenant
    pub fn list_configurations(&self, tenant_id: Option<&str>) -> Result<Vec<ConfigurationRecord>> {
        Ok(lock_storage(&self.storage)?.list_configurations(tenant_id)?)
    }

    /// Creates the `[[tenant]]` configurations of the service config
    ///
    /// Tenants that already have a configuration are left alone, so seeding
    /// twice does not duplicate anything.
    pub fn seed_tenants(&self, tenants: &[TenantEntry]) -> Result<Vec<ConfigurationRecord>> {
        let mut created = Vec::new();

        for tenant in tenants {
            let existing = self.list_configurations(Some(&tenant.tenant_id))?;
            if !existing.is_empty() {
                info!(tenant_id = %tenant.tenant_id, "Tenant already configured, skipping seed");
                continue;
            }
            created.push(self.create_configuration(&tenant.tenant_id, tenant.settings.clone())?);
        }

        Ok(created)
    }

    // ===== Jobs =====

    /// Starts a manual run in the background and returns the pending job
    ///
    /// Must be called from within a Tokio runtime.
    pub fn trigger_job(
        &self,
        configuration_id: i64,
        source: &str,
        location: &str,
        property_type: &str,
    ) -> Result<JobRecord> {
        let job = self
            .controller
            .create_job(configuration_id, source, location, property_type)?;

        let controller = Arc::clone(&self.controller);
        let job_id = job.id;
        tokio::spawn(async move {
            if let Err(e) = controller.run_job(job_id).await {
                error!(job_id, error = %e, "Manual job run failed");
            }
        });

        info!(job_id, configuration_id, source, "Manual job triggered");
        Ok(job)
    }

    /// Requests cancellation of a pending or running job
    pub fn cancel_job(&self, job_id: i64) -> bool {
        self.controller.cancel_job(job_id)
    }

    pub fn get_job(&self, job_id: i64) -> Result<JobRecord> {
        lock_storage(&self.storage)?
            .get_job(job_id)?
            .ok_or(HarvestError::JobNotFound(job_id))
    }

    /// Lists jobs matching a filter, newest first
    pub fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<JobRecord>> {
        Ok(lock_storage(&self.storage)?.list_jobs(filter)?)
    }

    /// Reads one page of a job's results
    pub fn get_job_results(&self, job_id: i64, page: Pagination) -> Result<Vec<ResultRecord>> {
        let store = lock_storage(&self.storage)?;
        if store.get_job(job_id)?.is_none() {
            return Err(HarvestError::JobNotFound(job_id));
        }
        Ok(store.get_job_results(job_id, page)?)
    }

    /// Aggregates the job history of a configuration
    ///
    /// Statistics stay readable after the configuration itself is deleted.
    pub fn get_stats(&self, configuration_id: i64) -> Result<JobStatistics> {
        let store = lock_storage(&self.storage)?;
        Ok(load_statistics(&*store, configuration_id)?)
    }
}

impl std::fmt::Debug for HarvestService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HarvestService")
            .field("controller", &self.controller)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
