//! Periodic scheduler
//!
//! The scheduler keeps the set of configurations with auto-scrape enabled and
//! evaluates it on every tick:
//!
//! ```text
//! tick(now)
//!   └─► re-read each scheduled configuration
//!         └─► due and not already in flight?
//!               └─► sources × locations × property types
//!                     └─► create_job + run_job (bounded by a shared semaphore)
//!               └─► record last_run_at = now, next_run_at = now + interval
//! ```
//!
//! Each tick runs in its own task so a long cycle never delays the timer.
//! Job failures are logged and counted; they never stop sibling jobs or the
//! loop. A store failure aborts the tick it happened in.

use crate::engine::JobController;
use crate::state::JobStatus;
use crate::storage::{lock_storage, ConfigurationRecord, SharedStorage};
use crate::{HarvestError, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Shortest allowed time between scheduler evaluations
const MIN_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Counters for one tick or one configuration cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Configurations whose cycle ran
    pub configurations_run: usize,

    /// Due configurations skipped because a previous cycle was still running
    pub configurations_skipped: usize,

    pub jobs_created: usize,
    pub jobs_completed: usize,
    pub jobs_failed: usize,
    pub jobs_cancelled: usize,
}

impl CycleReport {
    fn absorb(&mut self, other: CycleReport) {
        self.configurations_run += other.configurations_run;
        self.configurations_skipped += other.configurations_skipped;
        self.jobs_created += other.jobs_created;
        self.jobs_completed += other.jobs_completed;
        self.jobs_failed += other.jobs_failed;
        self.jobs_cancelled += other.jobs_cancelled;
    }
}

struct Runner {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

/// Periodic driver of auto-scrape configurations
pub struct Scheduler {
    storage: SharedStorage,
    controller: Arc<JobController>,
    permits: Arc<Semaphore>,
    tick_interval: Duration,

    /// Configuration IDs evaluated on every tick
    scheduled: Mutex<BTreeSet<i64>>,

    /// Configuration IDs whose cycle is currently running
    in_flight: Mutex<HashSet<i64>>,

    runner: Mutex<Option<Runner>>,
}

/// Marks a configuration as in flight until dropped
struct InFlight {
    scheduler: Arc<Scheduler>,
    configuration_id: i64,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        lock(&self.scheduler.in_flight).remove(&self.configuration_id);
    }
}

impl Scheduler {
    /// Creates a stopped scheduler
    ///
    /// # Arguments
    ///
    /// * `tick_interval` - Time between evaluations, at least one second
    /// * `max_concurrent_jobs` - Jobs allowed to run at once across all configurations
    pub fn new(
        storage: SharedStorage,
        controller: Arc<JobController>,
        tick_interval: Duration,
        max_concurrent_jobs: usize,
    ) -> Self {
        Self {
            storage,
            controller,
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            tick_interval: tick_interval.max(MIN_TICK_INTERVAL),
            scheduled: Mutex::new(BTreeSet::new()),
            in_flight: Mutex::new(HashSet::new()),
            runner: Mutex::new(None),
        }
    }

    /// Loads every auto-scrape configuration from the store
    ///
    /// Returns the number of scheduled configurations.
    pub fn bootstrap(&self) -> Result<usize> {
        let configurations = lock_storage(&self.storage)?.list_auto_scrape_configurations()?;

        let mut scheduled = lock(&self.scheduled);
        for configuration in &configurations {
            scheduled.insert(configuration.id);
        }

        info!(configurations = scheduled.len(), "Scheduler bootstrapped");
        Ok(scheduled.len())
    }

    /// Adds a configuration to the evaluation set, or removes it if auto-scrape is off
    pub fn schedule_configuration(&self, configuration: &ConfigurationRecord) {
        let mut scheduled = lock(&self.scheduled);
        if configuration.settings.auto_scrape_enabled {
            scheduled.insert(configuration.id);
            debug!(configuration_id = configuration.id, "Configuration scheduled");
        } else if scheduled.remove(&configuration.id) {
            debug!(configuration_id = configuration.id, "Configuration unscheduled");
        }
    }

    /// Removes a configuration from the evaluation set
    ///
    /// Returns false if it was not scheduled.
    pub fn unschedule_configuration(&self, configuration_id: i64) -> bool {
        lock(&self.scheduled).remove(&configuration_id)
    }

    /// IDs of scheduled configurations, ascending
    pub fn scheduled(&self) -> Vec<i64> {
        lock(&self.scheduled).iter().copied().collect()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.runner).is_some()
    }

    /// Starts the background tick loop
    ///
    /// Returns false if it was already running. The first tick fires
    /// immediately.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut runner = lock(&self.runner);
        if runner.is_some() {
            return false;
        }

        let shutdown = CancellationToken::new();
        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(scheduler.run_loop(shutdown.clone()));

        *runner = Some(Runner { shutdown, handle });
        true
    }

    /// Stops the tick loop and waits for it to exit
    ///
    /// Cycles already spawned by earlier ticks finish on their own.
    pub async fn stop(&self) {
        let runner = lock(&self.runner).take();
        if let Some(runner) = runner {
            runner.shutdown.cancel();
            if let Err(e) = runner.handle.await {
                error!(error = %e, "Scheduler loop ended abnormally");
            }
        }
    }

    async fn run_loop(self: Arc<Self>, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            tick_seconds = self.tick_interval.as_secs(),
            "Scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let scheduler = Arc::clone(&self);
                    tokio::spawn(async move {
                        match scheduler.tick(Utc::now()).await {
                            Ok(report) if report.configurations_run > 0 => {
                                info!(
                                    configurations = report.configurations_run,
                                    jobs = report.jobs_created,
                                    completed = report.jobs_completed,
                                    failed = report.jobs_failed,
                                    "Scheduler tick finished"
                                );
                            }
                            Ok(_) => debug!("Nothing due"),
                            Err(e) => error!(error = %e, "Scheduler tick failed"),
                        }
                    });
                }
            }
        }

        info!("Scheduler stopped");
    }

    /// Evaluates every scheduled configuration at `now`
    ///
    /// Runs the cycles of all due configurations and waits for them. Returns
    /// the first store error after every cycle has ended.
    pub async fn tick(self: &Arc<Self>, now: DateTime<Utc>) -> Result<CycleReport> {
        let due = self.due_configurations(now)?;
        let mut report = CycleReport::default();
        let mut cycles = JoinSet::new();

        for configuration in due {
            let Some(guard) = self.claim(configuration.id) else {
                debug!(
                    configuration_id = configuration.id,
                    "Previous cycle still running, skipping"
                );
                report.configurations_skipped += 1;
                continue;
            };

            let scheduler = Arc::clone(self);
            cycles.spawn(async move {
                let _guard = guard;
                scheduler.run_cycle(configuration, now).await
            });
        }

        let mut first_error = None;
        while let Some(joined) = cycles.join_next().await {
            match joined {
                Ok(Ok(cycle)) => report.absorb(cycle),
                Ok(Err(e)) => {
                    error!(error = %e, "Configuration cycle aborted");
                    first_error.get_or_insert(e);
                }
                Err(e) => error!(error = %e, "Configuration cycle panicked"),
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Reads the scheduled configurations and keeps the due ones
    ///
    /// Configurations that were deleted or had auto-scrape turned off are
    /// dropped from the evaluation set.
    fn due_configurations(&self, now: DateTime<Utc>) -> Result<Vec<ConfigurationRecord>> {
        let ids = self.scheduled();
        let mut due = Vec::new();
        let mut stale = Vec::new();

        {
            let store = lock_storage(&self.storage)?;
            for id in ids {
                match store.get_configuration(id)? {
                    Some(configuration) if !configuration.settings.auto_scrape_enabled => {
                        stale.push(id)
                    }
                    Some(configuration) => {
                        if configuration.is_due(now) {
                            due.push(configuration);
                        }
                    }
                    None => stale.push(id),
                }
            }
        }

        if !stale.is_empty() {
            let mut scheduled = lock(&self.scheduled);
            for id in &stale {
                scheduled.remove(id);
            }
            debug!(removed = stale.len(), "Dropped stale configurations from schedule");
        }

        Ok(due)
    }

    fn claim(self: &Arc<Self>, configuration_id: i64) -> Option<InFlight> {
        if !lock(&self.in_flight).insert(configuration_id) {
            return None;
        }
        Some(InFlight {
            scheduler: Arc::clone(self),
            configuration_id,
        })
    }

    /// Runs every work item of one configuration and records the run
    async fn run_cycle(
        self: Arc<Self>,
        configuration: ConfigurationRecord,
        now: DateTime<Utc>,
    ) -> Result<CycleReport> {
        let settings = &configuration.settings;
        let mut report = CycleReport {
            configurations_run: 1,
            ..Default::default()
        };
        info!(
            configuration_id = configuration.id,
            tenant_id = %configuration.tenant_id,
            work_items = settings.work_item_count(),
            "Configuration due"
        );

        let mut jobs = JoinSet::new();
        let mut store_error: Option<HarvestError> = None;

        'items: for source in &settings.sources {
            for location in &settings.locations {
                for property_type in &settings.property_types {
                    let job = match self.controller.create_job(
                        configuration.id,
                        source,
                        location,
                        property_type,
                    ) {
                        Ok(job) => job,
                        Err(e) if e.is_infrastructure() => {
                            store_error = Some(e);
                            break 'items;
                        }
                        Err(e) => {
                            warn!(configuration_id = configuration.id, error = %e, "Could not create job");
                            report.jobs_failed += 1;
                            continue;
                        }
                    };
                    report.jobs_created += 1;

                    let controller = Arc::clone(&self.controller);
                    let permits = Arc::clone(&self.permits);
                    jobs.spawn(async move {
                        let _permit = permits
                            .acquire_owned()
                            .await
                            .map_err(|_| HarvestError::Cancelled)?;
                        controller.run_job(job.id).await
                    });
                }
            }
        }

        while let Some(joined) = jobs.join_next().await {
            match joined {
                Ok(Ok(job)) => match job.status {
                    JobStatus::Completed => report.jobs_completed += 1,
                    JobStatus::Cancelled => report.jobs_cancelled += 1,
                    _ => report.jobs_failed += 1,
                },
                Ok(Err(e)) => {
                    error!(configuration_id = configuration.id, error = %e, "Job run failed");
                    report.jobs_failed += 1;
                    if e.is_infrastructure() && store_error.is_none() {
                        store_error = Some(e);
                    }
                }
                Err(e) => {
                    error!(configuration_id = configuration.id, error = %e, "Job task panicked");
                    report.jobs_failed += 1;
                }
            }
        }

        if let Some(e) = store_error {
            return Err(e);
        }

        let next_run_at = now + configuration.interval();
        lock_storage(&self.storage)?.record_configuration_run(configuration.id, now, next_run_at)?;

        info!(
            configuration_id = configuration.id,
            completed = report.jobs_completed,
            failed = report.jobs_failed,
            cancelled = report.jobs_cancelled,
            next_run_at = %next_run_at,
            "Configuration cycle finished"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tick_interval", &self.tick_interval)
            .field("scheduled", &self.scheduled())
            .field("running", &self.is_running())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
