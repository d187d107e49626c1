//! Shared fixtures for engine tests

use crate::adapters::{AdapterRegistry, CardGridAdapter, NewListing};
use crate::config::ScrapeSettings;
use crate::fetch::{
    FetchClient, RateLimiter, Transport, TransportError, TransportRequest, TransportResponse,
};
use crate::state::JobStatus;
use crate::storage::{
    share, ConfigurationRecord, JobFilter, JobRecord, NewJob, Pagination, ResultRecord,
    SharedStorage, SqliteStorage, Storage, StorageError, StorageResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Fake listing site rendering card-grid pages
///
/// Pages `1..=pages` hold `per_page` cards priced 1000, 2000, ...; later pages
/// are empty. From `fail_from` on, every request answers HTTP 500.
pub(crate) struct FakeSite {
    pub pages: u32,
    pub per_page: usize,
    pub fail_from: Option<u32>,
    calls: AtomicUsize,
}

impl FakeSite {
    pub fn new(pages: u32, per_page: usize) -> Arc<Self> {
        Arc::new(Self {
            pages,
            per_page,
            fail_from: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing_from(pages: u32, per_page: usize, fail_from: u32) -> Arc<Self> {
        Arc::new(Self {
            pages,
            per_page,
            fail_from: Some(fail_from),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn render(&self, page: u32) -> String {
        if page > self.pages {
            return "<html><body><p>No results</p></body></html>".to_string();
        }

        let cards: String = (0..self.per_page)
            .map(|i| {
                format!(
                    r#"<article data-listing="p{page}-{i}">
                         <h2 class="listing-title">Listing {page}-{i}</h2>
                         <a class="listing-link" href="/listing/{page}-{i}">View</a>
                         <span class="listing-price">${price}</span>
                       </article>"#,
                    page = page,
                    i = i,
                    price = (i + 1) * 1_000
                )
            })
            .collect();
        format!("<html><body>{}</body></html>", cards)
    }
}

#[async_trait]
impl Transport for FakeSite {
    async fn get(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let page: u32 = request
            .url
            .query_pairs()
            .find(|(k, _)| k == "page")
            .and_then(|(_, v)| v.parse().ok())
            .unwrap_or(1);

        let status = match self.fail_from {
            Some(from) if page >= from => 500,
            _ => 200,
        };
        let body = if status == 200 {
            self.render(page)
        } else {
            String::new()
        };

        Ok(TransportResponse {
            status,
            body,
            final_url: request.url,
        })
    }
}

pub(crate) fn registry() -> Arc<AdapterRegistry> {
    let mut registry = AdapterRegistry::new();
    registry.register(Arc::new(CardGridAdapter::new(
        "harborview",
        Url::parse("https://harborview.example.com").unwrap(),
    )));
    Arc::new(registry)
}

pub(crate) fn fetcher(site: Arc<FakeSite>) -> Arc<FetchClient> {
    Arc::new(
        FetchClient::new(
            site,
            Arc::new(RateLimiter::new(10_000, Duration::from_secs(1))),
        )
        .with_backoff(Duration::from_millis(1), Duration::from_millis(2)),
    )
}

pub(crate) fn storage() -> SharedStorage {
    share(SqliteStorage::new_in_memory().unwrap())
}

pub(crate) fn settings(sources: &[&str]) -> ScrapeSettings {
    ScrapeSettings {
        sources: sources.iter().map(|s| s.to_string()).collect(),
        locations: ["downtown".to_string()].into_iter().collect(),
        property_types: ["apartment".to_string()].into_iter().collect(),
        max_pages_per_source: 5,
        request_delay_ms: 0,
        max_retries: 0,
        auto_scrape_enabled: true,
        ..Default::default()
    }
}

/// Switches that make [`FlakyStorage`] fail on demand
#[derive(Debug, Default)]
pub(crate) struct Faults {
    pub configuration_reads: AtomicBool,
    pub result_writes: AtomicBool,
}

impl Faults {
    fn check(flag: &AtomicBool) -> StorageResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

/// In-memory SQLite store whose reads and writes can be made to fail
pub(crate) struct FlakyStorage {
    inner: SqliteStorage,
    faults: Arc<Faults>,
}

/// Returns a shared flaky store and the switches controlling it
pub(crate) fn flaky_storage() -> (SharedStorage, Arc<Faults>) {
    let faults = Arc::new(Faults::default());
    let storage = FlakyStorage {
        inner: SqliteStorage::new_in_memory().unwrap(),
        faults: faults.clone(),
    };
    (share(storage), faults)
}

impl Storage for FlakyStorage {
    fn insert_configuration(
        &mut self,
        tenant_id: &str,
        settings: &ScrapeSettings,
    ) -> StorageResult<i64> {
        self.inner.insert_configuration(tenant_id, settings)
    }

    fn get_configuration(&self, id: i64) -> StorageResult<Option<ConfigurationRecord>> {
        Faults::check(&self.faults.configuration_reads)?;
        self.inner.get_configuration(id)
    }

    fn update_configuration_settings(
        &mut self,
        id: i64,
        settings: &ScrapeSettings,
    ) -> StorageResult<()> {
        self.inner.update_configuration_settings(id, settings)
    }

    fn delete_configuration(&mut self, id: i64) -> StorageResult<bool> {
        self.inner.delete_configuration(id)
    }

    fn list_configurations(
        &self,
        tenant_id: Option<&str>,
    ) -> StorageResult<Vec<ConfigurationRecord>> {
        self.inner.list_configurations(tenant_id)
    }

    fn list_auto_scrape_configurations(&self) -> StorageResult<Vec<ConfigurationRecord>> {
        self.inner.list_auto_scrape_configurations()
    }

    fn record_configuration_run(
        &mut self,
        id: i64,
        last_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.inner.record_configuration_run(id, last_run_at, next_run_at)
    }

    fn create_job(&mut self, job: &NewJob) -> StorageResult<i64> {
        self.inner.create_job(job)
    }

    fn get_job(&self, id: i64) -> StorageResult<Option<JobRecord>> {
        self.inner.get_job(id)
    }

    fn start_job(&mut self, id: i64, started_at: DateTime<Utc>) -> StorageResult<()> {
        self.inner.start_job(id, started_at)
    }

    fn finish_job(
        &mut self,
        id: i64,
        status: JobStatus,
        error_message: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> StorageResult<JobRecord> {
        self.inner.finish_job(id, status, error_message, completed_at)
    }

    fn list_jobs(&self, filter: &JobFilter) -> StorageResult<Vec<JobRecord>> {
        self.inner.list_jobs(filter)
    }

    fn insert_results(
        &mut self,
        job_id: i64,
        listings: &[NewListing],
        scraped_at: DateTime<Utc>,
    ) -> StorageResult<usize> {
        Faults::check(&self.faults.result_writes)?;
        self.inner.insert_results(job_id, listings, scraped_at)
    }

    fn get_job_results(&self, job_id: i64, page: Pagination) -> StorageResult<Vec<ResultRecord>> {
        self.inner.get_job_results(job_id, page)
    }

    fn count_results(&self, job_id: i64) -> StorageResult<u64> {
        self.inner.count_results(job_id)
    }

    fn count_jobs_by_status(
        &self,
        configuration_id: i64,
    ) -> StorageResult<HashMap<JobStatus, u64>> {
        self.inner.count_jobs_by_status(configuration_id)
    }

    fn total_items(&self, configuration_id: i64) -> StorageResult<u64> {
        self.inner.total_items(configuration_id)
    }

    fn source_distribution(&self, configuration_id: i64) -> StorageResult<HashMap<String, u64>> {
        self.inner.source_distribution(configuration_id)
    }
}
