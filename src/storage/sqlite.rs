//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::adapters::NewListing;
use crate::config::ScrapeSettings;
use crate::state::JobStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    to_db_timestamp, ConfigurationRecord, JobFilter, JobRecord, NewJob, Pagination, ResultRecord,
};
use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;

const CONFIGURATION_COLUMNS: &str = "id, tenant_id, sources, locations, property_types, \
     price_min, price_max, max_pages_per_source, request_delay_ms, max_retries, \
     proxy_enabled, proxy_url, user_agent, auto_scrape_enabled, auto_scrape_interval_hours, \
     last_run_at, next_run_at, created_at, updated_at";

const JOB_COLUMNS: &str = "id, configuration_id, tenant_id, source, location, property_type, \
     status, items_scraped, error_message, created_at, started_at, completed_at";

const RESULT_COLUMNS: &str = "id, job_id, title, price, location, property_type, bedrooms, \
     bathrooms, area, images, source_url, metadata, scraped_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for tests and dry runs)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

impl Storage for SqliteStorage {
    // ===== Configuration Management =====

    fn insert_configuration(
        &mut self,
        tenant_id: &str,
        settings: &ScrapeSettings,
    ) -> StorageResult<i64> {
        let now = to_db_timestamp(&Utc::now());
        self.conn.execute(
            "INSERT INTO configurations (tenant_id, sources, locations, property_types,
             price_min, price_max, max_pages_per_source, request_delay_ms, max_retries,
             proxy_enabled, proxy_url, user_agent, auto_scrape_enabled,
             auto_scrape_interval_hours, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)",
            params![
                tenant_id,
                serde_json::to_string(&settings.sources)?,
                serde_json::to_string(&settings.locations)?,
                serde_json::to_string(&settings.property_types)?,
                settings.price_min,
                settings.price_max,
                settings.max_pages_per_source,
                settings.request_delay_ms as i64,
                settings.max_retries,
                settings.proxy_enabled,
                settings.proxy_url,
                settings.user_agent,
                settings.auto_scrape_enabled,
                settings.auto_scrape_interval_hours,
                now,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_configuration(&self, id: i64) -> StorageResult<Option<ConfigurationRecord>> {
        let sql = format!(
            "SELECT {} FROM configurations WHERE id = ?1",
            CONFIGURATION_COLUMNS
        );
        let record = self
            .conn
            .query_row(&sql, params![id], configuration_from_row)
            .optional()?;
        Ok(record)
    }

    fn update_configuration_settings(
        &mut self,
        id: i64,
        settings: &ScrapeSettings,
    ) -> StorageResult<()> {
        let now = to_db_timestamp(&Utc::now());
        let changed = self.conn.execute(
            "UPDATE configurations SET sources = ?1, locations = ?2, property_types = ?3,
             price_min = ?4, price_max = ?5, max_pages_per_source = ?6, request_delay_ms = ?7,
             max_retries = ?8, proxy_enabled = ?9, proxy_url = ?10, user_agent = ?11,
             auto_scrape_enabled = ?12, auto_scrape_interval_hours = ?13, updated_at = ?14
             WHERE id = ?15",
            params![
                serde_json::to_string(&settings.sources)?,
                serde_json::to_string(&settings.locations)?,
                serde_json::to_string(&settings.property_types)?,
                settings.price_min,
                settings.price_max,
                settings.max_pages_per_source,
                settings.request_delay_ms as i64,
                settings.max_retries,
                settings.proxy_enabled,
                settings.proxy_url,
                settings.user_agent,
                settings.auto_scrape_enabled,
                settings.auto_scrape_interval_hours,
                now,
                id,
            ],
        )?;

        if changed == 0 {
            return Err(StorageError::ConfigurationNotFound(id));
        }
        Ok(())
    }

    fn delete_configuration(&mut self, id: i64) -> StorageResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM configurations WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    fn list_configurations(
        &self,
        tenant_id: Option<&str>,
    ) -> StorageResult<Vec<ConfigurationRecord>> {
        let records = match tenant_id {
            Some(tenant) => {
                let sql = format!(
                    "SELECT {} FROM configurations WHERE tenant_id = ?1 ORDER BY id",
                    CONFIGURATION_COLUMNS
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt.query_map(params![tenant], configuration_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let sql = format!("SELECT {} FROM configurations ORDER BY id", CONFIGURATION_COLUMNS);
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt.query_map([], configuration_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(records)
    }

    fn list_auto_scrape_configurations(&self) -> StorageResult<Vec<ConfigurationRecord>> {
        let sql = format!(
            "SELECT {} FROM configurations WHERE auto_scrape_enabled = 1 ORDER BY id",
            CONFIGURATION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map([], configuration_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn record_configuration_run(
        &mut self,
        id: i64,
        last_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE configurations SET last_run_at = ?1, next_run_at = ?2 WHERE id = ?3",
            params![
                to_db_timestamp(&last_run_at),
                to_db_timestamp(&next_run_at),
                id
            ],
        )?;

        if changed == 0 {
            return Err(StorageError::ConfigurationNotFound(id));
        }
        Ok(())
    }

    // ===== Job Management =====

    fn create_job(&mut self, job: &NewJob) -> StorageResult<i64> {
        let now = to_db_timestamp(&Utc::now());
        self.conn.execute(
            "INSERT INTO jobs (configuration_id, tenant_id, source, location, property_type,
             status, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                job.configuration_id,
                job.tenant_id,
                job.source,
                job.location,
                job.property_type,
                JobStatus::Pending.to_db_string(),
                now
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_job(&self, id: i64) -> StorageResult<Option<JobRecord>> {
        Ok(load_job(&self.conn, id)?)
    }

    fn start_job(&mut self, id: i64, started_at: DateTime<Utc>) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        check_transition(&tx, id, JobStatus::Running)?;

        tx.execute(
            "UPDATE jobs SET status = ?1, started_at = ?2 WHERE id = ?3 AND status = ?4",
            params![
                JobStatus::Running.to_db_string(),
                to_db_timestamp(&started_at),
                id,
                JobStatus::Pending.to_db_string()
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn finish_job(
        &mut self,
        id: i64,
        status: JobStatus,
        error_message: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> StorageResult<JobRecord> {
        let tx = self.conn.transaction()?;
        check_transition(&tx, id, status)?;

        tx.execute(
            "UPDATE jobs SET status = ?1, error_message = ?2, completed_at = ?3,
             items_scraped = (SELECT COUNT(*) FROM results WHERE job_id = ?4)
             WHERE id = ?4 AND status = ?5",
            params![
                status.to_db_string(),
                error_message,
                to_db_timestamp(&completed_at),
                id,
                JobStatus::Running.to_db_string()
            ],
        )?;

        let job = load_job(&tx, id)?.ok_or(StorageError::JobNotFound(id))?;
        tx.commit()?;
        Ok(job)
    }

    fn list_jobs(&self, filter: &JobFilter) -> StorageResult<Vec<JobRecord>> {
        let mut sql = format!("SELECT {} FROM jobs WHERE 1 = 1", JOB_COLUMNS);
        let mut values: Vec<Value> = Vec::new();

        if let Some(tenant_id) = &filter.tenant_id {
            values.push(Value::Text(tenant_id.clone()));
            sql.push_str(&format!(" AND tenant_id = ?{}", values.len()));
        }
        if let Some(configuration_id) = filter.configuration_id {
            values.push(Value::Integer(configuration_id));
            sql.push_str(&format!(" AND configuration_id = ?{}", values.len()));
        }
        if let Some(source) = &filter.source {
            values.push(Value::Text(source.clone()));
            sql.push_str(&format!(" AND source = ?{}", values.len()));
        }
        if let Some(status) = filter.status {
            values.push(Value::Text(status.to_db_string().to_string()));
            sql.push_str(&format!(" AND status = ?{}", values.len()));
        }
        if let Some(after) = &filter.created_after {
            values.push(Value::Text(to_db_timestamp(after)));
            sql.push_str(&format!(" AND created_at >= ?{}", values.len()));
        }
        if let Some(before) = &filter.created_before {
            values.push(Value::Text(to_db_timestamp(before)));
            sql.push_str(&format!(" AND created_at < ?{}", values.len()));
        }

        sql.push_str(" ORDER BY created_at DESC, id DESC");

        if let Some(limit) = filter.limit {
            values.push(Value::Integer(i64::from(limit)));
            sql.push_str(&format!(" LIMIT ?{}", values.len()));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let jobs = stmt
            .query_map(params_from_iter(values.iter()), job_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    // ===== Result Management =====

    fn insert_results(
        &mut self,
        job_id: i64,
        listings: &[NewListing],
        scraped_at: DateTime<Utc>,
    ) -> StorageResult<usize> {
        let tx = self.conn.transaction()?;

        let status = load_job_status(&tx, job_id)?.ok_or(StorageError::JobNotFound(job_id))?;
        if status != JobStatus::Running {
            return Err(StorageError::JobNotRunning { id: job_id, status });
        }

        let scraped_at = to_db_timestamp(&scraped_at);
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO results (job_id, title, price, location, property_type, bedrooms,
                 bathrooms, area, images, source_url, metadata, scraped_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;

            for listing in listings {
                inserted += stmt.execute(params![
                    job_id,
                    listing.title,
                    listing.price,
                    listing.location,
                    listing.property_type,
                    listing.bedrooms,
                    listing.bathrooms,
                    listing.area,
                    serde_json::to_string(&listing.images)?,
                    listing.source_url,
                    serde_json::to_string(&listing.metadata)?,
                    scraped_at,
                ])?;
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    fn get_job_results(&self, job_id: i64, page: Pagination) -> StorageResult<Vec<ResultRecord>> {
        let sql = format!(
            "SELECT {} FROM results WHERE job_id = ?1 ORDER BY id LIMIT ?2 OFFSET ?3",
            RESULT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let results = stmt
            .query_map(params![job_id, page.limit, page.offset], result_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(results)
    }

    fn count_results(&self, job_id: i64) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM results WHERE job_id = ?1",
            params![job_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ===== Statistics =====

    fn count_jobs_by_status(
        &self,
        configuration_id: i64,
    ) -> StorageResult<HashMap<JobStatus, u64>> {
        let mut stmt = self.conn.prepare(
            "SELECT status, COUNT(*) FROM jobs WHERE configuration_id = ?1 GROUP BY status",
        )?;

        let mut counts = HashMap::new();
        let rows = stmt.query_map(params![configuration_id], |row| {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((status, count))
        })?;

        for row in rows {
            let (status_str, count) = row?;
            if let Some(status) = JobStatus::from_db_string(&status_str) {
                counts.insert(status, count as u64);
            }
        }

        Ok(counts)
    }

    fn total_items(&self, configuration_id: i64) -> StorageResult<u64> {
        let total: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(items_scraped), 0) FROM jobs WHERE configuration_id = ?1",
            params![configuration_id],
            |row| row.get(0),
        )?;
        Ok(total as u64)
    }

    fn source_distribution(&self, configuration_id: i64) -> StorageResult<HashMap<String, u64>> {
        let mut stmt = self.conn.prepare(
            "SELECT source, COUNT(*) FROM jobs WHERE configuration_id = ?1 GROUP BY source",
        )?;

        let mut distribution = HashMap::new();
        let rows = stmt.query_map(params![configuration_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (source, count) = row?;
            distribution.insert(source, count as u64);
        }

        Ok(distribution)
    }
}

/// Verifies that the stored status of a job may move to `next`
fn check_transition(conn: &Connection, id: i64, next: JobStatus) -> StorageResult<()> {
    let current = load_job_status(conn, id)?.ok_or(StorageError::JobNotFound(id))?;
    if !current.can_transition_to(next) {
        return Err(StorageError::InvalidTransition {
            from: current,
            to: next,
        });
    }
    Ok(())
}

fn load_job_status(conn: &Connection, id: i64) -> rusqlite::Result<Option<JobStatus>> {
    let status: Option<String> = conn
        .query_row("SELECT status FROM jobs WHERE id = ?1", params![id], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(status.and_then(|s| JobStatus::from_db_string(&s)))
}

fn load_job(conn: &Connection, id: i64) -> rusqlite::Result<Option<JobRecord>> {
    let sql = format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS);
    conn.query_row(&sql, params![id], job_from_row).optional()
}

fn configuration_from_row(row: &Row<'_>) -> rusqlite::Result<ConfigurationRecord> {
    Ok(ConfigurationRecord {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        settings: ScrapeSettings {
            sources: json_column(row, 2)?,
            locations: json_column(row, 3)?,
            property_types: json_column(row, 4)?,
            price_min: row.get(5)?,
            price_max: row.get(6)?,
            max_pages_per_source: row.get(7)?,
            request_delay_ms: row.get::<_, i64>(8)?.max(0) as u64,
            max_retries: row.get(9)?,
            proxy_enabled: row.get(10)?,
            proxy_url: row.get(11)?,
            user_agent: row.get(12)?,
            auto_scrape_enabled: row.get(13)?,
            auto_scrape_interval_hours: row.get(14)?,
        },
        last_run_at: optional_timestamp_column(row, 15)?,
        next_run_at: optional_timestamp_column(row, 16)?,
        created_at: timestamp_column(row, 17)?,
        updated_at: timestamp_column(row, 18)?,
    })
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<JobRecord> {
    Ok(JobRecord {
        id: row.get(0)?,
        configuration_id: row.get(1)?,
        tenant_id: row.get(2)?,
        source: row.get(3)?,
        location: row.get(4)?,
        property_type: row.get(5)?,
        status: JobStatus::from_db_string(&row.get::<_, String>(6)?).unwrap_or(JobStatus::Failed),
        items_scraped: row.get::<_, i64>(7)?.max(0) as u64,
        error_message: row.get(8)?,
        created_at: timestamp_column(row, 9)?,
        started_at: optional_timestamp_column(row, 10)?,
        completed_at: optional_timestamp_column(row, 11)?,
    })
}

fn result_from_row(row: &Row<'_>) -> rusqlite::Result<ResultRecord> {
    Ok(ResultRecord {
        id: row.get(0)?,
        job_id: row.get(1)?,
        title: row.get(2)?,
        price: row.get(3)?,
        location: row.get(4)?,
        property_type: row.get(5)?,
        bedrooms: row.get(6)?,
        bathrooms: row.get(7)?,
        area: row.get(8)?,
        images: json_column(row, 9)?,
        source_url: row.get(10)?,
        metadata: json_column(row, 11)?,
        scraped_at: timestamp_column(row, 12)?,
    })
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    parse_timestamp(&text, idx)
}

fn optional_timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| parse_timestamp(&t, idx)).transpose()
}

fn parse_timestamp(text: &str, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings() -> ScrapeSettings {
        ScrapeSettings {
            sources: ["harborview".to_string(), "openhouse".to_string()]
                .into_iter()
                .collect(),
            locations: ["downtown".to_string()].into_iter().collect(),
            property_types: ["apartment".to_string()].into_iter().collect(),
            price_min: Some(1_000.0),
            auto_scrape_enabled: true,
            ..Default::default()
        }
    }

    fn listing(title: &str) -> NewListing {
        NewListing {
            title: title.to_string(),
            price: 250_000.0,
            location: "downtown".to_string(),
            property_type: "apartment".to_string(),
            bedrooms: Some(2),
            bathrooms: None,
            area: Some(861.12),
            images: vec!["https://img.example.com/1.jpg".to_string()],
            source_url: format!("https://listings.example.com/{}", title),
            metadata: json!({ "source": "harborview" }),
        }
    }

    fn new_job(configuration_id: i64, source: &str) -> NewJob {
        NewJob {
            configuration_id,
            tenant_id: "acme".to_string(),
            source: source.to_string(),
            location: "downtown".to_string(),
            property_type: "apartment".to_string(),
        }
    }

    #[test]
    fn test_create_in_memory() {
        assert!(SqliteStorage::new_in_memory().is_ok());
    }

    #[test]
    fn test_configuration_roundtrip() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let id = storage.insert_configuration("acme", &settings()).unwrap();

        let record = storage.get_configuration(id).unwrap().unwrap();
        assert_eq!(record.tenant_id, "acme");
        assert_eq!(record.settings, settings());
        assert!(record.last_run_at.is_none());
    }

    #[test]
    fn test_update_missing_configuration() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let result = storage.update_configuration_settings(99, &settings());
        assert!(matches!(result, Err(StorageError::ConfigurationNotFound(99))));
    }

    #[test]
    fn test_list_configurations_by_tenant() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.insert_configuration("acme", &settings()).unwrap();
        storage.insert_configuration("globex", &settings()).unwrap();
        let manual = ScrapeSettings::default();
        storage.insert_configuration("acme", &manual).unwrap();

        assert_eq!(storage.list_configurations(Some("acme")).unwrap().len(), 2);
        assert_eq!(storage.list_configurations(None).unwrap().len(), 3);
        assert_eq!(storage.list_auto_scrape_configurations().unwrap().len(), 2);
    }

    #[test]
    fn test_delete_configuration_keeps_jobs() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let id = storage.insert_configuration("acme", &settings()).unwrap();
        let job_id = storage.create_job(&new_job(id, "harborview")).unwrap();

        assert!(storage.delete_configuration(id).unwrap());
        assert!(!storage.delete_configuration(id).unwrap());
        assert!(storage.get_configuration(id).unwrap().is_none());
        assert!(storage.get_job(job_id).unwrap().is_some());
    }

    #[test]
    fn test_record_configuration_run() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let id = storage.insert_configuration("acme", &settings()).unwrap();
        let now = Utc::now();
        let next = now + chrono::Duration::hours(24);

        storage.record_configuration_run(id, now, next).unwrap();

        let record = storage.get_configuration(id).unwrap().unwrap();
        assert_eq!(
            record.last_run_at.map(|t| t.timestamp_micros()),
            Some(now.timestamp_micros())
        );
        assert!(!record.is_due(now + chrono::Duration::hours(1)));
    }

    #[test]
    fn test_job_lifecycle() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let config_id = storage.insert_configuration("acme", &settings()).unwrap();
        let job_id = storage.create_job(&new_job(config_id, "harborview")).unwrap();

        let job = storage.get_job(job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.started_at.is_none());

        storage.start_job(job_id, Utc::now()).unwrap();
        storage
            .insert_results(job_id, &[listing("a"), listing("b")], Utc::now())
            .unwrap();

        let job = storage
            .finish_job(job_id, JobStatus::Completed, None, Utc::now())
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.items_scraped, 2);
        assert!(job.started_at.is_some());
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_terminal_job_is_immutable() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let config_id = storage.insert_configuration("acme", &settings()).unwrap();
        let job_id = storage.create_job(&new_job(config_id, "harborview")).unwrap();
        storage.start_job(job_id, Utc::now()).unwrap();
        storage
            .finish_job(job_id, JobStatus::Failed, Some("boom"), Utc::now())
            .unwrap();

        let again = storage.finish_job(job_id, JobStatus::Completed, None, Utc::now());
        assert!(matches!(
            again,
            Err(StorageError::InvalidTransition {
                from: JobStatus::Failed,
                to: JobStatus::Completed
            })
        ));

        let restart = storage.start_job(job_id, Utc::now());
        assert!(matches!(restart, Err(StorageError::InvalidTransition { .. })));

        let late = storage.insert_results(job_id, &[listing("late")], Utc::now());
        assert!(matches!(late, Err(StorageError::JobNotRunning { .. })));

        let job = storage.get_job(job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_pending_job_cannot_finish() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let config_id = storage.insert_configuration("acme", &settings()).unwrap();
        let job_id = storage.create_job(&new_job(config_id, "harborview")).unwrap();

        let result = storage.finish_job(job_id, JobStatus::Completed, None, Utc::now());
        assert!(matches!(result, Err(StorageError::InvalidTransition { .. })));
    }

    #[test]
    fn test_missing_job() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        assert!(storage.get_job(7).unwrap().is_none());
        assert!(matches!(
            storage.start_job(7, Utc::now()),
            Err(StorageError::JobNotFound(7))
        ));
    }

    #[test]
    fn test_results_roundtrip_and_pagination() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let config_id = storage.insert_configuration("acme", &settings()).unwrap();
        let job_id = storage.create_job(&new_job(config_id, "harborview")).unwrap();
        storage.start_job(job_id, Utc::now()).unwrap();

        let listings: Vec<NewListing> = (0..5).map(|i| listing(&format!("l{}", i))).collect();
        assert_eq!(storage.insert_results(job_id, &listings, Utc::now()).unwrap(), 5);
        assert_eq!(storage.count_results(job_id).unwrap(), 5);

        let first = storage.get_job_results(job_id, Pagination::page(1, 2)).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].title, "l0");
        assert_eq!(first[0].images, vec!["https://img.example.com/1.jpg".to_string()]);
        assert_eq!(first[0].metadata["source"], "harborview");
        assert_eq!(first[0].bedrooms, Some(2));
        assert_eq!(first[0].bathrooms, None);

        let last = storage.get_job_results(job_id, Pagination::page(3, 2)).unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].title, "l4");
    }

    #[test]
    fn test_list_jobs_filters() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let config_id = storage.insert_configuration("acme", &settings()).unwrap();
        let other_id = storage.insert_configuration("globex", &settings()).unwrap();

        let a = storage.create_job(&new_job(config_id, "harborview")).unwrap();
        storage.create_job(&new_job(config_id, "openhouse")).unwrap();
        let mut globex = new_job(other_id, "harborview");
        globex.tenant_id = "globex".to_string();
        storage.create_job(&globex).unwrap();

        storage.start_job(a, Utc::now()).unwrap();
        storage
            .finish_job(a, JobStatus::Failed, Some("HTTP 500"), Utc::now())
            .unwrap();

        let all = storage.list_jobs(&JobFilter::default()).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all[0].id > all[2].id, "newest first");

        let acme = storage
            .list_jobs(&JobFilter {
                tenant_id: Some("acme".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(acme.len(), 2);

        let failed = storage
            .list_jobs(&JobFilter {
                status: Some(JobStatus::Failed),
                source: Some("harborview".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].error_message.as_deref(), Some("HTTP 500"));

        let limited = storage
            .list_jobs(&JobFilter {
                limit: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(limited.len(), 1);

        let future = storage
            .list_jobs(&JobFilter {
                created_after: Some(Utc::now() + chrono::Duration::hours(1)),
                ..Default::default()
            })
            .unwrap();
        assert!(future.is_empty());
    }

    #[test]
    fn test_statistics_queries() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let config_id = storage.insert_configuration("acme", &settings()).unwrap();

        let done = storage.create_job(&new_job(config_id, "harborview")).unwrap();
        storage.start_job(done, Utc::now()).unwrap();
        storage
            .insert_results(done, &[listing("a"), listing("b"), listing("c")], Utc::now())
            .unwrap();
        storage
            .finish_job(done, JobStatus::Completed, None, Utc::now())
            .unwrap();

        let failed = storage.create_job(&new_job(config_id, "openhouse")).unwrap();
        storage.start_job(failed, Utc::now()).unwrap();
        storage
            .finish_job(failed, JobStatus::Failed, Some("unsupported"), Utc::now())
            .unwrap();

        let counts = storage.count_jobs_by_status(config_id).unwrap();
        assert_eq!(counts.get(&JobStatus::Completed), Some(&1));
        assert_eq!(counts.get(&JobStatus::Failed), Some(&1));
        assert_eq!(storage.total_items(config_id).unwrap(), 3);

        let distribution = storage.source_distribution(config_id).unwrap();
        assert_eq!(distribution.get("harborview"), Some(&1));
        assert_eq!(distribution.get("openhouse"), Some(&1));
    }
}
