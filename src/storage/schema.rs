//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the harvest database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Tenant scrape configurations
CREATE TABLE IF NOT EXISTS configurations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id TEXT NOT NULL,
    sources TEXT NOT NULL,
    locations TEXT NOT NULL,
    property_types TEXT NOT NULL,
    price_min REAL,
    price_max REAL,
    max_pages_per_source INTEGER NOT NULL,
    request_delay_ms INTEGER NOT NULL,
    max_retries INTEGER NOT NULL,
    proxy_enabled INTEGER NOT NULL DEFAULT 0,
    proxy_url TEXT,
    user_agent TEXT,
    auto_scrape_enabled INTEGER NOT NULL DEFAULT 0,
    auto_scrape_interval_hours INTEGER NOT NULL,
    last_run_at TEXT,
    next_run_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_configurations_tenant ON configurations(tenant_id);
CREATE INDEX IF NOT EXISTS idx_configurations_auto ON configurations(auto_scrape_enabled);

-- One row per (configuration, source, location, property type) attempt.
-- configuration_id is not a foreign key so history survives deletion.
CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    configuration_id INTEGER NOT NULL,
    tenant_id TEXT NOT NULL,
    source TEXT NOT NULL,
    location TEXT NOT NULL,
    property_type TEXT NOT NULL,
    status TEXT NOT NULL,
    items_scraped INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    created_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_jobs_config_status_created
    ON jobs(configuration_id, status, created_at);
CREATE INDEX IF NOT EXISTS idx_jobs_tenant ON jobs(tenant_id);

-- Normalized listings
CREATE TABLE IF NOT EXISTS results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id INTEGER NOT NULL REFERENCES jobs(id),
    title TEXT NOT NULL,
    price REAL NOT NULL,
    location TEXT NOT NULL,
    property_type TEXT NOT NULL,
    bedrooms INTEGER,
    bathrooms INTEGER,
    area REAL,
    images TEXT NOT NULL,
    source_url TEXT NOT NULL,
    metadata TEXT NOT NULL,
    scraped_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_results_job ON results(job_id);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// Gets the current schema version
pub fn get_schema_version() -> u32 {
    1
}
