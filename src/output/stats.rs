//! Per-configuration job statistics
//!
//! This module provides functionality for aggregating a configuration's job
//! history from the storage layer and displaying it.

use crate::state::JobStatus;
use crate::storage::{Storage, StorageResult};
use serde::Serialize;
use std::collections::BTreeMap;

/// Job statistics for one configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatistics {
    pub configuration_id: i64,

    /// Jobs in any status
    pub total_jobs: u64,

    pub completed_jobs: u64,
    pub failed_jobs: u64,
    pub cancelled_jobs: u64,

    /// Listings stored across all jobs
    pub total_items: u64,

    /// Completed jobs as a percentage of all jobs (0 when there are none)
    pub success_rate: f64,

    /// Number of jobs per source
    pub source_distribution: BTreeMap<String, u64>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `configuration_id` - The configuration whose jobs are counted
///
/// # Returns
///
/// * `Ok(JobStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics(
    storage: &(impl Storage + ?Sized),
    configuration_id: i64,
) -> StorageResult<JobStatistics> {
    let by_status = storage.count_jobs_by_status(configuration_id)?;
    let count = |status: JobStatus| by_status.get(&status).copied().unwrap_or(0);

    let total_jobs: u64 = by_status.values().sum();
    let completed_jobs = count(JobStatus::Completed);

    let success_rate = if total_jobs > 0 {
        (completed_jobs as f64 / total_jobs as f64) * 100.0
    } else {
        0.0
    };

    Ok(JobStatistics {
        configuration_id,
        total_jobs,
        completed_jobs,
        failed_jobs: count(JobStatus::Failed),
        cancelled_jobs: count(JobStatus::Cancelled),
        total_items: storage.total_items(configuration_id)?,
        success_rate,
        source_distribution: storage
            .source_distribution(configuration_id)?
            .into_iter()
            .collect(),
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &JobStatistics) {
    println!("=== Job Statistics (configuration {}) ===\n", stats.configuration_id);

    println!("Overview:");
    println!("  Total jobs: {}", stats.total_jobs);
    println!("  Completed: {}", stats.completed_jobs);
    println!("  Failed: {}", stats.failed_jobs);
    println!("  Cancelled: {}", stats.cancelled_jobs);
    println!("  Listings stored: {}", stats.total_items);
    println!();

    if !stats.source_distribution.is_empty() {
        println!("Jobs by Source:");
        let mut sources: Vec<_> = stats.source_distribution.iter().collect();
        sources.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        for (source, count) in sources {
            let percentage = if stats.total_jobs > 0 {
                (*count as f64 / stats.total_jobs as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", source, count, percentage);
        }
        println!();
    }

    println!(
        "Success Rate: {:.1}% ({} / {} jobs completed)",
        stats.success_rate, stats.completed_jobs, stats.total_jobs
    );
}
