//! Output module for reporting on job history
//!
//! This module handles:
//! - Aggregating per-configuration job statistics
//! - Printing statistics for operators

pub mod stats;

pub use stats::{load_statistics, print_statistics, JobStatistics};
