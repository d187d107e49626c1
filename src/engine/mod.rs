//! Engine module: job execution and periodic scheduling
//!
//! # Components
//!
//! - `JobController`: creates jobs and runs them through their lifecycle
//! - `Scheduler`: ticks periodically and runs due configurations as jobs

mod controller;
mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::JobController;
pub use scheduler::{CycleReport, Scheduler};
