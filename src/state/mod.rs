//! State module for tracking job and fetch progress
//!
//! # Components
//!
//! - `JobStatus`: Lifecycle of a single scraping job (pending, running, terminal states)
//! - `DomainWindow`: Per-domain sliding window of call starts used for rate limiting

mod domain_window;
mod job_state;

// Re-export main types
pub use domain_window::DomainWindow;
pub use job_state::JobStatus;
