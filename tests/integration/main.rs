//! End-to-end tests against mock listing sites
//!
//! These tests use wiremock to serve search pages and run jobs through the
//! real reqwest transport, the SQLite store and the scheduler.

mod common;
mod job_tests;
mod scheduler_tests;
