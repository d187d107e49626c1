//! Fetch module: the HTTP primitive shared by every adapter
//!
//! The pipeline is assembled in dependency order:
//!
//! ```text
//! RateLimiter::acquire(domain) → RetryPolicy attempt loop → Transport::get
//! ```
//!
//! # Components
//!
//! - `FetchClient`: the public `fetch(url, policy, cancel)` entry point
//! - `RateLimiter`: sliding-window limit on call starts per domain
//! - `RetryPolicy`: exponential backoff with jitter for transient failures
//! - `Transport`: one HTTP request; `ReqwestTransport` in production

mod client;
mod rate_limiter;
mod retry;
mod transport;

pub use client::{FetchClient, FetchPolicy, PageContent};
pub use rate_limiter::{Clock, RateLimiter, TokioClock};
pub use retry::RetryPolicy;
pub use transport::{
    ReqwestTransport, Transport, TransportError, TransportErrorKind, TransportRequest,
    TransportResponse,
};
