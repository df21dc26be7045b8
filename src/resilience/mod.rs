//! Resilience subsystem shared by every service client.
//!
//! # Data Flow
//! ```text
//! Request from a service client:
//!     → cache.rs (GET only: fresh hit returns immediately)
//!     → retries.rs (bounded attempts with backoff.rs delays)
//!         → rate_limit.rs (one token per attempt)
//!         → timeouts.rs (deadline around send + classify)
//!     → cache.rs (store successful GET)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Each client instance owns its own limiter, cache and retry policy
//! - Locks are never held across network I/O

pub mod backoff;
pub mod cache;
pub mod rate_limit;
pub mod retries;
pub mod timeouts;

pub use cache::TtlCache;
pub use rate_limit::{RateLimitStatus, RateLimiter};
pub use retries::{retry, RetryPolicy};
