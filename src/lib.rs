//! PipeIQ: async API client wrappers over one shared resilience pipeline.
//!
//! Every service client in [`services`] owns a [`RequestPipeline`] that
//! applies token-bucket rate limiting, a TTL cache for GET requests, and
//! bounded retry with backoff before translating HTTP outcomes into
//! [`ApiError`].

pub mod config;
pub mod error;
pub mod http;
pub mod observability;
pub mod resilience;
pub mod services;
pub mod wallet;

pub use config::schema::{ClientConfig, PipeIqConfig};
pub use error::{ApiError, ApiResult};
pub use http::{ApiRequest, RequestPipeline};
pub use wallet::Wallet;
