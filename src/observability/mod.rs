//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline, limiter, cache and retry executor produce:
//!     → tracing events (service, endpoint, attempt, status fields)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout, pretty or JSON)
//!     → Prometheus scrape endpoint (optional)
//! ```

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::init_metrics;
