//! Metrics collection and exposition.
//!
//! # Metrics
//! - `pipeiq_requests_total` (counter): completed requests by service, method, outcome
//! - `pipeiq_request_duration_seconds` (histogram): latency per service
//! - `pipeiq_cache_hits_total` / `pipeiq_cache_misses_total` (counter)
//! - `pipeiq_cache_entries` (gauge): live cache size per service
//! - `pipeiq_rate_limited_total` (counter): local limiter rejections
//! - `pipeiq_retries_total` (counter): retry attempts
//!
//! Without an installed recorder every call here is a no-op.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder with its own HTTP scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Install the Prometheus recorder and hand back a handle for rendering.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Record one completed logical request.
pub fn record_request(service: &str, method: &str, outcome: &str, start: Instant) {
    metrics::counter!(
        "pipeiq_requests_total",
        "service" => service.to_string(),
        "method" => method.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    metrics::histogram!("pipeiq_request_duration_seconds", "service" => service.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_cache_hit(service: &str) {
    metrics::counter!("pipeiq_cache_hits_total", "service" => service.to_string()).increment(1);
}

pub fn record_cache_miss(service: &str) {
    metrics::counter!("pipeiq_cache_misses_total", "service" => service.to_string()).increment(1);
}

pub fn record_cache_size(service: &str, size: usize) {
    metrics::gauge!("pipeiq_cache_entries", "service" => service.to_string()).set(size as f64);
}

pub fn record_rate_limited(service: &str) {
    metrics::counter!("pipeiq_rate_limited_total", "service" => service.to_string()).increment(1);
}

pub fn record_retry(service: &str) {
    metrics::counter!("pipeiq_retries_total", "service" => service.to_string()).increment(1);
}
