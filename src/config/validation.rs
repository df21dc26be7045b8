//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, windows > 0, delays ordered)
//! - Check that every base URL parses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: PipeIqConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;
use url::Url;

use crate::config::schema::{CacheConfig, ClientConfig, PipeIqConfig, RateLimitConfig, RetryConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate the whole configuration tree.
pub fn validate_config(config: &PipeIqConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let sections: [(&str, &ClientConfig); 9] = [
        ("hellomoon", &config.hellomoon.client),
        ("openrouter", &config.openrouter.client),
        ("prime_intellect", &config.prime_intellect.client),
        ("world_chain", &config.world_chain.client),
        ("attestation", &config.attestation.client),
        ("worldcoin", &config.worldcoin.client),
        ("persona", &config.persona.client),
        ("solana", &config.solana.client),
        ("gateway", &config.gateway.client),
    ];
    for (name, client) in sections {
        collect_client_errors(&format!("{name}.client"), client, &mut errors);
    }

    if Url::parse(&config.hellomoon.ws_url).is_err() {
        errors.push(ValidationError::new("hellomoon.ws_url", "must be a valid URL"));
    }
    for (i, url) in config.solana.failover_urls.iter().enumerate() {
        if Url::parse(url).is_err() {
            errors.push(ValidationError::new(
                format!("solana.failover_urls[{i}]"),
                "must be a valid URL",
            ));
        }
    }
    if config.prime_intellect.metrics_history == 0 {
        errors.push(ValidationError::new(
            "prime_intellect.metrics_history",
            "must be at least 1",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate one client section on its own.
pub fn validate_client(prefix: &str, client: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    collect_client_errors(prefix, client, &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn collect_client_errors(prefix: &str, client: &ClientConfig, errors: &mut Vec<ValidationError>) {
    match Url::parse(&client.base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => errors.push(ValidationError::new(
            format!("{prefix}.base_url"),
            "must be an absolute http(s) URL",
        )),
    }
    if client.timeout_secs == 0 {
        errors.push(ValidationError::new(
            format!("{prefix}.timeout_secs"),
            "must be greater than 0",
        ));
    }
    collect_rate_limit_errors(&format!("{prefix}.rate_limit"), &client.rate_limit, errors);
    collect_cache_errors(&format!("{prefix}.cache"), &client.cache, errors);
    collect_retry_errors(&format!("{prefix}.retries"), &client.retries, errors);
}

fn collect_rate_limit_errors(prefix: &str, config: &RateLimitConfig, errors: &mut Vec<ValidationError>) {
    if config.requests_per_window == 0 {
        errors.push(ValidationError::new(
            format!("{prefix}.requests_per_window"),
            "must be greater than 0",
        ));
    }
    if config.window_secs == 0 {
        errors.push(ValidationError::new(
            format!("{prefix}.window_secs"),
            "must be greater than 0",
        ));
    }
    if config.burst_size == Some(0) {
        errors.push(ValidationError::new(
            format!("{prefix}.burst_size"),
            "must be at least 1 when set",
        ));
    }
}

fn collect_cache_errors(prefix: &str, config: &CacheConfig, errors: &mut Vec<ValidationError>) {
    if config.enabled && config.max_size == 0 {
        errors.push(ValidationError::new(
            format!("{prefix}.max_size"),
            "must be at least 1 when caching is enabled",
        ));
    }
}

fn collect_retry_errors(prefix: &str, config: &RetryConfig, errors: &mut Vec<ValidationError>) {
    if config.max_retries == 0 {
        errors.push(ValidationError::new(
            format!("{prefix}.max_retries"),
            "must be at least 1 (it counts the first attempt)",
        ));
    }
    if config.initial_delay_ms > config.max_delay_ms {
        errors.push(ValidationError::new(
            format!("{prefix}.initial_delay_ms"),
            "must not exceed max_delay_ms",
        ));
    }
}
