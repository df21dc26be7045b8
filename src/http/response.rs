//! Translation of HTTP outcomes into the error taxonomy.

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

use crate::error::{ApiError, ApiResult};

/// Classify a completed response.
///
/// 2xx bodies are parsed as JSON; an empty body is `null` and a non-JSON body
/// is returned as a JSON string.
pub fn classify(status: StatusCode, headers: &HeaderMap, body: &str) -> ApiResult<Value> {
    if status.is_success() {
        return Ok(parse_body(body));
    }

    let code = status.as_u16();
    let message = error_message(status, body);

    let error = match code {
        401 | 403 => ApiError::Authentication { status: code, message },
        429 => ApiError::RateLimited {
            retry_after: parse_retry_after(headers),
            message,
        },
        500..=599 => ApiError::Server { status: code, message },
        400..=499 => ApiError::Validation {
            status: Some(code),
            message,
        },
        _ => ApiError::Service(format!("unexpected status {code}: {message}")),
    };
    Err(error)
}

fn parse_body(body: &str) -> Value {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(body.to_string()))
}

/// The raw server body, or the canonical reason when the body is empty.
fn error_message(status: StatusCode, body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status.canonical_reason().unwrap_or("no response body").to_string()
    } else {
        trimmed.to_string()
    }
}

/// Delay-seconds form of `Retry-After`. HTTP-date values are ignored.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
