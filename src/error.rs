//! Error taxonomy shared by every service client.

use std::time::Duration;
use thiserror::Error;

/// A single failed item inside a batch helper.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    /// Position of the item in the submitted batch.
    pub index: usize,
    /// Classified error message for that item.
    pub message: String,
}

/// Errors surfaced by the request pipeline and the service wrappers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed input, detected locally or reported by the server (4xx).
    #[error("Validation error: {message}")]
    Validation { status: Option<u16>, message: String },

    /// Credentials rejected by the server (401/403).
    #[error("Authentication failed ({status}): {message}")]
    Authentication { status: u16, message: String },

    /// Local token bucket is empty and the exhaustion policy gave up.
    #[error("Rate limit exceeded for {service}")]
    RateLimitExceeded { service: String },

    /// Server answered 429.
    #[error("Rate limited by server (retry after {retry_after:?}): {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    /// Connection, DNS or body transfer failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Attempt exceeded its deadline.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Server answered 5xx.
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Anything else the service reported.
    #[error("Service error: {0}")]
    Service(String),

    /// Response body did not match the expected shape.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Wallet could not sign a payload.
    #[error("Signing error: {0}")]
    Signing(String),

    /// One or more items of a batch operation failed.
    #[error("Batch operation failed for {} item(s)", .failures.len())]
    Batch { failures: Vec<BatchFailure> },
}

impl ApiError {
    /// Convenience constructor for locally detected bad input.
    pub fn invalid(message: impl Into<String>) -> Self {
        ApiError::Validation {
            status: None,
            message: message.into(),
        }
    }

    /// HTTP status attached to the error, if the server produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Validation { status, .. } => *status,
            ApiError::Authentication { status, .. } | ApiError::Server { status, .. } => {
                Some(*status)
            }
            ApiError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    /// Whether the failure is transport-level (connection refused, timeout).
    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Network(_) | ApiError::Timeout(_))
    }

    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation { .. } => "validation",
            ApiError::Authentication { .. } => "authentication",
            ApiError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::Network(_) => "network",
            ApiError::Timeout(_) => "timeout",
            ApiError::Server { .. } => "server",
            ApiError::Service(_) => "service",
            ApiError::Decode(_) => "decode",
            ApiError::Signing(_) => "signing",
            ApiError::Batch { .. } => "batch",
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else if err.is_builder() {
            ApiError::invalid(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

/// Result type for client operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ApiError::Server {
            status: 503,
            message: "upstream down".to_string(),
        };
        assert_eq!(err.to_string(), "Server error 503: upstream down");

        let err = ApiError::RateLimitExceeded {
            service: "hellomoon".to_string(),
        };
        assert_eq!(err.to_string(), "Rate limit exceeded for hellomoon");

        let err = ApiError::Batch {
            failures: vec![
                BatchFailure { index: 0, message: "a".into() },
                BatchFailure { index: 2, message: "b".into() },
            ],
        };
        assert!(err.to_string().contains("2 item(s)"));
    }

    #[test]
    fn test_status_and_kind() {
        assert_eq!(ApiError::invalid("bad").status(), None);
        assert_eq!(
            ApiError::RateLimited { retry_after: None, message: String::new() }.status(),
            Some(429)
        );
        assert_eq!(
            ApiError::Authentication { status: 403, message: String::new() }.kind(),
            "authentication"
        );
        assert!(ApiError::Timeout(Duration::from_secs(1)).is_transport());
        assert!(!ApiError::Service("x".into()).is_transport());
    }
}
