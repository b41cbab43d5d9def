//! Error classification at the external-call boundary.
//!
//! Boundary errors carry an explicit HTTP status or rate-limit variant and
//! are classified once, here, instead of by inspecting error text.

use std::time::Duration;
use thiserror::Error;

/// How a failed external call should be treated by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The backend is throttling request volume (HTTP 429).
    RateLimited,

    /// The backend is temporarily unavailable (HTTP 503).
    ServiceUnavailable,

    /// Anything else. Never retried.
    NonRetryable,
}

impl ErrorClass {
    /// Classify an HTTP status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => ErrorClass::RateLimited,
            503 => ErrorClass::ServiceUnavailable,
            _ => ErrorClass::NonRetryable,
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorClass::NonRetryable)
    }
}

/// Implemented by every error type an external call can fail with.
pub trait Classify {
    fn classify(&self) -> ErrorClass;

    /// Minimum wait the backend asked for before the next attempt.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// The only errors the executor ever hands back to callers.
///
/// Display renders the user-facing message; `detail` keeps the underlying
/// boundary error for logs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("The service is experiencing high demand. Please wait a moment before trying again. (Rate Limit Exceeded)")]
    RateLimitExceeded { detail: String },

    #[error("The AI model is currently overloaded. Please try again in a few moments. (Service Unavailable)")]
    TransientBackendOverload { detail: String },

    #[error("An unexpected error occurred while generating AI content. Please try again.")]
    UnexpectedFailure { detail: String },
}

impl CallError {
    /// Translate the last classified failure into a caller-facing error.
    pub fn from_class(class: ErrorClass, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        match class {
            ErrorClass::RateLimited => CallError::RateLimitExceeded { detail },
            ErrorClass::ServiceUnavailable => CallError::TransientBackendOverload { detail },
            ErrorClass::NonRetryable => CallError::UnexpectedFailure { detail },
        }
    }

    /// The underlying boundary error, for logs.
    pub fn detail(&self) -> &str {
        match self {
            CallError::RateLimitExceeded { detail }
            | CallError::TransientBackendOverload { detail }
            | CallError::UnexpectedFailure { detail } => detail,
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, CallError::RateLimitExceeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(ErrorClass::from_status(429), ErrorClass::RateLimited);
        assert_eq!(ErrorClass::from_status(503), ErrorClass::ServiceUnavailable);
        assert_eq!(ErrorClass::from_status(500), ErrorClass::NonRetryable);
        assert_eq!(ErrorClass::from_status(400), ErrorClass::NonRetryable);
        assert!(ErrorClass::RateLimited.is_retryable());
        assert!(!ErrorClass::NonRetryable.is_retryable());
    }

    #[test]
    fn test_call_error_messages() {
        let err = CallError::from_class(ErrorClass::RateLimited, "429 Too Many Requests");
        assert!(err.to_string().contains("(Rate Limit Exceeded)"));
        assert_eq!(err.detail(), "429 Too Many Requests");
        assert!(err.is_rate_limit());

        let err = CallError::from_class(ErrorClass::ServiceUnavailable, "503");
        assert!(err.to_string().contains("(Service Unavailable)"));

        let err = CallError::from_class(ErrorClass::NonRetryable, "bad schema");
        assert!(err.to_string().starts_with("An unexpected error occurred"));
        assert!(!err.to_string().contains("bad schema"));
    }
}
