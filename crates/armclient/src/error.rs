//! Error types for remote operations.
//!
//! Errors are categorized so the poller can tell a dropped connection it
//! may tolerate from a remote failure it must surface. Remote messages carry
//! the service's `code` and `message` only; request bodies never appear in
//! an error.

use crate::types::PollStatus;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// Result type alias for remote operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of remote errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network or IO failure (transient, tolerated by pollers).
    Transport,
    /// The addressed resource does not exist.
    NotFound,
    /// The service rejected the request.
    Remote,
    /// A long-running operation could not be tracked or ended badly.
    Operation,
    /// The caller cancelled or the deadline expired.
    Cancelled,
    /// The service answered with something unparseable.
    Format,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Transport => "Network connectivity issue",
            Self::NotFound => "Resource not found",
            Self::Remote => "Request rejected by the service",
            Self::Operation => "Long-running operation failed",
            Self::Cancelled => "Operation cancelled",
            Self::Format => "Invalid service response",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Transport => "Check your network connection and try again",
            Self::NotFound => "Verify the resource id, or import the resource if it was recreated",
            Self::Remote => "Check the error code and message returned by the service",
            Self::Operation => "Inspect the resource in the portal; it may be partially updated",
            Self::Cancelled => "Increase the operation timeout or re-run the command",
            Self::Format => "The service may have changed its API; check the api-version",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Why a context stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// `cancel()` was called on the token.
    Requested,
    /// The context deadline passed.
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => write!(f, "cancelled"),
            Self::DeadlineExceeded => write!(f, "timed out"),
        }
    }
}

/// Errors that can occur while talking to the resource manager.
#[derive(Debug, Error)]
pub enum Error {
    /// The request never produced a response.
    #[error("transport error: {message}")]
    Transport {
        /// Error message from the HTTP stack.
        message: String,
    },

    /// The service answered 404.
    #[error("not found: {url}")]
    NotFound {
        /// Path of the missing resource, without the endpoint.
        url: String,
    },

    /// The service answered with a 4xx/5xx other than 404.
    #[error("unexpected status {status} with error: {code}: {message}")]
    Remote {
        /// HTTP status code.
        status: u16,
        /// Service error code.
        code: String,
        /// Service error message.
        message: String,
    },

    /// A polling URL could not be determined or is not absolute.
    #[error("malformed poller: {reason}")]
    MalformedPoller {
        /// What was wrong.
        reason: String,
    },

    /// A long-running operation reached a terminal failure state.
    #[error("long-running operation {status}: {code}: {message}")]
    Operation {
        /// Terminal status (`Failed` or `Cancelled`).
        status: PollStatus,
        /// Service error code, if any.
        code: String,
        /// Service error message, if any.
        message: String,
    },

    /// The context was cancelled or its deadline passed.
    #[error("operation {reason}")]
    Cancelled {
        /// Why the context stopped.
        reason: CancelReason,
    },

    /// The response body could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl Error {
    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a remote error from a response status and body.
    pub fn remote(status: u16, body: &[u8]) -> Self {
        let failure = RemoteFailure::from_body(body);
        Self::Remote {
            status,
            code: failure.code,
            message: failure.message,
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Transport { .. } => ErrorCategory::Transport,
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::Remote { .. } => ErrorCategory::Remote,
            Error::MalformedPoller { .. } | Error::Operation { .. } => ErrorCategory::Operation,
            Error::Cancelled { .. } => ErrorCategory::Cancelled,
            Error::InvalidResponse(_) => ErrorCategory::Format,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Whether the service reported the resource as missing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        Self::Transport {
            message: err.to_string(),
        }
    }
}

/// The `code`/`message` pair of an ARM error envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RemoteFailure {
    /// Service error code.
    #[serde(default)]
    pub code: String,
    /// Service error message.
    #[serde(default)]
    pub message: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: RemoteFailure,
}

impl RemoteFailure {
    /// Extract the failure from an ARM error body.
    ///
    /// Accepts both `{"error": {...}}` and a bare `{"code", "message"}`
    /// object; anything else becomes an `Unknown` code carrying the raw body.
    pub fn from_body(body: &[u8]) -> Self {
        if let Ok(envelope) = serde_json::from_slice::<ErrorEnvelope>(body) {
            return envelope.error;
        }
        if let Ok(bare) = serde_json::from_slice::<RemoteFailure>(body)
            && !bare.code.is_empty()
        {
            return bare;
        }
        Self {
            code: "Unknown".to_string(),
            message: String::from_utf8_lossy(body).trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::Transport.is_retryable());
        assert!(!ErrorCategory::NotFound.is_retryable());
        assert!(!ErrorCategory::Remote.is_retryable());
        assert!(!ErrorCategory::Operation.is_retryable());
        assert!(!ErrorCategory::Cancelled.is_retryable());
    }

    #[test]
    fn test_remote_error_from_envelope() {
        let body = br#"{"error":{"code":"Conflict","message":"name already in use"}}"#;
        let err = Error::remote(409, body);
        assert_eq!(
            err.to_string(),
            "unexpected status 409 with error: Conflict: name already in use"
        );
        assert_eq!(err.category(), ErrorCategory::Remote);
    }

    #[test]
    fn test_remote_failure_from_bare_object() {
        let failure = RemoteFailure::from_body(br#"{"code":"BadRequest","message":"nope"}"#);
        assert_eq!(failure.code, "BadRequest");
        assert_eq!(failure.message, "nope");
    }

    #[test]
    fn test_remote_failure_from_text() {
        let failure = RemoteFailure::from_body(b"gateway timeout\n");
        assert_eq!(failure.code, "Unknown");
        assert_eq!(failure.message, "gateway timeout");
    }

    #[test]
    fn test_cancelled_messages() {
        let err = Error::Cancelled {
            reason: CancelReason::DeadlineExceeded,
        };
        assert_eq!(err.to_string(), "operation timed out");
        assert!(!Error::transport("reset").is_not_found());
        assert!(
            Error::NotFound {
                url: "/x".into()
            }
            .is_not_found()
        );
    }
}
