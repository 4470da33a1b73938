//! Error types for the reconciliation engine.
//!
//! [`Error`] is what a hook or an engine step fails with. [`HookError`] is
//! the user-visible wrapper: it names the hook and the resource id so that
//! every reported failure can be traced to one reconciliation.
//!
//! Messages never include attribute values. Validation failures name the
//! field path only, so sensitive values cannot leak through an error.

use crate::types::Hook;
use std::fmt;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of engine errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed id or polling URL.
    Parse,
    /// Schema or diff validation failed.
    Validation,
    /// The resource already exists remotely.
    Conflict,
    /// The resource does not exist remotely.
    NotFound,
    /// The service rejected a request or an operation failed.
    Remote,
    /// Network failure.
    Transport,
    /// Cancelled or timed out.
    Cancelled,
    /// A bug in a resource kind or the engine.
    Internal,
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
            Self::Parse => "Invalid identifier",
            Self::Validation => "Invalid configuration",
            Self::Conflict => "Resource already exists",
            Self::NotFound => "Resource not found",
            Self::Remote => "Remote operation failed",
            Self::Transport => "Network connectivity issue",
            Self::Cancelled => "Operation cancelled",
            Self::Internal => "Internal error",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Parse => "Check the resource id format for this resource type",
            Self::Validation => "Fix the configuration and plan again",
            Self::Conflict => "Import the existing resource into state before managing it",
            Self::NotFound => "Refresh state; the resource may have been deleted outside this tool",
            Self::Remote => "Check the error code and message returned by the service",
            Self::Transport => "Check your network connection and try again",
            Self::Cancelled => "Increase the timeout for this resource or re-run the command",
            Self::Internal => "Please report this issue",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// One schema or diff violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Dotted path of the offending field, e.g. `import.0.content_format`.
    pub field_path: String,
    /// What is wrong.
    pub reason: String,
}

impl Violation {
    /// Create a violation.
    pub fn new(field_path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field_path: field_path.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field_path.is_empty() {
            write!(f, "{}", self.reason)
        } else {
            write!(f, "{}: {}", self.field_path, self.reason)
        }
    }
}

fn join(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised by the engine and by resource hooks.
#[derive(Debug, Error)]
pub enum Error {
    /// A resource id did not match its pattern.
    #[error(transparent)]
    Parse(#[from] resourceid::ParseError),

    /// The configuration violates the schema.
    #[error("invalid configuration: {}", join(.0))]
    Validation(Vec<Violation>),

    /// A cross-field rule of the proposed diff failed.
    #[error("{0}")]
    DiffValidation(Violation),

    /// The requires-import check found the resource.
    #[error(
        "a resource with the ID {id:?} already exists - to be managed via this tool it needs to be imported into the state"
    )]
    AlreadyExists {
        /// Id of the existing resource.
        id: String,
    },

    /// A remote call, poll or wait failed.
    #[error(transparent)]
    Remote(#[from] armclient::Error),

    /// A model could not be converted.
    #[error("decoding {what}: {message}")]
    Decode {
        /// What was being decoded.
        what: String,
        /// Decoder message.
        message: String,
    },

    /// A thread tried to acquire a named lock it already holds.
    #[error("named lock {name:?} ({kind}) is already held by this thread")]
    LockReentry {
        /// Lock name.
        name: String,
        /// Lock kind.
        kind: String,
    },

    /// The engine tried an illegal lifecycle transition.
    #[error("invalid lifecycle transition from {from} to {to}")]
    InvalidTransition {
        /// Current state.
        from: String,
        /// Requested state.
        to: String,
    },

    /// A resource vanished right after it was written.
    #[error("resource {id} was not found after it was written")]
    GoneAfterWrite {
        /// Id of the resource.
        id: String,
    },

    /// The requested object cannot be imported because it does not exist.
    #[error("cannot import non-existent remote object {id}")]
    ImportNotFound {
        /// Id that was imported.
        id: String,
    },

    /// A resource kind or schema definition is wrong.
    #[error("invalid definition of {kind}: {reason}")]
    Definition {
        /// Resource type name.
        kind: String,
        /// What is wrong.
        reason: String,
    },
}

impl Error {
    /// Schema violation for a single field.
    pub fn validation(field_path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation(vec![Violation::new(field_path, reason)])
    }

    /// Diff violation for a single field.
    pub fn diff(field_path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DiffValidation(Violation::new(field_path, reason))
    }

    /// Decoding failure.
    pub fn decode(what: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Decode {
            what: what.into(),
            message: message.to_string(),
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        use armclient::ErrorCategory as Remote;

        match self {
            Error::Parse(_) => ErrorCategory::Parse,
            Error::Validation(_) | Error::DiffValidation(_) => ErrorCategory::Validation,
            Error::AlreadyExists { .. } => ErrorCategory::Conflict,
            Error::ImportNotFound { .. } => ErrorCategory::NotFound,
            Error::Remote(err) => match err.category() {
                Remote::Transport => ErrorCategory::Transport,
                Remote::NotFound => ErrorCategory::NotFound,
                Remote::Cancelled => ErrorCategory::Cancelled,
                Remote::Remote | Remote::Operation | Remote::Format => ErrorCategory::Remote,
            },
            Error::GoneAfterWrite { .. } => ErrorCategory::Remote,
            Error::Decode { .. }
            | Error::LockReentry { .. }
            | Error::InvalidTransition { .. }
            | Error::Definition { .. } => ErrorCategory::Internal,
        }
    }

    /// Whether a remote call reported the resource as missing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Remote(err) if err.is_not_found())
    }

    /// Whether the failure came from cancellation or a deadline.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.category() == ErrorCategory::Cancelled
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::decode("model", err)
    }
}

/// A failure attributed to one hook of one resource.
#[derive(Debug, Error)]
#[error("{hook} {id}: {source}")]
pub struct HookError {
    /// Hook that failed.
    pub hook: Hook,
    /// Fully qualified id of the resource, or its address before it has one.
    pub id: String,
    /// Underlying error.
    pub source: Error,
}

impl HookError {
    /// Wrap an error.
    pub fn new(hook: Hook, id: impl Into<String>, source: Error) -> Self {
        Self {
            hook,
            id: id.into(),
            source,
        }
    }

    /// Category of the underlying error.
    pub fn category(&self) -> ErrorCategory {
        self.source.category()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_error_names_hook_and_id() {
        let err = HookError::new(
            Hook::Create,
            "/subscriptions/s1/resourceGroups/rg",
            Error::AlreadyExists {
                id: "/subscriptions/s1/resourceGroups/rg".into(),
            },
        );
        let message = err.to_string();
        assert!(message.starts_with("create /subscriptions/s1/resourceGroups/rg: "));
        assert!(message.contains("needs to be imported"));
        assert_eq!(err.category(), ErrorCategory::Conflict);
    }

    #[test]
    fn test_validation_joins_violations() {
        let err = Error::Validation(vec![
            Violation::new("name", "is required"),
            Violation::new("import.0.content_value", "is required"),
        ]);
        assert_eq!(
            err.to_string(),
            "invalid configuration: name: is required; import.0.content_value: is required"
        );
    }

    #[test]
    fn test_diff_violation_without_path() {
        let err = Error::diff("", "display_name is required");
        assert_eq!(err.to_string(), "display_name is required");
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn test_remote_categories() {
        let not_found = Error::from(armclient::Error::NotFound { url: "/x".into() });
        assert!(not_found.is_not_found());
        assert_eq!(not_found.category(), ErrorCategory::NotFound);

        let transport = Error::from(armclient::Error::transport("reset"));
        assert!(transport.category().is_retryable());

        let cancelled = Error::from(armclient::Error::Cancelled {
            reason: armclient::CancelReason::DeadlineExceeded,
        });
        assert!(cancelled.is_cancelled());
    }
}
