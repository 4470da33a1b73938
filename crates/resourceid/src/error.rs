//! Error types for resource id parsing and construction.

use thiserror::Error;

/// Result type for id operations.
pub type Result<T> = std::result::Result<T, ParseError>;

/// Errors raised while parsing or building a resource id.
///
/// Every variant names the id kind so the message stands on its own when
/// surfaced to a user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The input does not start with `/`.
    #[error("parsing {kind} ID {input:?}: an ID must start with `/`")]
    NotAbsolute {
        /// Kind of id being parsed
        kind: String,
        /// Raw input
        input: String,
    },

    /// The input ends before a required segment.
    #[error("parsing {kind} ID {input:?}: missing segment `{segment}`")]
    MissingSegment {
        /// Kind of id being parsed
        kind: String,
        /// Raw input
        input: String,
        /// Description of the first missing segment
        segment: String,
    },

    /// A segment is present that the pattern does not allow.
    #[error("parsing {kind} ID {input:?}: unexpected segment `{found}`{}", expected_suffix(.expected.as_deref()))]
    UnexpectedSegment {
        /// Kind of id being parsed
        kind: String,
        /// Raw input
        input: String,
        /// The literal the pattern wanted at this position, if any
        expected: Option<String>,
        /// The segment actually found
        found: String,
    },

    /// A value segment is empty or contains a `/`.
    #[error("{kind} ID value for `{segment}` is invalid: {value:?}")]
    InvalidValue {
        /// Kind of id being built
        kind: String,
        /// Name of the offending segment
        segment: String,
        /// The rejected value
        value: String,
    },

    /// Wrong number of values passed to a constructor.
    #[error("{kind} ID expects {expected} values, got {found}")]
    ValueCount {
        /// Kind of id being built
        kind: String,
        /// Number of value segments in the pattern
        expected: usize,
        /// Number of values supplied
        found: usize,
    },

    /// A child was derived from an id of the wrong kind.
    #[error("{child} IDs cannot be derived from a {parent} ID")]
    ParentMismatch {
        /// Pattern of the requested child
        child: String,
        /// Pattern of the id used as parent
        parent: String,
    },
}

fn expected_suffix(expected: Option<&str>) -> String {
    expected
        .map(|e| format!(" (expected `{e}`)"))
        .unwrap_or_default()
}
