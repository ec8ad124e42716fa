//! Shared error definitions for workflow primitives.

use thiserror::Error;

/// Errors that can occur while manipulating primitive types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    /// The provided identifier string could not be parsed.
    #[error("invalid {kind} id `{value}`: {reason}")]
    Invalid {
        /// Entity prefix the identifier was parsed as.
        kind: &'static str,
        /// The offending identifier string.
        value: String,
        /// Human-readable reason for rejection.
        reason: String,
    },
}
