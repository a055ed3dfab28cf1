//! Domain error types
//!
//! Errors raised while parsing or validating sync records, tags and
//! workspace-relative paths.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid workspace-relative path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// An entry line did not have the expected slot layout
    #[error("Malformed entry line: {0}")]
    MalformedEntryLine(String),

    /// An entry line without a resource name
    #[error("Entry line is missing a name: {0}")]
    MissingName(String),

    /// A file entry line without a revision
    #[error("Entry line is missing a revision: {0}")]
    MissingRevision(String),

    /// A tag specification that could not be parsed
    #[error("Invalid tag: {0}")]
    InvalidTag(String),

    /// A resource was expected to be of a different kind
    #[error("Expected a {expected} but found a {found}: {path}")]
    UnexpectedKind {
        /// The path of the offending resource
        path: String,
        /// The expected kind
        expected: String,
        /// The actual kind
        found: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
