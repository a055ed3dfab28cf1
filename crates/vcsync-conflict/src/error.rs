//! Error types for sync classification

use thiserror::Error;

use vcsync_core::domain::DomainError;

/// Errors that can occur while computing sync transitions
#[derive(Debug, Error)]
pub enum ConflictError {
    /// Invalid glob pattern in a keyword rule
    #[error("invalid glob pattern: {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// The remote revision of a file was never fetched
    #[error("remote revision of {0} is unknown")]
    UnresolvedRevision(String),

    /// The classification does not apply to the given states
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// A record could not be built
    #[error(transparent)]
    Domain(#[from] DomainError),
}
