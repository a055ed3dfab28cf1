//! Repository connection port (driven/secondary port)
//!
//! Two queries are consumed from the wire layer:
//!
//! - **compare**: a dry-run update that reports, per path, how the working
//!   copy differs from the repository at a tag or date, without transferring
//!   content
//! - **status**: the current repository revision of a list of files
//!
//! ## Design Notes
//!
//! - Methods take `&mut self`: a session is stateful and is never shared
//!   between concurrent callers. Independent builders use independent
//!   connections.
//! - Server-side rejections are part of a completed exchange and are
//!   reported through [`ResponseStatus`] together with any events received
//!   before the failure. [`ConnectionError`] is reserved for transport
//!   failures.
//! - Paths are `/`-separated and relative to the root folder of the tree
//!   being built (the empty string or `.` is that root).
//! - Timeouts belong to the implementation.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::EntryTag;

// ============================================================================
// Compare query
// ============================================================================

/// Option carried by a compare query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompareOption {
    /// Compare against a tag or date
    Tag(EntryTag),
    /// Compare against the head, dropping sticky tags
    ClearSticky,
    /// Report directories that are absent locally
    RetrieveAbsentDirectories,
}

/// A dry-run comparison request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareRequest {
    /// Folder the query is scoped to
    pub scope: String,
    pub options: Vec<CompareOption>,
    /// Always set by the engine: nothing may change on disk
    pub do_not_change: bool,
}

impl CompareRequest {
    #[must_use]
    pub fn new(scope: impl Into<String>, options: Vec<CompareOption>) -> Self {
        Self {
            scope: scope.into(),
            options,
            do_not_change: true,
        }
    }

    /// The tag option, if any
    #[must_use]
    pub fn tag(&self) -> Option<&EntryTag> {
        self.options.iter().find_map(|o| match o {
            CompareOption::Tag(tag) => Some(tag),
            _ => None,
        })
    }
}

/// Server classification of a file in a compare response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileClassification {
    /// Present locally and unknown to the repository
    LocallyAdded,
    /// Changed in the repository, unmodified locally
    RemoteChanged,
    /// Changed on both sides
    Conflict,
    /// Deleted locally, still present in the repository
    LocallyDeleted,
    /// No longer present in the repository
    RemotelyDeleted,
}

/// One event of a compare response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompareEvent {
    /// A directory exists remotely but not locally
    NewDirectory(String),
    /// A directory exists locally but not remotely
    DirectoryMissing(String),
    /// A file differs
    File {
        path: String,
        classification: FileClassification,
    },
}

/// Outcome of a completed exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseStatus {
    Ok,
    /// The requested tag does not exist for the queried scope
    NoSuchTag(String),
    /// Any other server-side rejection
    ServerError(String),
}

impl ResponseStatus {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, ResponseStatus::Ok)
    }
}

/// Events of a compare query, in server order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareResponse {
    pub events: Vec<CompareEvent>,
    pub status: ResponseStatus,
}

impl CompareResponse {
    #[must_use]
    pub fn ok(events: Vec<CompareEvent>) -> Self {
        Self {
            events,
            status: ResponseStatus::Ok,
        }
    }
}

// ============================================================================
// Status query
// ============================================================================

/// Revisions reported by a status query, in server order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    /// `(path, revision)` pairs
    pub revisions: Vec<(String, String)>,
    pub status: ResponseStatus,
}

impl StatusResponse {
    #[must_use]
    pub fn ok(revisions: Vec<(String, String)>) -> Self {
        Self {
            revisions,
            status: ResponseStatus::Ok,
        }
    }
}

// ============================================================================
// Connection
// ============================================================================

/// Transport-level failures
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(#[from] anyhow::Error),
}

/// A stateful session with the repository
#[async_trait]
pub trait IRepositoryConnection: Send {
    /// Run a dry-run comparison
    async fn compare(&mut self, request: &CompareRequest)
        -> Result<CompareResponse, ConnectionError>;

    /// Fetch the current revision of each listed file
    async fn status(
        &mut self,
        paths: &[String],
        tag: Option<&EntryTag>,
    ) -> Result<StatusResponse, ConnectionError>;
}
