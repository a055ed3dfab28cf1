//! vcsync Sync - Synchronization-state engine
//!
//! Provides:
//! - Transactional access to sync records with one commit per top-level
//!   operation
//! - Lazily recomputed dirty indicators with asymmetric propagation
//! - Remote tree construction from compare/status queries
//! - Reconciliation of remote trees against local records
//!
//! ## Modules
//!
//! - [`coordinator`] - Reentrant transaction facade over the sync cache
//! - [`dirty`] - Dirty-state tracking
//! - [`lifecycle`] - Hooks for deleted, recreated and moved resources
//! - [`delta`] - Per-parent delta map filled from compare responses
//! - [`remote`] - Remote tree model
//! - [`tree_builder`] - Remote tree construction
//! - [`reconcile`] - Classification and application of sync transitions
//! - [`workspace`] - Local filesystem working-copy adapter

pub mod coordinator;
pub mod delta;
pub mod dirty;
pub mod lifecycle;
pub mod reconcile;
pub mod remote;
pub mod tree_builder;
pub mod workspace;

pub use coordinator::SynchronizationCoordinator;
pub use dirty::DirtyStateTracker;
pub use reconcile::{ReconcileEntry, Reconciler};
pub use remote::{NodeId, RemoteFile, RemoteFolder, RemoteNode, RemoteTree, SubtreeFailure};
pub use tree_builder::{BuildOptions, RemoteTreeBuilder};
pub use workspace::LocalWorkingCopy;

use thiserror::Error;

use vcsync_core::domain::{DomainError, ResourcePath};
use vcsync_core::ports::{ConnectionError, StoreError};

/// Errors that can occur during synchronization-state operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// An expected record is missing from an already-loaded cache
    #[error("cache inconsistency: {0}")]
    CacheInconsistency(String),

    /// The server rejected a query
    #[error("protocol error for '{scope}': {message}")]
    Protocol { scope: String, message: String },

    /// A single folder's metadata could not be written
    #[error("failed to persist sync metadata of '{folder}': {source}")]
    PersistenceFailure {
        folder: ResourcePath,
        #[source]
        source: StoreError,
    },

    /// Several independent failures
    #[error("{} errors occurred: {}", .0.len(), join_errors(.0))]
    Aggregate(Vec<SyncError>),

    /// The operation required a managed folder
    #[error("'{0}' is not under version control")]
    NotVersioned(ResourcePath),

    /// Cooperative cancellation was observed
    #[error("operation cancelled")]
    Cancelled,

    /// A durable store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A transport error from the repository connection
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// A working-copy adapter error
    #[error("working copy error: {0}")]
    WorkingCopy(#[from] anyhow::Error),

    /// A domain-level error propagated from vcsync-core
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    /// A transition could not be computed
    #[error("conflict error: {0}")]
    Conflict(#[from] vcsync_conflict::ConflictError),
}

impl SyncError {
    /// Collapse a list of failures: `Ok` when empty, the error itself when
    /// alone, an aggregate otherwise
    pub fn from_failures(mut failures: Vec<SyncError>) -> Result<(), SyncError> {
        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(SyncError::Aggregate(failures)),
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}

fn join_errors(errors: &[SyncError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
