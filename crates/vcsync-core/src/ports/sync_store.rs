//! Durable sync-metadata store port (driven/secondary port)
//!
//! Sync metadata is persisted per folder: one record file listing every
//! managed child, one folder mapping record, and one ignore-pattern file.
//!
//! ## Design Notes
//!
//! - Uses a typed [`StoreError`] rather than `anyhow` because callers must
//!   tell a transiently locked workspace apart from a real failure.
//! - Records cross this boundary as raw entry-line bytes; decoding happens in
//!   the domain layer.
//! - Methods are synchronous: all access is serialized by the coordinator.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::{FolderSyncInfo, ResourcePath};

/// Errors raised by a sync store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The folder's metadata is being rewritten by another writer
    #[error("sync metadata for '{0}' is locked")]
    Locked(ResourcePath),

    /// The stored metadata could not be decoded
    #[error("malformed sync metadata in {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    /// Underlying I/O failure
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    #[must_use]
    pub fn is_locked(&self) -> bool {
        matches!(self, StoreError::Locked(_))
    }
}

/// Durable storage of per-folder sync metadata
pub trait ISyncStore: Send + Sync {
    /// Read every child record of `folder`; `None` if the folder has no
    /// metadata at all
    fn read_entries(&self, folder: &ResourcePath) -> Result<Option<Vec<Vec<u8>>>, StoreError>;

    /// Read a single child record, bypassing any whole-folder lock
    fn read_entry(&self, folder: &ResourcePath, name: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Replace every child record of `folder` in one write
    fn write_entries(&self, folder: &ResourcePath, entries: &[Vec<u8>]) -> Result<(), StoreError>;

    /// Read the folder's repository mapping
    fn read_folder_sync(&self, folder: &ResourcePath) -> Result<Option<FolderSyncInfo>, StoreError>;

    /// Persist the folder's repository mapping
    fn write_folder_sync(&self, folder: &ResourcePath, info: &FolderSyncInfo)
        -> Result<(), StoreError>;

    /// Remove all metadata owned by the folder
    fn delete_folder_sync(&self, folder: &ResourcePath) -> Result<(), StoreError>;

    /// Read the folder's ignore patterns
    fn read_ignores(&self, folder: &ResourcePath) -> Result<Option<Vec<String>>, StoreError>;

    /// Replace the folder's ignore patterns
    fn write_ignores(&self, folder: &ResourcePath, patterns: &[String]) -> Result<(), StoreError>;
}
