//! Working-copy port (driven/secondary port)
//!
//! Read-only view of the resources on disk. Creating, deleting and moving
//! resources is the caller's business; the engine is told about such changes
//! through the coordinator's lifecycle hooks.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because I/O errors are adapter-specific.
//! - Existence queries are infallible: an unreadable resource is treated as
//!   absent.

use chrono::{DateTime, Utc};

use crate::domain::{Resource, ResourceKind, ResourcePath};

/// Resources present in a working copy
pub trait IWorkingCopy: Send + Sync {
    /// Kind of the resource at `path`, `None` if it does not exist
    fn kind(&self, path: &ResourcePath) -> Option<ResourceKind>;

    /// Whether a resource exists at `path`
    fn exists(&self, path: &ResourcePath) -> bool {
        self.kind(path).is_some()
    }

    /// Existing children of `folder`, sorted by name
    ///
    /// Metadata directories are never reported as members.
    fn members(&self, folder: &ResourcePath) -> anyhow::Result<Vec<Resource>>;

    /// Modification time of a file, truncated to whole seconds
    fn modification_time(&self, file: &ResourcePath) -> anyhow::Result<Option<DateTime<Utc>>>;

    /// Whether `folder` is a linked passthrough that owns no metadata
    fn is_linked(&self, folder: &ResourcePath) -> bool;

    /// The existing resource at `path`, if any
    fn resource(&self, path: &ResourcePath) -> Option<Resource> {
        self.kind(path).map(|kind| Resource::new(path.clone(), kind))
    }
}
