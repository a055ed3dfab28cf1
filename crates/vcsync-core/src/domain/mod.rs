//! Domain layer - sync record value types
//!
//! This module contains the synchronization metadata the engine tracks for
//! every resource in a working copy:
//! - [`ResourceSyncInfo`] - Per-file (or per managed subfolder) entry record
//! - [`FolderSyncInfo`] - Per-folder repository mapping
//! - [`EntryTag`] - Branch / version / date / head discriminator
//! - [`DirtyIndicator`] - Cached modification state
//! - [`ResourcePath`] and [`Resource`] - Workspace-relative addressing

pub mod dirty;
pub mod errors;
pub mod folder_sync;
pub mod keyword;
pub mod resource;
pub mod sync_info;
pub mod tag;

pub use dirty::{DirtyIndicator, UNKNOWN_DIRTY_COUNT};
pub use errors::DomainError;
pub use folder_sync::FolderSyncInfo;
pub use keyword::KeywordMode;
pub use resource::{Resource, ResourceKind, ResourcePath};
pub use sync_info::{EntryTimestamp, ResourceSyncInfo};
pub use tag::EntryTag;
