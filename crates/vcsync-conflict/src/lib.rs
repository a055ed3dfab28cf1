//! vcsync Conflict - Sync classification and record transitions
//!
//! Provides:
//! - Classification of a (local, base, remote) triple into a sync direction
//! - The sync record transition implied by each classification
//! - Glob-based keyword mode rules for newly added files

pub mod error;
pub mod policy;
pub mod resolver;

pub use error::ConflictError;
pub use policy::KeywordPolicy;
pub use resolver::{
    ChangeKind, ConflictResolver, LocalState, RemoteState, SyncClassification, SyncDirection,
    SyncTransition,
};
