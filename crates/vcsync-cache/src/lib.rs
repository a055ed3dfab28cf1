//! vcsync Cache - Sync-state cache and durable metadata stores
//!
//! Provides:
//! - [`SyncCache`]: in-memory sync records, ignore patterns and dirty state,
//!   instantiated once per partition (live and phantom)
//! - [`FileSyncStore`]: per-folder metadata files on disk
//! - [`MemorySyncStore`]: the same port backed by memory
//! - [`IgnoreMatcher`]: glob matching of ignore patterns
//!
//! ## Modules
//!
//! - [`cache`] - Partitioned in-memory cache
//! - [`ignore`] - Ignore-pattern parsing and matching
//! - [`memory`] - In-memory store
//! - [`store`] - File-backed store

pub mod cache;
pub mod ignore;
pub mod memory;
pub mod store;

pub use cache::{Partition, SyncCache};
pub use ignore::{IgnoreMatcher, DEFAULT_IGNORES};
pub use memory::MemorySyncStore;
pub use store::FileSyncStore;
