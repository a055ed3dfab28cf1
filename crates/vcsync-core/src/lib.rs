//! vcsync Core - Synchronization-state model for a version-control client
//!
//! This crate follows a hexagonal (ports and adapters) layout:
//!
//! - **domain**: Sync record value types ([`domain::ResourceSyncInfo`],
//!   [`domain::FolderSyncInfo`], [`domain::EntryTag`]) and their wire formats
//! - **ports**: Capability traits the engine consumes (durable store, working
//!   copy, repository connection) or exposes (change notifications)
//! - **config**: YAML configuration with validation and a builder
//!
//! The engine itself (cache, coordinator, dirty tracking, remote tree
//! building) lives in the `vcsync-cache` and `vcsync-sync` crates and only
//! depends on the abstractions defined here.

pub mod config;
pub mod domain;
pub mod ports;
