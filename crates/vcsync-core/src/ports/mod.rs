//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! engine. The engine depends on them; implementations live in adapter
//! crates or outside the workspace.
//!
//! ## Ports Overview
//!
//! - [`ISyncStore`] - Durable per-folder sync metadata
//! - [`IWorkingCopy`] - Resources present on disk
//! - [`IRepositoryConnection`] - Compare and status queries against the repository
//! - [`IChangeListener`] - Sink for committed sync-state changes

pub mod connection;
pub mod notification;
pub mod sync_store;
pub mod working_copy;

pub use connection::{
    CompareEvent, CompareOption, CompareRequest, CompareResponse, ConnectionError,
    FileClassification, IRepositoryConnection, ResponseStatus, StatusResponse,
};
pub use notification::IChangeListener;
pub use sync_store::{ISyncStore, StoreError};
pub use working_copy::IWorkingCopy;
