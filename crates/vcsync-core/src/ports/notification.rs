//! Change-notification port (exposed capability)
//!
//! The coordinator emits exactly one `resources_changed` call per committed
//! transaction. Consumers (decorators, views) live outside the engine.

use crate::domain::Resource;

/// Sink for committed sync-state changes
pub trait IChangeListener: Send + Sync {
    /// Called once per commit with the union of changed resources and folders
    fn resources_changed(&self, resources: &[Resource]);
}
