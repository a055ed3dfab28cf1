//! Dirty-state tracking
//!
//! Every live resource may carry a cached [`DirtyIndicator`]; folders also
//! cache the number of dirty children. Indicators are computed lazily and
//! propagate upward asymmetrically:
//!
//! - **Dirty** marks every ancestor dirty, since one dirty descendant is
//!   enough
//! - **Clean** or **NeedsRecompute** marks ancestors NeedsRecompute, since
//!   a sibling may still be dirty
//!
//! Propagation stops at the first ancestor that already holds the value it
//! would receive. A folder whose cached count is known answers without
//! looking at its children; otherwise it scans them once and caches the
//! result.

use tracing::trace;

use vcsync_core::domain::{
    DirtyIndicator, EntryTimestamp, Resource, ResourceKind, ResourcePath, ResourceSyncInfo,
    UNKNOWN_DIRTY_COUNT,
};

use crate::coordinator::SynchronizationCoordinator;
use crate::SyncError;

/// Counters for dirty-state computation
#[derive(Debug, Default, Clone)]
pub struct DirtyStateTracker {
    scans: u64,
}

impl DirtyStateTracker {
    /// Number of folder child scans performed so far
    #[must_use]
    pub fn scans(&self) -> u64 {
        self.scans
    }

    fn record_scan(&mut self) {
        self.scans += 1;
    }
}

impl SynchronizationCoordinator {
    /// Resolved indicator of `resource`, computing it if needed
    ///
    /// Never returns [`DirtyIndicator::NeedsRecompute`].
    pub fn dirty_indicator(&mut self, resource: &Resource) -> Result<DirtyIndicator, SyncError> {
        self.run(|c| c.resolve_dirty(resource))
    }

    /// Cached indicator of `path` without computing anything
    #[must_use]
    pub fn peek_dirty_indicator(&self, path: &ResourcePath) -> DirtyIndicator {
        self.live
            .dirty_indicator(path)
            .unwrap_or(DirtyIndicator::NeedsRecompute)
    }

    /// Force the indicator of `resource` and propagate it upward
    pub fn set_dirty(&mut self, resource: &Resource, indicator: DirtyIndicator) -> Result<(), SyncError> {
        self.run(|c| {
            c.adjust_dirty_recursively(resource.path(), indicator);
            Ok(())
        })
    }

    /// Whether `resource` has local modifications
    pub fn is_modified(&mut self, resource: &Resource) -> Result<bool, SyncError> {
        Ok(self.dirty_indicator(resource)? == DirtyIndicator::Dirty)
    }

    /// Mark a folder modified or clean
    ///
    /// A folder is only marked clean when none of its children is dirty.
    /// Returns whether the indicator was applied.
    pub fn set_folder_modified(&mut self, folder: &ResourcePath, modified: bool) -> Result<bool, SyncError> {
        self.run(|c| {
            if modified {
                c.adjust_dirty_recursively(folder, DirtyIndicator::Dirty);
                return Ok(true);
            }
            for child in c.collect_members(folder)? {
                if c.is_ignored_unmanaged(&child)? {
                    continue;
                }
                if c.resolve_dirty(&child)? == DirtyIndicator::Dirty {
                    trace!(path = %folder, child = %child.path(), "refusing to mark folder clean");
                    return Ok(false);
                }
            }
            c.live.set_dirty_child_count(folder, 0);
            c.adjust_dirty_recursively(folder, DirtyIndicator::Clean);
            Ok(true)
        })
    }

    /// Number of folder child scans performed so far
    #[must_use]
    pub fn dirty_scans(&self) -> u64 {
        self.tracker.scans()
    }

    // ------------------------------------------------------------------------
    // Propagation
    // ------------------------------------------------------------------------

    /// Set `indicator` on `path` and walk up the ancestors
    pub(crate) fn adjust_dirty_recursively(&mut self, path: &ResourcePath, indicator: DirtyIndicator) {
        let mut current = path.clone();
        let mut indicator = indicator;
        loop {
            if self.live.caches_dirty_state() && self.working_copy_has(&current) {
                let previous = self.live.dirty_indicator(&current);
                if previous == Some(indicator) {
                    break;
                }
                self.live.set_dirty_indicator(&current, indicator);
                if indicator == DirtyIndicator::NeedsRecompute {
                    self.live.set_dirty_child_count(&current, UNKNOWN_DIRTY_COUNT);
                }
                if indicator == DirtyIndicator::Dirty && previous != Some(DirtyIndicator::Dirty) {
                    if let Some(parent) = current.parent() {
                        let count = self.live.dirty_child_count(&parent);
                        if count != UNKNOWN_DIRTY_COUNT {
                            self.live.set_dirty_child_count(&parent, count + 1);
                        }
                    }
                }
            }
            let Some(parent) = current.parent() else {
                break;
            };
            current = parent;
            indicator = indicator.for_ancestors();
        }
    }

    /// Forget dirty state of changed resources and recompute their parents
    pub(crate) fn invalidate_dirty_state<'a>(&mut self, resources: impl IntoIterator<Item = &'a Resource>) {
        for resource in resources {
            let path = resource.path();
            self.live.flush_dirty(path);
            if let Some(parent) = path.parent() {
                self.adjust_dirty_recursively(&parent, DirtyIndicator::NeedsRecompute);
            }
        }
    }

    fn working_copy_has(&self, path: &ResourcePath) -> bool {
        path.is_root() || self.working_copy.exists(path)
    }

    // ------------------------------------------------------------------------
    // Computation
    // ------------------------------------------------------------------------

    pub(crate) fn resolve_dirty(&mut self, resource: &Resource) -> Result<DirtyIndicator, SyncError> {
        let path = resource.path();
        if let Some(cached) = self.live.dirty_indicator(path) {
            if cached.is_resolved() && self.working_copy_has(path) {
                return Ok(cached);
            }
        }
        let modified = match resource.kind() {
            ResourceKind::File => self.compute_file_modified(path)?,
            ResourceKind::Folder => self.compute_folder_modified(path)?,
        };
        let indicator = DirtyIndicator::from_modified(modified);
        self.adjust_dirty_recursively(path, indicator);
        Ok(indicator)
    }

    pub(crate) fn is_ignored_unmanaged(&mut self, resource: &Resource) -> Result<bool, SyncError> {
        if self.load_sync_bytes(resource.path())?.is_some() {
            return Ok(false);
        }
        self.check_ignored(resource.path())
    }

    fn compute_file_modified(&mut self, path: &ResourcePath) -> Result<bool, SyncError> {
        let exists = self.working_copy.kind(path) == Some(ResourceKind::File);
        let Some(bytes) = self.load_sync_bytes(path)? else {
            return Ok(exists && !self.check_ignored(path)?);
        };
        let info = ResourceSyncInfo::from_bytes(&bytes)?;
        if info.is_directory() || !exists || info.is_deleted() || info.is_added() {
            return Ok(true);
        }
        let recorded = match info.timestamp() {
            EntryTimestamp::At(ts) => *ts,
            EntryTimestamp::DeletedAndRestored(Some(ts)) => *ts,
            _ => return Ok(true),
        };
        let actual = self.working_copy.modification_time(path)?;
        Ok(actual != Some(recorded))
    }

    fn compute_folder_modified(&mut self, path: &ResourcePath) -> Result<bool, SyncError> {
        let exists = self.working_copy.kind(path) == Some(ResourceKind::Folder);
        if !exists && !self.phantom.contains(path) {
            return Ok(false);
        }
        let managed = self.load_folder_sync(path)?.is_some();
        if !managed {
            return Ok(!self.check_ignored(path)?);
        }

        if exists {
            let count = self.live.dirty_child_count(path);
            if count != UNKNOWN_DIRTY_COUNT {
                return Ok(count > 0);
            }
        }

        self.tracker.record_scan();
        trace!(path = %path, "scanning children for dirty state");
        let mut dirty = 0;
        for child in self.collect_members(path)? {
            if self.is_ignored_unmanaged(&child)? {
                continue;
            }
            if self.resolve_dirty(&child)? == DirtyIndicator::Dirty {
                dirty += 1;
            }
        }
        if exists {
            self.live.set_dirty_child_count(path, dirty);
        }
        Ok(dirty > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_counts_scans() {
        let mut tracker = DirtyStateTracker::default();
        assert_eq!(tracker.scans(), 0);
        tracker.record_scan();
        tracker.record_scan();
        assert_eq!(tracker.scans(), 2);
    }
}
