//! Resource lifecycle hooks
//!
//! The working copy changes underneath the coordinator: files are deleted,
//! recreated and moved, ignore files are edited and metadata is rewritten by
//! other tools. Callers report these events here so that records move
//! between the live and phantom partitions and stale cache entries are
//! dropped.
//!
//! Deleting a managed resource is a two-step protocol:
//!
//! 1. [`SynchronizationCoordinator::prepare_for_deletion`] before the
//!    resource is removed from disk
//! 2. [`SynchronizationCoordinator::handle_deleted`] once it is gone
//!
//! Recreating a resource restores its record from the phantom partition.

use tracing::{debug, info};

use vcsync_core::domain::{sync_info, DirtyIndicator, Resource, ResourceKind, ResourcePath, ResourceSyncInfo};

use crate::coordinator::{entry_kind, SynchronizationCoordinator};
use crate::SyncError;

impl SynchronizationCoordinator {
    // ------------------------------------------------------------------------
    // Deletion and recreation
    // ------------------------------------------------------------------------

    /// Move the sync history of `resource` to the phantom partition before
    /// it is deleted from disk
    ///
    /// Files scheduled for addition simply lose their record. Other files
    /// are recorded as outgoing deletions. Folders keep their mapping and the
    /// history of their whole subtree.
    pub fn prepare_for_deletion(&mut self, resource: &Resource) -> Result<(), SyncError> {
        self.run(|c| {
            match resource {
                Resource::File(_) => c.move_record_to_phantom(resource)?,
                Resource::Folder(folder) => {
                    c.move_folder_to_phantom(folder)?;
                    c.move_record_to_phantom(resource)?;
                    c.live.purge(folder, true);
                }
            }
            c.live.flush_dirty_deep(resource.path());
            if let Some(parent) = resource.path().parent() {
                c.adjust_dirty_recursively(&parent, DirtyIndicator::NeedsRecompute);
            }
            debug!(resource = %resource, "prepared for deletion");
            Ok(())
        })
    }

    fn move_record_to_phantom(&mut self, resource: &Resource) -> Result<(), SyncError> {
        let path = resource.path();
        let Some(bytes) = self.load_sync_bytes(path)? else {
            return Ok(());
        };
        self.live.set_sync_bytes(path, None);
        let kept = if sync_info::is_folder_entry(&bytes) {
            Some(bytes)
        } else {
            let info = ResourceSyncInfo::from_bytes(&bytes)?;
            (!info.is_added()).then(|| info.to_deletion().to_bytes())
        };
        if let Some(kept) = kept {
            self.phantom.set_sync_bytes(path, Some(kept));
        }
        self.resource_changed(resource.clone());
        Ok(())
    }

    fn move_folder_to_phantom(&mut self, folder: &ResourcePath) -> Result<(), SyncError> {
        let Some(info) = self.load_folder_sync(folder)? else {
            return Ok(());
        };
        self.ensure_children_cached(folder)?;
        self.phantom.set_folder_sync(folder, Some(info));
        for child in self.collect_members(folder)? {
            if let Resource::Folder(sub) = &child {
                self.move_folder_to_phantom(sub)?;
            }
            self.move_record_to_phantom(&child)?;
        }
        self.phantom.mark_children_loaded(folder);
        Ok(())
    }

    /// `resource` was removed from disk
    pub fn handle_deleted(&mut self, resource: &Resource) -> Result<(), SyncError> {
        self.run(|c| {
            let path = resource.path();
            if let Some(bytes) = c.live.sync_bytes(path).map(<[u8]>::to_vec) {
                c.live.set_sync_bytes(path, None);
                c.phantom.set_sync_bytes(path, Some(bytes));
            }
            if resource.is_folder() {
                if let Some(info) = c.live.folder_sync(path).cloned() {
                    c.phantom.set_folder_sync(path, Some(info));
                }
                c.live.purge(path, true);
            }
            c.live.flush_dirty_deep(path);
            if let Some(parent) = path.parent() {
                c.adjust_dirty_recursively(&parent, DirtyIndicator::NeedsRecompute);
            }
            c.notify_changed(resource.clone());
            Ok(())
        })
    }

    /// `resource` appeared on disk
    pub fn handle_added(&mut self, resource: &Resource) -> Result<(), SyncError> {
        self.resources_recreated(std::slice::from_ref(resource))
    }

    /// Restore the records of recreated resources from the phantom partition
    ///
    /// A file recorded as an outgoing deletion gets its revision back.
    pub fn resources_recreated(&mut self, resources: &[Resource]) -> Result<(), SyncError> {
        self.run(|c| {
            for resource in resources {
                c.restore_from_phantom(resource)?;
            }
            Ok(())
        })
    }

    fn restore_from_phantom(&mut self, resource: &Resource) -> Result<(), SyncError> {
        let path = resource.path();
        if !self.working_copy.exists(path) {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            self.ensure_children_cached(&parent)?;
        }

        if let Some(bytes) = self.phantom.sync_bytes(path).map(<[u8]>::to_vec) {
            self.phantom.set_sync_bytes(path, None);
            let restored = if sync_info::is_folder_entry(&bytes) {
                bytes
            } else {
                ResourceSyncInfo::from_bytes(&bytes)?.from_deletion().to_bytes()
            };
            self.live.set_sync_bytes(path, Some(restored));
            self.resource_changed(resource.clone());
        }

        if let Resource::Folder(folder) = resource {
            if let Some(info) = self.phantom.folder_sync(folder).cloned() {
                self.phantom.forget_folder_sync(folder);
                self.live.set_folder_sync(folder, Some(info));
                self.live.mark_children_loaded(folder);
                self.folder_changed(folder);
                // phantom children are written with the recreated folder
                for child in self.phantom.members(folder) {
                    self.resource_changed(child);
                }
            }
        }

        self.live.flush_dirty(path);
        self.adjust_dirty_recursively(path, DirtyIndicator::NeedsRecompute);
        Ok(())
    }

    /// `source` was moved to `destination`
    ///
    /// A moved folder carries its metadata along; its cached state is
    /// dropped and reloaded from the new location on next access.
    pub fn post_move(&mut self, source: &Resource, destination: &Resource) -> Result<(), SyncError> {
        self.run(|c| {
            for resource in [source, destination] {
                let path = resource.path();
                if resource.is_folder() {
                    c.live.purge(path, true);
                }
                c.live.flush_dirty_deep(path);
                if let Some(parent) = path.parent() {
                    c.adjust_dirty_recursively(&parent, DirtyIndicator::NeedsRecompute);
                }
                c.notify_changed(resource.clone());
            }
            Ok(())
        })
    }

    // ------------------------------------------------------------------------
    // Cache management
    // ------------------------------------------------------------------------

    /// Drop cached live state of `root`, and with `deep` of its subtree
    pub fn flush(&mut self, root: &ResourcePath, deep: bool) -> Result<(), SyncError> {
        self.run(|c| {
            let dropped = c.live.purge(root, deep);
            debug!(path = %root, deep, dropped = dropped.len(), "flushed sync cache");
            c.adjust_dirty_recursively(root, DirtyIndicator::NeedsRecompute);
            Ok(())
        })
    }

    /// Forget everything cached below `root`, phantom history included
    pub fn deconfigure(&mut self, root: &ResourcePath) -> Result<(), SyncError> {
        self.run(|c| {
            if root.is_root() {
                c.live.clear();
                c.phantom.clear();
            } else {
                c.live.purge(root, true);
                c.phantom.purge(root, true);
            }
            info!(path = %root, "deconfigured sync state");
            Ok(())
        })
    }

    /// Ignore files of `folders` changed on disk
    pub fn ignore_files_changed(&mut self, folders: &[ResourcePath]) -> Result<(), SyncError> {
        self.run(|c| {
            for folder in folders {
                c.live.forget_ignore_patterns(folder);
                c.phantom.forget_ignore_patterns(folder);
                if c.working_copy.kind(folder) == Some(ResourceKind::Folder) {
                    for child in c.working_copy.members(folder)? {
                        if c.load_sync_bytes(child.path())?.is_none() {
                            c.live.flush_dirty(child.path());
                            c.notify_changed(child);
                        }
                    }
                }
                c.live.flush_dirty(folder);
                c.adjust_dirty_recursively(folder, DirtyIndicator::NeedsRecompute);
            }
            Ok(())
        })
    }

    /// Metadata of `folders` was rewritten by another tool
    pub fn sync_files_changed_externally(&mut self, folders: &[ResourcePath]) -> Result<(), SyncError> {
        self.run(|c| {
            for folder in folders {
                let children: Vec<(String, ResourceKind)> = c
                    .live
                    .child_entries(folder)
                    .chain(c.phantom.child_entries(folder))
                    .map(|(name, bytes)| (name.to_string(), entry_kind(bytes)))
                    .collect();
                c.live.purge(folder, false);
                c.phantom.purge(folder, false);
                for (name, kind) in children {
                    c.notify_changed(Resource::new(folder.join(&name)?, kind));
                }
                c.notify_changed(Resource::Folder(folder.clone()));
                c.adjust_dirty_recursively(folder, DirtyIndicator::NeedsRecompute);
                debug!(path = %folder, "reloading externally modified metadata");
            }
            Ok(())
        })
    }

    /// Load mapping, child records and ignore patterns of the folders
    /// containing `resources`
    pub fn ensure_sync_info_loaded(&mut self, resources: &[Resource], deep: bool) -> Result<(), SyncError> {
        self.run(|c| {
            for resource in resources {
                let Some(folder) = containing_folder(resource) else {
                    continue;
                };
                c.load_tree(&folder, deep)?;
            }
            Ok(())
        })
    }

    fn load_tree(&mut self, folder: &ResourcePath, deep: bool) -> Result<(), SyncError> {
        self.load_folder_sync(folder)?;
        self.ensure_children_cached(folder)?;
        self.load_ignores(folder)?;
        if deep {
            for child in self.collect_members(folder)? {
                if let Resource::Folder(sub) = child {
                    self.load_tree(&sub, true)?;
                }
            }
        }
        Ok(())
    }

    /// Whether [`Self::ensure_sync_info_loaded`] would have nothing to load
    #[must_use]
    pub fn is_sync_info_loaded(&self, resources: &[Resource], deep: bool) -> bool {
        resources.iter().all(|resource| match containing_folder(resource) {
            Some(folder) => self.is_tree_loaded(&folder, deep),
            None => true,
        })
    }

    fn is_tree_loaded(&self, folder: &ResourcePath, deep: bool) -> bool {
        let partition = self.partition_for(folder);
        let cache = self.cache(partition);
        let loaded = cache.children_loaded(folder)
            && (partition != vcsync_cache::Partition::Live || cache.is_folder_sync_cached(folder));
        if !loaded || !deep {
            return loaded;
        }
        cache
            .members(folder)
            .iter()
            .filter_map(|m| match m {
                Resource::Folder(sub) => Some(sub),
                Resource::File(_) => None,
            })
            .all(|sub| self.is_tree_loaded(sub, true))
    }
}

fn containing_folder(resource: &Resource) -> Option<ResourcePath> {
    match resource {
        Resource::Folder(path) => Some(path.clone()),
        Resource::File(path) => path.parent(),
    }
}
