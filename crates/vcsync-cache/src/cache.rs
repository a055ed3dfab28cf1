//! Partitioned in-memory sync cache
//!
//! One [`SyncCache`] instance backs each logical partition:
//!
//! - **Live**: resources that currently exist in the working copy. Also
//!   caches dirty indicators.
//! - **Phantom**: resources that were deleted but whose sync history must
//!   stay queryable, e.g. to record an outgoing deletion. Never caches dirty
//!   state.
//!
//! Records of a folder's children are loaded from the durable store all at
//! once, on first access per cache epoch; the caller marks the folder with
//! [`SyncCache::mark_children_loaded`] after populating it. After that,
//! lookups are pure in-memory.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::trace;

use vcsync_core::domain::{
    sync_info, DirtyIndicator, FolderSyncInfo, Resource, ResourceKind, ResourcePath,
    UNKNOWN_DIRTY_COUNT,
};

/// Logical partition of the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    Live,
    Phantom,
}

impl Partition {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Partition::Live => "live",
            Partition::Phantom => "phantom",
        }
    }
}

/// In-memory sync records for one partition
#[derive(Debug)]
pub struct SyncCache {
    partition: Partition,
    epoch: u64,
    /// `None` values record a folder known to be unmanaged
    folder_sync: HashMap<ResourcePath, Option<FolderSyncInfo>>,
    /// Child records keyed by parent folder, then by child name
    entries: HashMap<ResourcePath, BTreeMap<String, Vec<u8>>>,
    children_loaded: HashSet<ResourcePath>,
    ignores: HashMap<ResourcePath, Vec<String>>,
    dirty: HashMap<ResourcePath, DirtyIndicator>,
    dirty_counts: HashMap<ResourcePath, i32>,
}

impl SyncCache {
    #[must_use]
    pub fn new(partition: Partition) -> Self {
        Self {
            partition,
            epoch: 0,
            folder_sync: HashMap::new(),
            entries: HashMap::new(),
            children_loaded: HashSet::new(),
            ignores: HashMap::new(),
            dirty: HashMap::new(),
            dirty_counts: HashMap::new(),
        }
    }

    #[must_use]
    pub fn partition(&self) -> Partition {
        self.partition
    }

    /// Incremented every time the cache is cleared
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    #[must_use]
    pub fn caches_dirty_state(&self) -> bool {
        self.partition == Partition::Live
    }

    // ------------------------------------------------------------------------
    // Folder sync
    // ------------------------------------------------------------------------

    /// Cached folder mapping; `None` if absent or not cached
    #[must_use]
    pub fn folder_sync(&self, container: &ResourcePath) -> Option<&FolderSyncInfo> {
        self.folder_sync.get(container).and_then(Option::as_ref)
    }

    /// Whether the mapping of `container` (present or absent) is cached
    #[must_use]
    pub fn is_folder_sync_cached(&self, container: &ResourcePath) -> bool {
        self.folder_sync.contains_key(container)
    }

    /// Cache the mapping of `container`; `None` records it as unmanaged
    pub fn set_folder_sync(&mut self, container: &ResourcePath, info: Option<FolderSyncInfo>) {
        trace!(partition = self.partition.name(), path = %container, present = info.is_some(), "set folder sync");
        self.folder_sync.insert(container.clone(), info);
    }

    /// Drop the cached mapping so the next read goes to the store
    pub fn forget_folder_sync(&mut self, container: &ResourcePath) {
        self.folder_sync.remove(container);
    }

    // ------------------------------------------------------------------------
    // Resource sync bytes
    // ------------------------------------------------------------------------

    /// Cached record bytes of a resource
    #[must_use]
    pub fn sync_bytes(&self, resource: &ResourcePath) -> Option<&[u8]> {
        let parent = resource.parent()?;
        self.entries
            .get(&parent)
            .and_then(|children| children.get(resource.name()))
            .map(Vec::as_slice)
    }

    /// Cache or remove the record bytes of a resource
    ///
    /// The root has no parent to hold a record and is ignored.
    pub fn set_sync_bytes(&mut self, resource: &ResourcePath, bytes: Option<Vec<u8>>) {
        let Some(parent) = resource.parent() else {
            return;
        };
        match bytes {
            Some(bytes) => {
                self.entries
                    .entry(parent)
                    .or_default()
                    .insert(resource.name().to_string(), bytes);
            }
            None => {
                if let Some(children) = self.entries.get_mut(&parent) {
                    children.remove(resource.name());
                    if children.is_empty() {
                        self.entries.remove(&parent);
                    }
                }
            }
        }
    }

    /// Cached child records of `folder`, ordered by name
    pub fn child_entries<'a>(
        &'a self,
        folder: &ResourcePath,
    ) -> impl Iterator<Item = (&'a str, &'a [u8])> + 'a {
        self.entries
            .get(folder)
            .into_iter()
            .flat_map(|children| children.iter().map(|(k, v)| (k.as_str(), v.as_slice())))
    }

    // ------------------------------------------------------------------------
    // Ignore patterns
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn ignore_patterns(&self, container: &ResourcePath) -> Option<&[String]> {
        self.ignores.get(container).map(Vec::as_slice)
    }

    pub fn set_ignore_patterns(&mut self, container: &ResourcePath, patterns: Vec<String>) {
        self.ignores.insert(container.clone(), patterns);
    }

    pub fn forget_ignore_patterns(&mut self, container: &ResourcePath) {
        self.ignores.remove(container);
    }

    // ------------------------------------------------------------------------
    // Children-loaded marker
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn children_loaded(&self, container: &ResourcePath) -> bool {
        self.children_loaded.contains(container)
    }

    pub fn mark_children_loaded(&mut self, container: &ResourcePath) {
        self.children_loaded.insert(container.clone());
    }

    // ------------------------------------------------------------------------
    // Dirty state
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn dirty_indicator(&self, resource: &ResourcePath) -> Option<DirtyIndicator> {
        self.dirty.get(resource).copied()
    }

    pub fn set_dirty_indicator(&mut self, resource: &ResourcePath, indicator: DirtyIndicator) {
        if self.caches_dirty_state() {
            self.dirty.insert(resource.clone(), indicator);
        }
    }

    /// Number of dirty children of a folder, [`UNKNOWN_DIRTY_COUNT`] if not computed
    #[must_use]
    pub fn dirty_child_count(&self, folder: &ResourcePath) -> i32 {
        self.dirty_counts
            .get(folder)
            .copied()
            .unwrap_or(UNKNOWN_DIRTY_COUNT)
    }

    pub fn set_dirty_child_count(&mut self, folder: &ResourcePath, count: i32) {
        if !self.caches_dirty_state() {
            return;
        }
        if count < 0 {
            self.dirty_counts.remove(folder);
        } else {
            self.dirty_counts.insert(folder.clone(), count);
        }
    }

    /// Forget the dirty state of a resource
    pub fn flush_dirty(&mut self, resource: &ResourcePath) {
        self.dirty.remove(resource);
        self.dirty_counts.remove(resource);
    }

    /// Forget the dirty state of a resource and everything below it
    pub fn flush_dirty_deep(&mut self, root: &ResourcePath) {
        self.dirty.retain(|path, _| !path.starts_with(root));
        self.dirty_counts.retain(|path, _| !path.starts_with(root));
    }

    // ------------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------------

    /// Whether the partition holds any sync state for `path`
    #[must_use]
    pub fn contains(&self, path: &ResourcePath) -> bool {
        self.folder_sync(path).is_some() || self.sync_bytes(path).is_some()
    }

    /// Resources known to this partition directly below `folder`
    #[must_use]
    pub fn members(&self, folder: &ResourcePath) -> Vec<Resource> {
        let mut members: BTreeMap<String, ResourceKind> = BTreeMap::new();
        for (name, bytes) in self.child_entries(folder) {
            let kind = if sync_info::is_folder_entry(bytes) {
                ResourceKind::Folder
            } else {
                ResourceKind::File
            };
            members.insert(name.to_string(), kind);
        }
        for (path, info) in &self.folder_sync {
            if info.is_some() && path.parent().as_ref() == Some(folder) {
                members.insert(path.name().to_string(), ResourceKind::Folder);
            }
        }
        members
            .into_iter()
            .filter_map(|(name, kind)| folder.join(&name).ok().map(|p| Resource::new(p, kind)))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Invalidation
    // ------------------------------------------------------------------------

    /// Drop cached state of `container` and its children; with `deep`,
    /// of the whole subtree
    ///
    /// Returns the paths whose records were dropped. The record of
    /// `container` itself, held by its parent, is kept.
    pub fn purge(&mut self, container: &ResourcePath, deep: bool) -> Vec<ResourcePath> {
        let in_scope = |path: &ResourcePath| {
            if deep {
                path.starts_with(container)
            } else {
                path == container
            }
        };

        let mut dropped = Vec::new();
        let folders: Vec<ResourcePath> = self.entries.keys().filter(|p| in_scope(p)).cloned().collect();
        for folder in folders {
            if let Some(children) = self.entries.remove(&folder) {
                dropped.extend(children.keys().filter_map(|name| folder.join(name).ok()));
            }
        }

        self.folder_sync.retain(|path, _| !in_scope(path));
        self.children_loaded.retain(|path| !in_scope(path));
        self.ignores.retain(|path, _| !in_scope(path));
        if deep {
            self.flush_dirty_deep(container);
        } else {
            self.flush_dirty(container);
            for path in &dropped {
                self.flush_dirty(path);
            }
        }

        trace!(
            partition = self.partition.name(),
            path = %container,
            deep,
            dropped = dropped.len(),
            "purged cache"
        );
        dropped
    }

    /// Drop everything and start a new epoch
    pub fn clear(&mut self) {
        self.folder_sync.clear();
        self.entries.clear();
        self.children_loaded.clear();
        self.ignores.clear();
        self.dirty.clear();
        self.dirty_counts.clear();
        self.epoch += 1;
    }
}
