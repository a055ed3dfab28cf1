//! Synchronization coordinator
//!
//! The [`SynchronizationCoordinator`] is the only way sync records are read
//! or written. Every public method runs inside an *operation*:
//!
//! 1. **Begin**: operations nest; only the outermost begin counts
//! 2. **Mutate**: changes go to the in-memory cache and are remembered
//! 3. **Commit**: the outermost end writes each affected folder once,
//!    invalidates dirty state and broadcasts one change notification
//!
//! Resources that exist on disk live in the *live* partition; resources
//! that were deleted but whose history must stay queryable live in the
//! *phantom* partition. The partition of a path is decided by asking the
//! working copy whether it exists.
//!
//! ## Failure handling
//!
//! Each folder is written independently. A failed write purges that
//! folder's cached state so the next read reloads what the store holds,
//! and the commit reports every failure at once.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use vcsync_cache::{IgnoreMatcher, Partition, SyncCache};
use vcsync_core::config::WorkspaceConfig;
use vcsync_core::domain::{
    sync_info, DirtyIndicator, DomainError, FolderSyncInfo, Resource, ResourceKind,
    ResourcePath, ResourceSyncInfo,
};
use vcsync_core::ports::{IChangeListener, ISyncStore, IWorkingCopy};

use crate::dirty::DirtyStateTracker;
use crate::SyncError;

/// Transactional facade over the partitioned sync cache
pub struct SynchronizationCoordinator {
    pub(crate) live: SyncCache,
    pub(crate) phantom: SyncCache,
    pub(crate) store: Arc<dyn ISyncStore>,
    pub(crate) working_copy: Arc<dyn IWorkingCopy>,
    pub(crate) tracker: DirtyStateTracker,
    listeners: Vec<Arc<dyn IChangeListener>>,
    global_ignores: IgnoreMatcher,
    depth: usize,
    changed_resources: BTreeSet<Resource>,
    changed_folders: BTreeSet<ResourcePath>,
    /// Broadcast at commit without triggering a write
    notify_only: BTreeSet<Resource>,
    commits: u64,
}

impl SynchronizationCoordinator {
    /// Create a coordinator over `store` for the resources of `working_copy`
    pub fn new(store: Arc<dyn ISyncStore>, working_copy: Arc<dyn IWorkingCopy>) -> Self {
        Self {
            live: SyncCache::new(Partition::Live),
            phantom: SyncCache::new(Partition::Phantom),
            store,
            working_copy,
            tracker: DirtyStateTracker::default(),
            listeners: Vec::new(),
            global_ignores: IgnoreMatcher::with_defaults(Vec::<String>::new()),
            depth: 0,
            changed_resources: BTreeSet::new(),
            changed_folders: BTreeSet::new(),
            notify_only: BTreeSet::new(),
            commits: 0,
        }
    }

    /// Create a coordinator using the workspace section of the configuration
    pub fn from_config(
        store: Arc<dyn ISyncStore>,
        working_copy: Arc<dyn IWorkingCopy>,
        config: &WorkspaceConfig,
    ) -> Self {
        Self::new(store, working_copy).with_global_ignores(&config.global_ignores)
    }

    /// Ignore `patterns` in every folder, on top of the built-in defaults
    #[must_use]
    pub fn with_global_ignores<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.global_ignores = IgnoreMatcher::with_defaults(patterns);
        self
    }

    /// Register a sink for committed changes
    pub fn add_listener(&mut self, listener: Arc<dyn IChangeListener>) {
        self.listeners.push(listener);
    }

    #[must_use]
    pub fn working_copy(&self) -> &Arc<dyn IWorkingCopy> {
        &self.working_copy
    }

    /// Number of commits (outermost operations that changed something)
    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.commits
    }

    /// Whether an operation is open
    #[must_use]
    pub fn in_operation(&self) -> bool {
        self.depth > 0
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Open an operation; calls nest
    pub fn begin_operation(&mut self) {
        if self.depth == 0 {
            trace!(epoch = self.live.epoch(), "begin sync operation");
        }
        self.depth += 1;
    }

    /// Close an operation; the outermost close commits
    pub fn end_operation(&mut self) -> Result<(), SyncError> {
        if self.depth == 0 {
            return Err(SyncError::CacheInconsistency(
                "end_operation called without a matching begin_operation".into(),
            ));
        }
        self.depth -= 1;
        if self.depth == 0 {
            self.commit()
        } else {
            Ok(())
        }
    }

    /// Run `f` inside an operation
    ///
    /// The operation is closed even when `f` fails; the error of `f` then
    /// takes precedence over a commit failure.
    pub fn run<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, SyncError>,
    ) -> Result<T, SyncError> {
        self.begin_operation();
        let result = f(self);
        let committed = self.end_operation();
        match (result, committed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(commit_error)) => {
                warn!(error = %commit_error, "Commit failed after operation error");
                Err(e)
            }
        }
    }

    fn commit(&mut self) -> Result<(), SyncError> {
        if self.changed_resources.is_empty()
            && self.changed_folders.is_empty()
            && self.notify_only.is_empty()
        {
            return Ok(());
        }
        let changed_folders = std::mem::take(&mut self.changed_folders);
        let changed_resources = std::mem::take(&mut self.changed_resources);
        let notify_only = std::mem::take(&mut self.notify_only);

        let mut failures = Vec::new();
        let mut failed: BTreeSet<ResourcePath> = BTreeSet::new();
        let mut dirty_parents: BTreeSet<ResourcePath> = changed_resources
            .iter()
            .filter_map(|r| r.path().parent())
            .collect();

        for folder in &changed_folders {
            if !self.working_copy.exists(folder) || !self.live.is_folder_sync_cached(folder) {
                continue;
            }
            let result = match self.live.folder_sync(folder).cloned() {
                Some(info) => self.store.write_folder_sync(folder, &info),
                None => {
                    // metadata directory goes away with the mapping
                    dirty_parents.remove(folder);
                    if self.working_copy.is_linked(folder) {
                        continue;
                    }
                    self.store.delete_folder_sync(folder)
                }
            };
            if let Err(source) = result {
                warn!(path = %folder, error = %source, "Failed to persist folder sync");
                self.live.purge(folder, true);
                failed.insert(folder.clone());
                failures.push(SyncError::PersistenceFailure {
                    folder: folder.clone(),
                    source,
                });
            }
        }

        for folder in &dirty_parents {
            if failed.iter().any(|f| folder.starts_with(f)) || !self.working_copy.exists(folder) {
                continue;
            }
            let entries = self.collect_entries(folder);
            if entries.is_empty() && self.working_copy.is_linked(folder) {
                continue;
            }
            if let Err(source) = self.store.write_entries(folder, &entries) {
                warn!(path = %folder, error = %source, "Failed to persist entries");
                self.live.purge(folder, false);
                failures.push(SyncError::PersistenceFailure {
                    folder: folder.clone(),
                    source,
                });
            }
        }

        let mut notified = changed_resources;
        notified.extend(changed_folders.into_iter().map(Resource::Folder));
        notified.extend(notify_only);
        self.invalidate_dirty_state(&notified);

        let resources: Vec<Resource> = notified.into_iter().collect();
        self.commits += 1;
        debug!(
            changed = resources.len(),
            folders_written = dirty_parents.len(),
            failures = failures.len(),
            "committed sync state"
        );
        for listener in &self.listeners {
            listener.resources_changed(&resources);
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(SyncError::Aggregate(failures))
        }
    }

    /// Live and phantom records of `folder`'s children, live winning
    fn collect_entries(&self, folder: &ResourcePath) -> Vec<Vec<u8>> {
        let mut by_name: BTreeMap<&str, &[u8]> = self.phantom.child_entries(folder).collect();
        by_name.extend(self.live.child_entries(folder));
        by_name.into_values().map(<[u8]>::to_vec).collect()
    }

    pub(crate) fn resource_changed(&mut self, resource: Resource) {
        self.changed_resources.insert(resource);
    }

    pub(crate) fn folder_changed(&mut self, folder: &ResourcePath) {
        self.changed_folders.insert(folder.clone());
    }

    pub(crate) fn notify_changed(&mut self, resource: Resource) {
        self.notify_only.insert(resource);
    }

    // ------------------------------------------------------------------------
    // Partitions
    // ------------------------------------------------------------------------

    pub(crate) fn partition_for(&self, path: &ResourcePath) -> Partition {
        if path.is_root() || self.working_copy.exists(path) {
            Partition::Live
        } else {
            Partition::Phantom
        }
    }

    pub(crate) fn cache(&self, partition: Partition) -> &SyncCache {
        match partition {
            Partition::Live => &self.live,
            Partition::Phantom => &self.phantom,
        }
    }

    pub(crate) fn cache_mut(&mut self, partition: Partition) -> &mut SyncCache {
        match partition {
            Partition::Live => &mut self.live,
            Partition::Phantom => &mut self.phantom,
        }
    }

    /// Whether `path` exists on disk or is held in the phantom partition
    #[must_use]
    pub fn is_valid(&self, path: &ResourcePath) -> bool {
        self.partition_for(path) == Partition::Live || self.phantom.contains(path)
    }

    /// Whether the phantom partition holds sync state for `path`
    #[must_use]
    pub fn was_phantom(&self, path: &ResourcePath) -> bool {
        self.phantom.contains(path)
    }

    // ------------------------------------------------------------------------
    // Lazy loading
    // ------------------------------------------------------------------------

    /// Load the records of all children of `folder` unless already loaded
    ///
    /// Each record goes to the partition of its child.
    pub(crate) fn ensure_children_cached(&mut self, folder: &ResourcePath) -> Result<(), SyncError> {
        let partition = self.partition_for(folder);
        if self.cache(partition).children_loaded(folder) {
            return Ok(());
        }
        let records = self.store.read_entries(folder)?.unwrap_or_default();
        trace!(path = %folder, count = records.len(), "loading child records");
        for bytes in records {
            let info = match ResourceSyncInfo::from_bytes(&bytes) {
                Ok(info) => info,
                Err(e) => {
                    warn!(
                        path = %folder,
                        line = %String::from_utf8_lossy(&bytes),
                        error = %e,
                        "skipping malformed entry line"
                    );
                    continue;
                }
            };
            let child = folder.join(info.name())?;
            let target = self.partition_for(&child);
            if self.cache(target).sync_bytes(&child).is_none() {
                self.cache_mut(target).set_sync_bytes(&child, Some(bytes));
            }
        }
        self.cache_mut(partition).mark_children_loaded(folder);
        Ok(())
    }

    pub(crate) fn load_sync_bytes(&mut self, path: &ResourcePath) -> Result<Option<Vec<u8>>, SyncError> {
        let Some(parent) = path.parent() else {
            return Ok(None);
        };
        match self.ensure_children_cached(&parent) {
            Ok(()) => {}
            Err(SyncError::Store(e)) if e.is_locked() => {
                debug!(path = %path, "entries locked, reading single record");
                let bytes = self.store.read_entry(&parent, path.name())?;
                let exists = self.working_copy.exists(path);
                return Ok(bytes.map(|bytes| {
                    if !exists && !sync_info::is_deletion_entry(&bytes) {
                        deletion_bytes(&bytes)
                    } else {
                        bytes
                    }
                }));
            }
            Err(e) => return Err(e),
        }
        let partition = self.partition_for(path);
        let other = match partition {
            Partition::Live => Partition::Phantom,
            Partition::Phantom => Partition::Live,
        };
        // a record stays where it was loaded until the resource is reported
        // deleted or recreated
        Ok(self
            .cache(partition)
            .sync_bytes(path)
            .or_else(|| self.cache(other).sync_bytes(path))
            .map(<[u8]>::to_vec))
    }

    pub(crate) fn load_folder_sync(
        &mut self,
        folder: &ResourcePath,
    ) -> Result<Option<FolderSyncInfo>, SyncError> {
        let partition = self.partition_for(folder);
        if partition == Partition::Live && !self.live.is_folder_sync_cached(folder) {
            let info = self.store.read_folder_sync(folder)?;
            self.live.set_folder_sync(folder, info);
        }
        Ok(self.cache(partition).folder_sync(folder).cloned())
    }

    // ------------------------------------------------------------------------
    // Folder sync
    // ------------------------------------------------------------------------

    /// Repository mapping of `folder`, `None` if unmanaged
    pub fn folder_sync(&mut self, folder: &ResourcePath) -> Result<Option<FolderSyncInfo>, SyncError> {
        self.run(|c| c.load_folder_sync(folder))
    }

    /// Manage `folder` with `info`
    ///
    /// A folder that neither exists nor is phantom may only be given a
    /// mapping when its parent is managed.
    pub fn set_folder_sync(&mut self, folder: &ResourcePath, info: FolderSyncInfo) -> Result<(), SyncError> {
        self.run(|c| {
            if !c.is_valid(folder) {
                let parent_managed = match folder.parent() {
                    Some(parent) => c.load_folder_sync(&parent)?.is_some(),
                    None => false,
                };
                if !parent_managed {
                    return Err(SyncError::NotVersioned(folder.clone()));
                }
            }
            let old = c.load_folder_sync(folder)?;
            if old.as_ref() == Some(&info) {
                return Ok(());
            }
            let partition = c.partition_for(folder);
            c.cache_mut(partition).set_folder_sync(folder, Some(info));
            c.folder_changed(folder);
            if old.is_none() {
                // newly managed subtree
                c.live.flush_dirty_deep(folder);
                c.adjust_dirty_recursively(folder, DirtyIndicator::NeedsRecompute);
            }
            Ok(())
        })
    }

    /// Unmanage `folder`, dropping the records of its children
    pub fn delete_folder_sync(&mut self, folder: &ResourcePath) -> Result<(), SyncError> {
        self.run(|c| {
            c.ensure_children_cached(folder)?;
            let children: Vec<(String, ResourceKind)> = c
                .live
                .child_entries(folder)
                .chain(c.phantom.child_entries(folder))
                .map(|(name, bytes)| (name.to_string(), entry_kind(bytes)))
                .collect();
            for (name, kind) in children {
                let child = folder.join(&name)?;
                let partition = c.partition_for(&child);
                c.cache_mut(partition).set_sync_bytes(&child, None);
                c.resource_changed(Resource::new(child, kind));
            }
            let partition = c.partition_for(folder);
            c.cache_mut(partition).set_folder_sync(folder, None);
            c.folder_changed(folder);
            Ok(())
        })
    }

    // ------------------------------------------------------------------------
    // Resource sync
    // ------------------------------------------------------------------------

    /// Decoded record of `path`, `None` if unmanaged
    pub fn resource_sync(&mut self, path: &ResourcePath) -> Result<Option<ResourceSyncInfo>, SyncError> {
        let bytes = self.sync_bytes(path)?;
        Ok(bytes
            .map(|bytes| ResourceSyncInfo::from_bytes(&bytes))
            .transpose()?)
    }

    /// Store the record of `resource`
    pub fn set_resource_sync(
        &mut self,
        resource: &Resource,
        info: &ResourceSyncInfo,
    ) -> Result<(), SyncError> {
        if info.name() != resource.name() {
            return Err(SyncError::Domain(DomainError::ValidationFailed(format!(
                "record '{}' does not belong to {}",
                info.name(),
                resource
            ))));
        }
        self.set_sync_bytes(resource, info.to_bytes())
    }

    /// Raw record bytes of `path`
    pub fn sync_bytes(&mut self, path: &ResourcePath) -> Result<Option<Vec<u8>>, SyncError> {
        self.run(|c| c.load_sync_bytes(path))
    }

    /// Store raw record bytes; the parent must exist or be phantom
    pub fn set_sync_bytes(&mut self, resource: &Resource, bytes: Vec<u8>) -> Result<(), SyncError> {
        self.run(|c| {
            let path = resource.path();
            let Some(parent) = path.parent() else {
                return Err(SyncError::NotVersioned(path.clone()));
            };
            if !c.is_valid(&parent) {
                return Err(SyncError::NotVersioned(parent));
            }
            c.ensure_children_cached(&parent)?;
            let partition = c.partition_for(path);
            if c.cache(partition).sync_bytes(path) == Some(bytes.as_slice()) {
                return Ok(());
            }
            c.cache_mut(partition).set_sync_bytes(path, Some(bytes));
            c.resource_changed(resource.clone());
            Ok(())
        })
    }

    /// Drop the record of `resource`
    pub fn delete_resource_sync(&mut self, resource: &Resource) -> Result<(), SyncError> {
        self.run(|c| {
            let path = resource.path();
            let Some(parent) = path.parent() else {
                return Ok(());
            };
            c.ensure_children_cached(&parent)?;
            let partition = c.partition_for(path);
            if c.cache(partition).sync_bytes(path).is_some() {
                c.cache_mut(partition).set_sync_bytes(path, None);
                c.resource_changed(resource.clone());
            }
            c.live.flush_dirty(path);
            c.adjust_dirty_recursively(&parent, DirtyIndicator::NeedsRecompute);
            Ok(())
        })
    }

    // ------------------------------------------------------------------------
    // Ignores
    // ------------------------------------------------------------------------

    pub(crate) fn load_ignores(&mut self, folder: &ResourcePath) -> Result<Vec<String>, SyncError> {
        let partition = self.partition_for(folder);
        if let Some(patterns) = self.cache(partition).ignore_patterns(folder) {
            return Ok(patterns.to_vec());
        }
        let patterns = if partition == Partition::Live {
            self.store.read_ignores(folder)?.unwrap_or_default()
        } else {
            Vec::new()
        };
        self.cache_mut(partition)
            .set_ignore_patterns(folder, patterns.clone());
        Ok(patterns)
    }

    pub(crate) fn check_ignored(&mut self, path: &ResourcePath) -> Result<bool, SyncError> {
        if path.is_root() || !self.working_copy.exists(path) {
            return Ok(false);
        }
        if self.global_ignores.matches(path.name()) {
            return Ok(true);
        }
        let Some(parent) = path.parent() else {
            return Ok(false);
        };
        let patterns = self.load_ignores(&parent)?;
        Ok(IgnoreMatcher::new(&patterns).matches(path.name()))
    }

    /// Ignore patterns declared by `folder`
    pub fn ignore_patterns(&mut self, folder: &ResourcePath) -> Result<Vec<String>, SyncError> {
        self.run(|c| c.load_ignores(folder))
    }

    /// Whether `path` matches its parent's patterns or the global ones
    ///
    /// The root and resources that do not exist are never ignored.
    pub fn is_ignored(&mut self, path: &ResourcePath) -> Result<bool, SyncError> {
        self.run(|c| c.check_ignored(path))
    }

    /// Append `pattern` to `folder`'s ignore file
    ///
    /// Written immediately. Unmanaged children of `folder` are reported as
    /// changed at commit.
    pub fn add_ignored(&mut self, folder: &ResourcePath, pattern: &str) -> Result<(), SyncError> {
        self.run(|c| {
            let mut patterns = c.load_ignores(folder)?;
            if patterns.iter().any(|p| p == pattern) {
                return Ok(());
            }
            patterns.push(pattern.to_string());
            c.store
                .write_ignores(folder, &patterns)
                .map_err(|source| SyncError::PersistenceFailure {
                    folder: folder.clone(),
                    source,
                })?;
            debug!(path = %folder, pattern, "added ignore pattern");
            let partition = c.partition_for(folder);
            c.cache_mut(partition).set_ignore_patterns(folder, patterns);

            for child in c.working_copy.members(folder)? {
                if c.load_sync_bytes(child.path())?.is_none() {
                    c.notify_changed(child);
                }
            }
            Ok(())
        })
    }

    // ------------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------------

    pub(crate) fn collect_members(&mut self, folder: &ResourcePath) -> Result<Vec<Resource>, SyncError> {
        let mut members: BTreeMap<ResourcePath, Resource> = BTreeMap::new();
        if self.working_copy.kind(folder) == Some(ResourceKind::Folder) {
            for member in self.working_copy.members(folder)? {
                members.insert(member.path().clone(), member);
            }
        }
        match self.ensure_children_cached(folder) {
            Ok(()) => {}
            Err(SyncError::Store(e)) if e.is_locked() => {
                debug!(path = %folder, "entries locked, listing without phantom members");
            }
            Err(e) => return Err(e),
        }
        for member in self.phantom.members(folder) {
            members.entry(member.path().clone()).or_insert(member);
        }
        Ok(members.into_values().collect())
    }

    /// Children of `folder` on disk together with its phantom children
    pub fn members(&mut self, folder: &ResourcePath) -> Result<Vec<Resource>, SyncError> {
        self.run(|c| c.collect_members(folder))
    }
}

pub(crate) fn entry_kind(bytes: &[u8]) -> ResourceKind {
    if sync_info::is_folder_entry(bytes) {
        ResourceKind::Folder
    } else {
        ResourceKind::File
    }
}

/// Record bytes converted to a pending deletion; unparsable bytes are kept
pub(crate) fn deletion_bytes(bytes: &[u8]) -> Vec<u8> {
    match ResourceSyncInfo::from_bytes(bytes) {
        Ok(info) => info.to_deletion().to_bytes(),
        Err(_) => bytes.to_vec(),
    }
}
