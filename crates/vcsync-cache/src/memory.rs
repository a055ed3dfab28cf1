//! In-memory sync store
//!
//! Implements [`ISyncStore`] without touching the disk. Folders can be
//! marked locked or failing to exercise the coordinator's fallback and
//! partial-failure paths, and every write is counted.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use vcsync_core::domain::{FolderSyncInfo, ResourcePath};
use vcsync_core::ports::{ISyncStore, StoreError};

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<ResourcePath, Vec<Vec<u8>>>,
    folder_sync: HashMap<ResourcePath, FolderSyncInfo>,
    ignores: HashMap<ResourcePath, Vec<String>>,
    locked: HashSet<ResourcePath>,
    failing: HashSet<ResourcePath>,
    entries_writes: usize,
    folder_writes: usize,
    folder_deletes: usize,
    bulk_reads: usize,
}

/// Sync store held entirely in memory
#[derive(Debug, Default)]
pub struct MemorySyncStore {
    inner: Mutex<Inner>,
}

impl MemorySyncStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make whole-folder reads of `folder` fail with [`StoreError::Locked`]
    pub fn set_locked(&self, folder: &ResourcePath, locked: bool) {
        let mut inner = self.lock();
        if locked {
            inner.locked.insert(folder.clone());
        } else {
            inner.locked.remove(folder);
        }
    }

    /// Make every write to `folder` fail with an I/O error
    pub fn set_failing(&self, folder: &ResourcePath, failing: bool) {
        let mut inner = self.lock();
        if failing {
            inner.failing.insert(folder.clone());
        } else {
            inner.failing.remove(folder);
        }
    }

    /// Number of entries-file writes so far
    #[must_use]
    pub fn entries_writes(&self) -> usize {
        self.lock().entries_writes
    }

    /// Number of folder-sync writes so far
    #[must_use]
    pub fn folder_writes(&self) -> usize {
        self.lock().folder_writes
    }

    /// Number of folder-sync deletions so far
    #[must_use]
    pub fn folder_deletes(&self) -> usize {
        self.lock().folder_deletes
    }

    /// Number of whole-folder entry reads so far
    #[must_use]
    pub fn bulk_reads(&self) -> usize {
        self.lock().bulk_reads
    }

    /// Stored entries of `folder`, decoded as lines
    #[must_use]
    pub fn entry_lines(&self, folder: &ResourcePath) -> Option<Vec<String>> {
        self.lock().entries.get(folder).map(|entries| {
            entries
                .iter()
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                .collect()
        })
    }

    fn check_writable(inner: &Inner, folder: &ResourcePath) -> Result<(), StoreError> {
        if inner.failing.contains(folder) {
            return Err(StoreError::Io {
                path: PathBuf::from(folder.as_str()),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "write refused"),
            });
        }
        Ok(())
    }
}

impl ISyncStore for MemorySyncStore {
    fn read_entries(&self, folder: &ResourcePath) -> Result<Option<Vec<Vec<u8>>>, StoreError> {
        let mut inner = self.lock();
        if inner.locked.contains(folder) {
            return Err(StoreError::Locked(folder.clone()));
        }
        inner.bulk_reads += 1;
        Ok(inner.entries.get(folder).cloned())
    }

    fn read_entry(&self, folder: &ResourcePath, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let inner = self.lock();
        Ok(inner.entries.get(folder).and_then(|entries| {
            entries
                .iter()
                .find(|bytes| {
                    String::from_utf8_lossy(bytes).split('/').nth(1) == Some(name)
                })
                .cloned()
        }))
    }

    fn write_entries(&self, folder: &ResourcePath, entries: &[Vec<u8>]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        Self::check_writable(&inner, folder)?;
        inner.entries_writes += 1;
        inner.entries.insert(folder.clone(), entries.to_vec());
        Ok(())
    }

    fn read_folder_sync(&self, folder: &ResourcePath) -> Result<Option<FolderSyncInfo>, StoreError> {
        Ok(self.lock().folder_sync.get(folder).cloned())
    }

    fn write_folder_sync(
        &self,
        folder: &ResourcePath,
        info: &FolderSyncInfo,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        Self::check_writable(&inner, folder)?;
        inner.folder_writes += 1;
        inner.folder_sync.insert(folder.clone(), info.clone());
        inner.entries.entry(folder.clone()).or_default();
        Ok(())
    }

    fn delete_folder_sync(&self, folder: &ResourcePath) -> Result<(), StoreError> {
        let mut inner = self.lock();
        Self::check_writable(&inner, folder)?;
        inner.folder_deletes += 1;
        inner.folder_sync.remove(folder);
        inner.entries.remove(folder);
        Ok(())
    }

    fn read_ignores(&self, folder: &ResourcePath) -> Result<Option<Vec<String>>, StoreError> {
        Ok(self.lock().ignores.get(folder).cloned())
    }

    fn write_ignores(&self, folder: &ResourcePath, patterns: &[String]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        Self::check_writable(&inner, folder)?;
        if patterns.is_empty() {
            inner.ignores.remove(folder);
        } else {
            inner.ignores.insert(folder.clone(), patterns.to_vec());
        }
        Ok(())
    }
}
