//! Shared test helpers for sync integration tests
//!
//! Provides an in-memory working copy, a scripted repository connection and
//! a listener that records every broadcast.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use vcsync_cache::MemorySyncStore;
use vcsync_core::domain::{
    EntryTag, EntryTimestamp, FolderSyncInfo, KeywordMode, Resource, ResourceKind, ResourcePath,
    ResourceSyncInfo,
};
use vcsync_core::ports::{
    CompareRequest, CompareResponse, ConnectionError, IChangeListener, IRepositoryConnection,
    ISyncStore, IWorkingCopy, ResponseStatus, StatusResponse,
};
use vcsync_sync::SynchronizationCoordinator;

pub const REPOSITORY_ROOT: &str = ":pserver:anonymous@cvs.example.org:/cvsroot";

pub fn path(p: &str) -> ResourcePath {
    ResourcePath::new(p).unwrap()
}

/// Fixed timestamp used as the recorded modification time of clean files
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub fn later_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 2, 8, 30, 0).unwrap()
}

pub fn file_record(name: &str, revision: &str) -> ResourceSyncInfo {
    ResourceSyncInfo::file(
        name,
        revision,
        EntryTimestamp::At(base_time()),
        KeywordMode::text(),
        None,
    )
    .unwrap()
}

// ============================================================================
// MemoryWorkingCopy
// ============================================================================

#[derive(Debug, Clone)]
struct Node {
    kind: ResourceKind,
    mtime: Option<DateTime<Utc>>,
}

/// Working copy held in memory; the root folder always exists
#[derive(Debug, Default)]
pub struct MemoryWorkingCopy {
    nodes: Mutex<BTreeMap<ResourcePath, Node>>,
}

impl MemoryWorkingCopy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_folder(&self, p: &str) {
        let folder = path(p);
        self.add_parents(&folder);
        self.nodes.lock().unwrap().insert(
            folder,
            Node {
                kind: ResourceKind::Folder,
                mtime: None,
            },
        );
    }

    pub fn add_file(&self, p: &str, mtime: DateTime<Utc>) {
        let file = path(p);
        self.add_parents(&file);
        self.nodes.lock().unwrap().insert(
            file,
            Node {
                kind: ResourceKind::File,
                mtime: Some(mtime),
            },
        );
    }

    pub fn touch(&self, p: &str, mtime: DateTime<Utc>) {
        if let Some(node) = self.nodes.lock().unwrap().get_mut(&path(p)) {
            node.mtime = Some(mtime);
        }
    }

    /// Remove `p` and everything below it
    pub fn remove(&self, p: &str) {
        let target = path(p);
        self.nodes
            .lock()
            .unwrap()
            .retain(|existing, _| !existing.starts_with(&target));
    }

    fn add_parents(&self, p: &ResourcePath) {
        let mut nodes = self.nodes.lock().unwrap();
        let mut current = p.parent();
        while let Some(parent) = current {
            if parent.is_root() {
                break;
            }
            nodes.entry(parent.clone()).or_insert(Node {
                kind: ResourceKind::Folder,
                mtime: None,
            });
            current = parent.parent();
        }
    }
}

impl IWorkingCopy for MemoryWorkingCopy {
    fn kind(&self, p: &ResourcePath) -> Option<ResourceKind> {
        if p.is_root() {
            return Some(ResourceKind::Folder);
        }
        self.nodes.lock().unwrap().get(p).map(|n| n.kind)
    }

    fn members(&self, folder: &ResourcePath) -> anyhow::Result<Vec<Resource>> {
        if self.kind(folder) != Some(ResourceKind::Folder) {
            anyhow::bail!("{folder} is not a folder");
        }
        Ok(self
            .nodes
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p.parent().as_ref() == Some(folder))
            .map(|(p, n)| Resource::new(p.clone(), n.kind))
            .collect())
    }

    fn modification_time(&self, file: &ResourcePath) -> anyhow::Result<Option<DateTime<Utc>>> {
        Ok(self.nodes.lock().unwrap().get(file).and_then(|n| n.mtime))
    }

    fn is_linked(&self, _folder: &ResourcePath) -> bool {
        false
    }
}

// ============================================================================
// Fixture
// ============================================================================

pub struct Fixture {
    pub store: Arc<MemorySyncStore>,
    pub wc: Arc<MemoryWorkingCopy>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemorySyncStore::new()),
            wc: Arc::new(MemoryWorkingCopy::new()),
        }
    }

    pub fn coordinator(&self) -> SynchronizationCoordinator {
        SynchronizationCoordinator::new(self.store.clone(), self.wc.clone())
    }

    /// Manage folder `p` on disk and in the store, optionally on a branch
    pub fn managed_folder(&self, p: &str, tag: Option<EntryTag>) {
        self.wc.add_folder(p);
        let info = FolderSyncInfo::new(format!("proj/{p}"), REPOSITORY_ROOT, tag, false).unwrap();
        self.store.write_folder_sync(&path(p), &info).unwrap();
    }

    /// Store the records of a folder's children
    pub fn entries(&self, folder: &str, records: &[ResourceSyncInfo]) {
        let bytes: Vec<Vec<u8>> = records.iter().map(ResourceSyncInfo::to_bytes).collect();
        self.store.write_entries(&path(folder), &bytes).unwrap();
    }

    /// A clean managed file: on disk with the recorded modification time
    pub fn clean_file(&self, p: &str) {
        self.wc.add_file(p, base_time());
    }
}

// ============================================================================
// ScriptedConnection
// ============================================================================

/// Connection answering compare queries from a script keyed by scope and
/// status queries from a revision table
#[derive(Debug, Default)]
pub struct ScriptedConnection {
    compare_script: HashMap<String, VecDeque<CompareResponse>>,
    revisions: HashMap<String, String>,
    failing_status: HashSet<String>,
    pub requests: Vec<CompareRequest>,
    pub status_batches: Vec<usize>,
}

impl ScriptedConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `response` for the next compare query on `scope`
    pub fn on_compare(&mut self, scope: &str, response: CompareResponse) {
        self.compare_script
            .entry(scope.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn revision(&mut self, path: &str, revision: &str) {
        self.revisions.insert(path.to_string(), revision.to_string());
    }

    /// Reject every status batch that contains `path`
    pub fn fail_status(&mut self, path: &str) {
        self.failing_status.insert(path.to_string());
    }
}

#[async_trait]
impl IRepositoryConnection for ScriptedConnection {
    async fn compare(&mut self, request: &CompareRequest) -> Result<CompareResponse, ConnectionError> {
        self.requests.push(request.clone());
        Ok(self
            .compare_script
            .get_mut(&request.scope)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| CompareResponse::ok(Vec::new())))
    }

    async fn status(
        &mut self,
        paths: &[String],
        _tag: Option<&EntryTag>,
    ) -> Result<StatusResponse, ConnectionError> {
        self.status_batches.push(paths.len());
        if paths.iter().any(|p| self.failing_status.contains(p)) {
            return Ok(StatusResponse {
                revisions: Vec::new(),
                status: ResponseStatus::ServerError("cannot open file".into()),
            });
        }
        let revisions = paths
            .iter()
            .filter_map(|p| self.revisions.get(p).map(|r| (p.clone(), r.clone())))
            .collect();
        Ok(StatusResponse::ok(revisions))
    }
}

// ============================================================================
// RecordingListener
// ============================================================================

#[derive(Debug, Default)]
pub struct RecordingListener {
    batches: Mutex<Vec<Vec<Resource>>>,
}

impl RecordingListener {
    pub fn batches(&self) -> Vec<Vec<Resource>> {
        self.batches.lock().unwrap().clone()
    }
}

impl IChangeListener for RecordingListener {
    fn resources_changed(&self, resources: &[Resource]) {
        self.batches.lock().unwrap().push(resources.to_vec());
    }
}
