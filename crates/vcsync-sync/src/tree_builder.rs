//! Remote tree construction
//!
//! [`RemoteTreeBuilder`] mirrors the repository state of a local folder
//! subtree at a tag or date without transferring file content:
//!
//! 1. **Compare**: one dry-run compare query for the root; its events are
//!    recorded in a [`DeltaMap`]
//! 2. **Assemble**: walk the local managed tree, drop what the delta marks
//!    deleted, overlay what exists only remotely. Folders known only from
//!    the delta get a compare query of their own before recursing, since
//!    responses are grouped by request root.
//! 3. **Revisions**: files whose revision is still unknown are sent to
//!    status queries in chunks of at most `batch_size` paths
//! 4. **Prune** (optional): empty remote folders are dropped when the local
//!    folder is empty too or carries a different tag
//!
//! ## Error boundaries
//!
//! A compare query rejected with "no such tag" for a subtree without
//! ordinary files is retried once without the tag; that subtree is then
//! built at reduced fidelity (folder names only, file revisions left
//! unresolved). Any other failure aborts the current subtree, which is
//! recorded on the tree and left empty; a failed root compare keeps the
//! locally known state instead. Files a failed status batch left without a
//! revision are recorded as failures too. The build fails only when nothing
//! below the root could be built. Cancellation is checked once per event
//! and once per status batch and always propagates.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use vcsync_core::config::{RemoteConfig, DEFAULT_REVISION_BATCH_SIZE};
use vcsync_core::domain::{EntryTag, FolderSyncInfo, Resource, ResourcePath, ResourceSyncInfo};
use vcsync_core::ports::{
    CompareEvent, CompareOption, CompareRequest, FileClassification, IRepositoryConnection,
    ResponseStatus,
};

use crate::coordinator::SynchronizationCoordinator;
use crate::delta::{DeltaKind, DeltaMap, DeltaRecord};
use crate::remote::{join_path, NodeId, RemoteFile, RemoteFolder, RemoteNode, RemoteTree, SubtreeFailure};
use crate::SyncError;

type BoxFuture<'b, T> = Pin<Box<dyn Future<Output = T> + Send + 'b>>;

/// Parameters of a tree build
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Tag or date to compare against; `None` uses each folder's own tag
    pub tag: Option<EntryTag>,
    /// Maximum number of paths per status query
    pub batch_size: usize,
    /// Drop empty remote folders
    pub prune_empty: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            tag: None,
            batch_size: DEFAULT_REVISION_BATCH_SIZE,
            prune_empty: false,
        }
    }
}

impl BuildOptions {
    #[must_use]
    pub fn from_config(remote: &RemoteConfig) -> Self {
        Self {
            tag: None,
            batch_size: remote.revision_batch_size,
            prune_empty: remote.prune_empty_directories,
        }
    }

    #[must_use]
    pub fn with_tag(mut self, tag: Option<EntryTag>) -> Self {
        self.tag = tag;
        self
    }
}

/// Whether compare events come from the root query or a new-folder query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventScope {
    Root,
    NewFolder,
}

/// Builds a [`RemoteTree`] over one connection
pub struct RemoteTreeBuilder<'a> {
    coordinator: &'a mut SynchronizationCoordinator,
    connection: &'a mut dyn IRepositoryConnection,
    options: BuildOptions,
    cancel: CancellationToken,
    deltas: DeltaMap,
    /// Scopes fetched without the tag
    reduced: Vec<String>,
    changed_files: Vec<String>,
    root_missing: bool,
    pending_failures: Vec<SubtreeFailure>,
}

impl<'a> RemoteTreeBuilder<'a> {
    pub fn new(
        coordinator: &'a mut SynchronizationCoordinator,
        connection: &'a mut dyn IRepositoryConnection,
        options: BuildOptions,
    ) -> Self {
        Self {
            coordinator,
            connection,
            options,
            cancel: CancellationToken::new(),
            deltas: DeltaMap::new(),
            reduced: Vec::new(),
            changed_files: Vec::new(),
            root_missing: false,
            pending_failures: Vec::new(),
        }
    }

    /// Observe `token` for cooperative cancellation
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    // ------------------------------------------------------------------------
    // Entry points
    // ------------------------------------------------------------------------

    /// Build the remote tree for the managed folder `root`
    ///
    /// Returns `Ok(None)` when the folder does not exist remotely at the
    /// requested tag.
    #[instrument(skip(self), fields(root = %root))]
    pub async fn build_tree(mut self, root: &ResourcePath) -> Result<Option<RemoteTree>, SyncError> {
        let root_info = self
            .coordinator
            .folder_sync(root)?
            .ok_or_else(|| SyncError::NotVersioned(root.clone()))?;

        self.fetch_root_delta(root).await?;
        if self.root_missing {
            info!("remote folder does not exist at the requested tag");
            return Ok(None);
        }
        debug!(deltas = self.deltas.len(), "recorded compare events");

        let mut tree = RemoteTree::new(RemoteFolder::new(
            root.name(),
            root_info.repository(),
            root_info.root(),
            self.tag_for_remote_folder(&root_info),
        ));
        for failure in std::mem::take(&mut self.pending_failures) {
            tree.record_failure(failure.path, failure.message);
        }

        let tree_root = tree.root();
        self.build_folder(&mut tree, tree_root, String::new(), Some(root.clone()))
            .await?;
        self.fetch_file_revisions(&mut tree).await?;

        if tree.children(tree_root).is_empty() {
            if let Some(deepest) = deepest_failure(tree.failures()) {
                let scope = if deepest.path.is_empty() {
                    root.to_string()
                } else {
                    deepest.path.clone()
                };
                return Err(SyncError::Protocol {
                    scope,
                    message: deepest.message.clone(),
                });
            }
        }
        info!(
            files = tree.file_count(),
            folders = tree.folder_count(),
            failures = tree.failures().len(),
            "remote tree built"
        );
        Ok(Some(tree))
    }

    /// Remote state of a single managed file
    ///
    /// Returns `Ok(None)` when the file does not exist remotely.
    #[instrument(skip(self), fields(file = %file))]
    pub async fn build_remote_file(mut self, file: &ResourcePath) -> Result<Option<RemoteFile>, SyncError> {
        let parent = file
            .parent()
            .ok_or_else(|| SyncError::NotVersioned(file.clone()))?;
        let parent_info = self
            .coordinator
            .folder_sync(&parent)?
            .ok_or_else(|| SyncError::NotVersioned(parent.clone()))?;
        let base = self.coordinator.resource_sync(file)?;
        let name = file.name().to_string();

        let mut options = self.tag_options();
        options.retain(|o| *o != CompareOption::RetrieveAbsentDirectories);
        let response = self
            .connection
            .compare(&CompareRequest::new(name.clone(), options))
            .await?;
        match &response.status {
            ResponseStatus::Ok => {}
            ResponseStatus::NoSuchTag(_) => return Ok(None),
            ResponseStatus::ServerError(message) => {
                return Err(SyncError::Protocol {
                    scope: file.to_string(),
                    message: message.clone(),
                })
            }
        }
        for event in &response.events {
            self.check_cancelled()?;
            if let CompareEvent::File {
                path,
                classification,
            } = event
            {
                if normalize(path) == name {
                    self.record_file_event(&name, *classification, EventScope::Root);
                }
            }
        }

        let delta = self.deltas.get("", &name).copied();
        if delta.map(|d| d.kind) == Some(DeltaKind::Deleted) {
            return Ok(None);
        }
        let base_revision = base
            .as_ref()
            .filter(|b| !b.is_added() && !b.is_directory())
            .map(|b| b.revision().to_string());
        if delta.is_none() && base_revision.is_none() {
            return Ok(None);
        }

        let revision = if matches!(delta.map(|d| d.kind), Some(DeltaKind::Unknown | DeltaKind::Added)) {
            self.check_cancelled()?;
            let response = self
                .connection
                .status(std::slice::from_ref(&name), self.options.tag.as_ref())
                .await?;
            response
                .revisions
                .into_iter()
                .find(|(path, _)| normalize(path) == name)
                .map(|(_, revision)| revision)
        } else {
            base_revision
        };

        Ok(Some(RemoteFile {
            name,
            revision,
            keyword_mode: base.as_ref().map(|b| b.keyword_mode().clone()),
            tag: self
                .options
                .tag
                .clone()
                .or_else(|| base.as_ref().and_then(|b| b.tag().cloned()))
                .or_else(|| parent_info.tag().cloned()),
            classification: delta.and_then(|d| d.classification),
        }))
    }

    /// Tree of the revisions the working copy is based on, without any
    /// repository round trip
    pub fn build_base_tree(
        coordinator: &mut SynchronizationCoordinator,
        root: &ResourcePath,
    ) -> Result<Option<RemoteTree>, SyncError> {
        coordinator.run(|c| {
            let Some(info) = c.load_folder_sync(root)? else {
                return Ok(None);
            };
            let mut tree = RemoteTree::new(RemoteFolder::new(
                root.name(),
                info.repository(),
                info.root(),
                info.tag().cloned(),
            ));
            let node = tree.root();
            add_base_children(c, &mut tree, node, root)?;
            Ok(Some(tree))
        })
    }

    // ------------------------------------------------------------------------
    // Compare queries
    // ------------------------------------------------------------------------

    fn tag_options(&self) -> Vec<CompareOption> {
        let mut options = Vec::new();
        match &self.options.tag {
            Some(EntryTag::Head) => options.push(CompareOption::ClearSticky),
            Some(tag) => options.push(CompareOption::Tag(tag.clone())),
            None => {}
        }
        options.push(CompareOption::RetrieveAbsentDirectories);
        options
    }

    fn tag_for_remote_folder(&self, info: &FolderSyncInfo) -> Option<EntryTag> {
        self.options.tag.clone().or_else(|| info.tag().cloned())
    }

    fn check_cancelled(&self) -> Result<(), SyncError> {
        if self.cancel.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn fetch_root_delta(&mut self, root: &ResourcePath) -> Result<(), SyncError> {
        let request = CompareRequest::new(".", self.tag_options());
        let response = self.connection.compare(&request).await?;
        match response.status {
            ResponseStatus::Ok => self.record_events(&response.events, EventScope::Root),
            ResponseStatus::NoSuchTag(message) if self.options.tag.is_some() => {
                if self.local_subtree_has_files(root)? {
                    debug!(%message, "tag does not exist for the root folder");
                    self.root_missing = true;
                    return Ok(());
                }
                self.retry_without_tag("", &message, EventScope::Root).await
            }
            ResponseStatus::NoSuchTag(message) | ResponseStatus::ServerError(message) => {
                warn!(
                    %message,
                    events = response.events.len(),
                    "compare query failed, continuing from local state"
                );
                self.record_events(&response.events, EventScope::Root)?;
                self.pending_failures.push(SubtreeFailure {
                    path: String::new(),
                    message,
                });
                Ok(())
            }
        }
    }

    async fn fetch_new_folder(&mut self, scope: &str) -> Result<(), SyncError> {
        let request = CompareRequest::new(scope, self.tag_options());
        let response = self.connection.compare(&request).await?;
        match response.status {
            ResponseStatus::Ok => self.record_events(&response.events, EventScope::NewFolder),
            ResponseStatus::NoSuchTag(message) if self.options.tag.is_some() => {
                self.retry_without_tag(scope, &message, EventScope::NewFolder)
                    .await
            }
            ResponseStatus::NoSuchTag(message) | ResponseStatus::ServerError(message) => {
                self.record_events(&response.events, EventScope::NewFolder)?;
                Err(SyncError::Protocol {
                    scope: scope.to_string(),
                    message,
                })
            }
        }
    }

    async fn retry_without_tag(
        &mut self,
        scope: &str,
        message: &str,
        event_scope: EventScope,
    ) -> Result<(), SyncError> {
        info!(scope, message, "tag unknown for a folder-only subtree, retrying without it");
        let request = CompareRequest::new(
            if scope.is_empty() { "." } else { scope },
            vec![CompareOption::RetrieveAbsentDirectories],
        );
        let response = self.connection.compare(&request).await?;
        self.reduced.push(scope.to_string());
        self.record_events(&response.events, event_scope)?;
        match response.status {
            ResponseStatus::Ok => Ok(()),
            ResponseStatus::NoSuchTag(message) | ResponseStatus::ServerError(message) => {
                Err(SyncError::Protocol {
                    scope: scope.to_string(),
                    message,
                })
            }
        }
    }

    fn record_events(&mut self, events: &[CompareEvent], scope: EventScope) -> Result<(), SyncError> {
        for event in events {
            self.check_cancelled()?;
            match event {
                CompareEvent::NewDirectory(path) => {
                    let path = normalize(path);
                    if !path.is_empty() {
                        self.deltas.record(path, DeltaKind::NewFolder, None);
                    }
                }
                // a folder known only remotely has nothing local to delete
                CompareEvent::DirectoryMissing(_) if scope == EventScope::NewFolder => {}
                CompareEvent::DirectoryMissing(path) => {
                    let path = normalize(path);
                    if path.is_empty() {
                        self.root_missing = true;
                    } else {
                        self.deltas.record(path, DeltaKind::Deleted, None);
                    }
                }
                CompareEvent::File {
                    path,
                    classification,
                } => self.record_file_event(normalize(path), *classification, scope),
            }
        }
        Ok(())
    }

    fn record_file_event(&mut self, path: &str, classification: FileClassification, scope: EventScope) {
        let kind = match (classification, scope) {
            (FileClassification::LocallyAdded, _)
            | (FileClassification::RemotelyDeleted, EventScope::NewFolder) => return,
            (FileClassification::RemotelyDeleted, EventScope::Root) => DeltaKind::Deleted,
            (_, EventScope::NewFolder) => DeltaKind::Added,
            (
                FileClassification::RemoteChanged
                | FileClassification::Conflict
                | FileClassification::LocallyDeleted,
                EventScope::Root,
            ) => DeltaKind::Unknown,
        };
        self.deltas.record(path, kind, Some(classification));
    }

    fn is_reduced(&self, path: &str) -> bool {
        self.reduced.iter().any(|scope| {
            scope.is_empty()
                || path == scope
                || (path.starts_with(scope.as_str()) && path.as_bytes().get(scope.len()) == Some(&b'/'))
        })
    }

    /// Whether the managed subtree below `folder` holds any ordinary file
    fn local_subtree_has_files(&mut self, folder: &ResourcePath) -> Result<bool, SyncError> {
        for member in self.coordinator.members(folder)? {
            match &member {
                Resource::File(path) => {
                    if self.coordinator.sync_bytes(path)?.is_some() {
                        return Ok(true);
                    }
                }
                Resource::Folder(path) => {
                    if self.coordinator.folder_sync(path)?.is_some() && self.local_subtree_has_files(path)? {
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }

    // ------------------------------------------------------------------------
    // Assembly
    // ------------------------------------------------------------------------

    fn build_folder<'b>(
        &'b mut self,
        tree: &'b mut RemoteTree,
        node: NodeId,
        rel: String,
        local: Option<ResourcePath>,
    ) -> BoxFuture<'b, Result<(), SyncError>> {
        Box::pin(async move {
            self.check_cancelled()?;
            let (repository, remote_root, folder_tag) = match tree.folder(node) {
                Some(folder) => (folder.repository.clone(), folder.root.clone(), folder.tag.clone()),
                None => {
                    return Err(SyncError::CacheInconsistency(format!(
                        "remote node '{rel}' is not a folder"
                    )))
                }
            };

            let mut present: HashSet<String> = HashSet::new();
            let mut subfolders: Vec<(NodeId, String, Option<ResourcePath>)> = Vec::new();

            if let Some(local) = &local {
                for member in self.coordinator.members(local)? {
                    let name = member.name().to_string();
                    let delta = self.deltas.get(&rel, &name).copied();
                    if delta.map(|d| d.kind) == Some(DeltaKind::Deleted) {
                        continue;
                    }
                    match &member {
                        Resource::Folder(path) => {
                            let Some(info) = self.coordinator.folder_sync(path)? else {
                                continue;
                            };
                            if self.coordinator.sync_bytes(path)?.is_none() {
                                debug!(path = %path, "skipping orphaned subtree");
                                continue;
                            }
                            let folder = RemoteFolder::new(
                                name.as_str(),
                                info.repository(),
                                info.root(),
                                self.tag_for_remote_folder(&info),
                            );
                            let id = tree.insert(node, RemoteNode::Folder(folder))?;
                            subfolders.push((id, join_path(&rel, &name), Some(path.clone())));
                        }
                        Resource::File(path) => {
                            let Some(bytes) = self.coordinator.sync_bytes(path)? else {
                                continue;
                            };
                            let info = ResourceSyncInfo::from_bytes(&bytes)?;
                            if info.is_directory() {
                                continue;
                            }
                            if delta.is_none() && (info.is_added() || info.is_deleted()) {
                                continue;
                            }
                            let revision = match delta.map(|d| d.kind) {
                                Some(DeltaKind::Unknown | DeltaKind::Added) => None,
                                _ => Some(info.revision().to_string()),
                            };
                            let file = RemoteFile {
                                name: name.clone(),
                                revision,
                                keyword_mode: Some(info.keyword_mode().clone()),
                                tag: self.options.tag.clone().or_else(|| info.tag().cloned()),
                                classification: delta.and_then(|d| d.classification),
                            };
                            tree.insert(node, RemoteNode::File(file))?;
                        }
                    }
                    present.insert(name);
                }
            }

            let overlay: Vec<(String, DeltaRecord)> = self
                .deltas
                .children(&rel)
                .filter(|(name, _)| !present.contains(*name))
                .map(|(name, record)| (name.to_string(), *record))
                .collect();
            for (name, record) in overlay {
                let tag = self.options.tag.clone().or_else(|| folder_tag.clone());
                match record.kind {
                    DeltaKind::Deleted => {}
                    DeltaKind::NewFolder => {
                        let folder = RemoteFolder::new(
                            name.as_str(),
                            join_path(&repository, &name),
                            remote_root.as_str(),
                            tag,
                        );
                        let id = tree.insert(node, RemoteNode::Folder(folder))?;
                        subfolders.push((id, join_path(&rel, &name), None));
                    }
                    DeltaKind::Added | DeltaKind::Unknown => {
                        let file = RemoteFile {
                            name,
                            revision: None,
                            keyword_mode: None,
                            tag,
                            classification: record.classification,
                        };
                        tree.insert(node, RemoteNode::File(file))?;
                    }
                }
            }

            let unresolved: Vec<String> = tree
                .children(node)
                .iter()
                .filter(|id| tree.file(**id).is_some_and(|f| f.revision.is_none()))
                .map(|id| tree.path(*id).to_string())
                .filter(|path| !self.is_reduced(path))
                .collect();
            self.changed_files.extend(unresolved);

            for (id, child_rel, child_local) in subfolders {
                if child_local.is_none() {
                    if let Err(e) = self.fetch_new_folder(&child_rel).await {
                        if e.is_cancelled() {
                            return Err(e);
                        }
                        warn!(path = %child_rel, error = %e, "Failed to fetch new folder");
                        tree.record_failure(child_rel, e.to_string());
                        continue;
                    }
                }
                match self
                    .build_folder(tree, id, child_rel.clone(), child_local.clone())
                    .await
                {
                    Ok(()) => {}
                    Err(e) if e.is_cancelled() => return Err(e),
                    Err(e) => {
                        warn!(path = %child_rel, error = %e, "Failed to build remote subtree");
                        tree.record_failure(child_rel.clone(), e.to_string());
                    }
                }
                if self.options.prune_empty && self.should_prune(tree, id, child_local.as_ref())? {
                    debug!(path = %child_rel, "pruning empty remote folder");
                    let name = tree.node(id).name().to_string();
                    tree.remove_child(node, &name);
                }
            }
            Ok(())
        })
    }

    fn should_prune(
        &mut self,
        tree: &RemoteTree,
        id: NodeId,
        local: Option<&ResourcePath>,
    ) -> Result<bool, SyncError> {
        if !tree.children(id).is_empty() {
            return Ok(false);
        }
        let Some(local) = local else {
            return Ok(true);
        };
        if self.coordinator.members(local)?.is_empty() {
            return Ok(true);
        }
        match &self.options.tag {
            Some(tag) if !tag.is_head() => {
                let local_tag = self.coordinator.folder_sync(local)?.and_then(|i| i.tag().cloned());
                Ok(local_tag.as_ref() != Some(tag))
            }
            _ => Ok(false),
        }
    }

    // ------------------------------------------------------------------------
    // Revisions
    // ------------------------------------------------------------------------

    async fn fetch_file_revisions(&mut self, tree: &mut RemoteTree) -> Result<(), SyncError> {
        let files = std::mem::take(&mut self.changed_files);
        if files.is_empty() {
            return Ok(());
        }
        let batch_size = self.options.batch_size.max(1);
        let mut errors = Vec::new();
        for chunk in files.chunks(batch_size) {
            self.check_cancelled()?;
            debug!(count = chunk.len(), "fetching revisions");
            let response = self
                .connection
                .status(chunk, self.options.tag.as_ref())
                .await?;
            for (path, revision) in &response.revisions {
                if let Err(e) = tree.set_file_revision(normalize(path), revision) {
                    errors.push(e);
                }
            }
            if let ResponseStatus::NoSuchTag(message) | ResponseStatus::ServerError(message) =
                response.status
            {
                let unresolved: Vec<&String> = chunk
                    .iter()
                    .filter(|path| {
                        tree.find(path)
                            .and_then(|id| tree.file(id))
                            .is_some_and(|f| f.revision.is_none())
                    })
                    .collect();
                warn!(%message, unresolved = unresolved.len(), "status query failed");
                for path in unresolved {
                    tree.record_failure(path.clone(), message.clone());
                }
            }
        }
        SyncError::from_failures(errors)
    }
}

fn add_base_children(
    coordinator: &mut SynchronizationCoordinator,
    tree: &mut RemoteTree,
    node: NodeId,
    folder: &ResourcePath,
) -> Result<(), SyncError> {
    for member in coordinator.collect_members(folder)? {
        match &member {
            Resource::Folder(path) => {
                let Some(info) = coordinator.load_folder_sync(path)? else {
                    continue;
                };
                if coordinator.load_sync_bytes(path)?.is_none() {
                    continue;
                }
                let id = tree.insert(
                    node,
                    RemoteNode::Folder(RemoteFolder::new(
                        path.name(),
                        info.repository(),
                        info.root(),
                        info.tag().cloned(),
                    )),
                )?;
                add_base_children(coordinator, tree, id, path)?;
            }
            Resource::File(path) => {
                let Some(bytes) = coordinator.load_sync_bytes(path)? else {
                    continue;
                };
                let info = ResourceSyncInfo::from_bytes(&bytes)?;
                if info.is_directory() || info.is_added() {
                    continue;
                }
                let file = RemoteFile {
                    name: info.name().to_string(),
                    revision: Some(info.revision().to_string()),
                    keyword_mode: Some(info.keyword_mode().clone()),
                    tag: info.tag().cloned(),
                    classification: None,
                };
                tree.insert(node, RemoteNode::File(file))?;
            }
        }
    }
    Ok(())
}

fn normalize(path: &str) -> &str {
    let path = path.strip_prefix("./").unwrap_or(path);
    let path = path.trim_matches('/');
    if path == "." {
        ""
    } else {
        path
    }
}

fn deepest_failure(failures: &[SubtreeFailure]) -> Option<&SubtreeFailure> {
    failures
        .iter()
        .max_by_key(|f| f.path.split('/').filter(|s| !s.is_empty()).count())
}
