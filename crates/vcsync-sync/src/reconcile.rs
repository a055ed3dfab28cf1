//! Reconciliation of a remote tree against local records
//!
//! The [`Reconciler`] walks a managed folder and the matching remote tree
//! side by side, classifies every resource that differs and applies the
//! resulting record transitions inside a single coordinator operation, so
//! each affected folder is written once.
//!
//! Subtrees the remote tree failed to build are only classified for the
//! resources the tree does contain: a missing remote node there means
//! "unknown", not "deleted". Files whose remote revision was never resolved
//! are left out of the plan.

use std::collections::BTreeMap;

use tracing::{debug, info, instrument, warn};

use vcsync_conflict::{
    ConflictResolver, LocalState, RemoteState, SyncClassification, SyncTransition,
};
use vcsync_core::domain::{
    FolderSyncInfo, Resource, ResourceKind, ResourcePath, ResourceSyncInfo,
};

use crate::coordinator::SynchronizationCoordinator;
use crate::remote::{join_path, NodeId, RemoteTree};
use crate::SyncError;

/// A resource whose record should change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileEntry {
    pub resource: Resource,
    pub classification: SyncClassification,
    pub transition: SyncTransition,
}

/// Plans and applies record transitions for a managed subtree
pub struct Reconciler<'a> {
    coordinator: &'a mut SynchronizationCoordinator,
    resolver: &'a ConflictResolver,
}

/// Position in the remote tree matching the folder being walked
#[derive(Clone, Copy)]
struct RemoteCursor<'t> {
    tree: &'t RemoteTree,
    node: Option<NodeId>,
    failed: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new(coordinator: &'a mut SynchronizationCoordinator, resolver: &'a ConflictResolver) -> Self {
        Self {
            coordinator,
            resolver,
        }
    }

    /// Classify every resource below `root` against `remote`
    ///
    /// `remote` is `None` when `root` does not exist in the repository.
    /// Resources in sync are left out of the plan.
    #[instrument(skip(self, remote), fields(root = %root))]
    pub fn plan(
        &mut self,
        root: &ResourcePath,
        remote: Option<&RemoteTree>,
    ) -> Result<Vec<ReconcileEntry>, SyncError> {
        let resolver = self.resolver;
        self.coordinator.run(|c| {
            let info = c
                .load_folder_sync(root)?
                .ok_or_else(|| SyncError::NotVersioned(root.clone()))?;
            let cursor = remote.map(|tree| RemoteCursor {
                tree,
                node: Some(tree.root()),
                failed: is_failed(tree, ""),
            });
            let mut entries = Vec::new();
            plan_folder(c, resolver, root, &info, String::new(), cursor, &mut entries)?;
            debug!(entries = entries.len(), "reconciliation planned");
            Ok(entries)
        })
    }

    /// Apply the transitions of `entries` in one operation
    ///
    /// Returns the number of records changed. Deferred entries are skipped.
    #[instrument(skip_all, fields(entries = entries.len()))]
    pub fn apply(&mut self, entries: &[ReconcileEntry]) -> Result<usize, SyncError> {
        self.coordinator.run(|c| {
            let mut applied = 0;
            for entry in entries {
                match &entry.transition {
                    SyncTransition::SetRecord(info) => c.set_resource_sync(&entry.resource, info)?,
                    SyncTransition::Unmanage => c.delete_resource_sync(&entry.resource)?,
                    SyncTransition::SetFolderSync(info) => {
                        let folder = entry.resource.as_folder()?;
                        c.set_folder_sync(folder, info.clone())?;
                        let record = ResourceSyncInfo::folder(folder.name())?;
                        c.set_sync_bytes(&entry.resource, record.to_bytes())?;
                    }
                    SyncTransition::DeferToUpdate | SyncTransition::NoChange => continue,
                }
                applied += 1;
            }
            info!(applied, "reconciliation applied");
            Ok(applied)
        })
    }

    /// [`Self::plan`] followed by [`Self::apply`]
    pub fn reconcile(
        &mut self,
        root: &ResourcePath,
        remote: Option<&RemoteTree>,
    ) -> Result<Vec<ReconcileEntry>, SyncError> {
        let entries = self.plan(root, remote)?;
        self.apply(&entries)?;
        Ok(entries)
    }
}

fn is_failed(tree: &RemoteTree, rel: &str) -> bool {
    tree.failures().iter().any(|f| {
        f.path == rel
            || (!f.path.is_empty()
                && rel.starts_with(f.path.as_str())
                && rel.as_bytes().get(f.path.len()) == Some(&b'/'))
    })
}

fn plan_folder(
    c: &mut SynchronizationCoordinator,
    resolver: &ConflictResolver,
    folder: &ResourcePath,
    info: &FolderSyncInfo,
    rel: String,
    remote: Option<RemoteCursor<'_>>,
    entries: &mut Vec<ReconcileEntry>,
) -> Result<(), SyncError> {
    // name -> (local member, remote node)
    let mut names: BTreeMap<String, (Option<Resource>, Option<NodeId>)> = BTreeMap::new();
    for member in c.collect_members(folder)? {
        let key = member.name().to_string();
        names.entry(key).or_default().0 = Some(member);
    }
    if let Some(RemoteCursor { tree, node: Some(node), .. }) = remote {
        for child in tree.children(node) {
            names.entry(tree.node(*child).name().to_string()).or_default().1 = Some(*child);
        }
    }

    for (name, (local, remote_node)) in names {
        let path = folder.join(&name)?;
        let child_rel = join_path(&rel, &name);
        let child_cursor = remote.map(|cursor| RemoteCursor {
            tree: cursor.tree,
            node: remote_node,
            failed: cursor.failed || is_failed(cursor.tree, &child_rel),
        });
        if remote_node.is_none() && remote.map_or(false, |cursor| cursor.failed) {
            debug!(path = %path, "remote state unknown, skipping");
            continue;
        }

        let remote_kind = match (remote, remote_node) {
            (Some(cursor), Some(id)) => Some(if cursor.tree.folder(id).is_some() {
                ResourceKind::Folder
            } else {
                ResourceKind::File
            }),
            _ => None,
        };
        let kind = local
            .as_ref()
            .map(Resource::kind)
            .or(remote_kind)
            .unwrap_or(ResourceKind::File);
        if remote_kind.is_some_and(|k| k != kind) {
            warn!(path = %path, "local and remote kinds differ, skipping");
            continue;
        }

        match kind {
            ResourceKind::Folder => {
                plan_child_folder(c, resolver, &path, info, child_rel, child_cursor, entries)?
            }
            ResourceKind::File => {
                let remote_state = match (remote, remote_node) {
                    (Some(cursor), Some(id)) => cursor.tree.file(id).map(|f| RemoteState {
                        revision: f.revision.clone(),
                        keyword_mode: f.keyword_mode.clone(),
                        tag: f.tag.clone(),
                    }),
                    _ => None,
                };
                if remote_state.as_ref().is_some_and(|r| r.revision.is_none()) {
                    warn!(path = %path, "remote revision unresolved, deferring");
                    continue;
                }
                plan_file(c, resolver, &path, info, remote_state, entries)?
            }
        }
    }
    Ok(())
}

fn plan_child_folder(
    c: &mut SynchronizationCoordinator,
    resolver: &ConflictResolver,
    path: &ResourcePath,
    parent_info: &FolderSyncInfo,
    rel: String,
    remote: Option<RemoteCursor<'_>>,
    entries: &mut Vec<ReconcileEntry>,
) -> Result<(), SyncError> {
    if let Some(local_info) = c.load_folder_sync(path)? {
        return plan_folder(c, resolver, path, &local_info, rel, remote, entries);
    }

    let remote_folder = remote.and_then(|cursor| cursor.node.and_then(|id| cursor.tree.folder(id)));
    let Some(remote_folder) = remote_folder else {
        // unmanaged local folder
        return Ok(());
    };
    let remote_info = FolderSyncInfo::new(
        remote_folder.repository.as_str(),
        remote_folder.root.as_str(),
        remote_folder.tag.clone(),
        false,
    )?;
    let resolved = resolver.resolve_folder(parent_info, &remote_info)?;
    entries.push(ReconcileEntry {
        resource: Resource::Folder(path.clone()),
        classification: SyncClassification::in_sync(),
        transition: SyncTransition::SetFolderSync(resolved),
    });
    Ok(())
}

fn plan_file(
    c: &mut SynchronizationCoordinator,
    resolver: &ConflictResolver,
    path: &ResourcePath,
    parent_info: &FolderSyncInfo,
    remote: Option<RemoteState>,
    entries: &mut Vec<ReconcileEntry>,
) -> Result<(), SyncError> {
    let resource = Resource::File(path.clone());
    let base = match c.load_sync_bytes(path)? {
        Some(bytes) => Some(ResourceSyncInfo::from_bytes(&bytes)?),
        None => None,
    };
    if base.is_none() && remote.is_none() && c.check_ignored(path)? {
        return Ok(());
    }

    let exists = c.working_copy.kind(path) == Some(ResourceKind::File);
    let modified = exists && base.is_some() && c.is_modified(&resource)?;
    let local = LocalState {
        name: path.name().to_string(),
        exists,
        modified,
    };

    let classification = resolver.classify(&local, base.as_ref(), remote.as_ref());
    if classification.is_in_sync() {
        return Ok(());
    }
    let transition = resolver.transition(
        &local,
        base.as_ref(),
        remote.as_ref(),
        &classification,
        parent_info.tag(),
    )?;
    entries.push(ReconcileEntry {
        resource,
        classification,
        transition,
    });
    Ok(())
}
