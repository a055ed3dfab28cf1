//! Remote tree model
//!
//! A [`RemoteTree`] describes the repository state of a folder subtree at a
//! tag: folders with their mapping, files with their revision. Nodes live
//! in an arena and are addressed by [`NodeId`]; every node also has a
//! `/`-separated path relative to the tree root, which is how status
//! responses refer to files.
//!
//! A file revision of `None` means "changed remotely, revision not yet
//! fetched" or, for subtrees built at reduced fidelity, "unknown".

use std::collections::HashMap;

use vcsync_core::domain::{EntryTag, KeywordMode};
use vcsync_core::ports::FileClassification;

use crate::SyncError;

/// Index of a node in its tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// A folder as it exists in the repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFolder {
    pub name: String,
    /// Repository-relative path
    pub repository: String,
    /// Connection specification of the repository root
    pub root: String,
    pub tag: Option<EntryTag>,
    children: Vec<NodeId>,
}

impl RemoteFolder {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        repository: impl Into<String>,
        root: impl Into<String>,
        tag: Option<EntryTag>,
    ) -> Self {
        Self {
            name: name.into(),
            repository: repository.into(),
            root: root.into(),
            tag,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// A file as it exists in the repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub name: String,
    pub revision: Option<String>,
    pub keyword_mode: Option<KeywordMode>,
    pub tag: Option<EntryTag>,
    /// What the compare query reported, if anything
    pub classification: Option<FileClassification>,
}

impl RemoteFile {
    #[must_use]
    pub fn new(name: impl Into<String>, revision: Option<String>) -> Self {
        Self {
            name: name.into(),
            revision,
            keyword_mode: None,
            tag: None,
            classification: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteNode {
    Folder(RemoteFolder),
    File(RemoteFile),
}

impl RemoteNode {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            RemoteNode::Folder(f) => &f.name,
            RemoteNode::File(f) => &f.name,
        }
    }

    #[must_use]
    pub fn as_folder(&self) -> Option<&RemoteFolder> {
        match self {
            RemoteNode::Folder(f) => Some(f),
            RemoteNode::File(_) => None,
        }
    }

    #[must_use]
    pub fn as_file(&self) -> Option<&RemoteFile> {
        match self {
            RemoteNode::File(f) => Some(f),
            RemoteNode::Folder(_) => None,
        }
    }
}

/// A subtree that could not be fetched and was left empty
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtreeFailure {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone)]
struct Slot {
    node: RemoteNode,
    parent: Option<NodeId>,
    path: String,
}

/// Arena-backed tree of remote folders and files
#[derive(Debug, Clone)]
pub struct RemoteTree {
    slots: Vec<Slot>,
    by_path: HashMap<String, NodeId>,
    failures: Vec<SubtreeFailure>,
}

impl RemoteTree {
    /// Create a tree holding only `root`
    #[must_use]
    pub fn new(root: RemoteFolder) -> Self {
        let mut tree = Self {
            slots: Vec::new(),
            by_path: HashMap::new(),
            failures: Vec::new(),
        };
        tree.slots.push(Slot {
            node: RemoteNode::Folder(RemoteFolder {
                children: Vec::new(),
                ..root
            }),
            parent: None,
            path: String::new(),
        });
        tree.by_path.insert(String::new(), NodeId(0));
        tree
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &RemoteNode {
        &self.slots[id.0].node
    }

    /// Path of `id` relative to the root (empty for the root)
    #[must_use]
    pub fn path(&self, id: NodeId) -> &str {
        &self.slots[id.0].path
    }

    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slots[id.0].parent
    }

    #[must_use]
    pub fn find(&self, path: &str) -> Option<NodeId> {
        self.by_path.get(path.trim_matches('/')).copied()
    }

    /// Children of a folder node, in insertion order
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.slots[id.0].node {
            RemoteNode::Folder(folder) => folder.children(),
            RemoteNode::File(_) => &[],
        }
    }

    #[must_use]
    pub fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|id| self.node(*id).name() == name)
    }

    #[must_use]
    pub fn folder(&self, id: NodeId) -> Option<&RemoteFolder> {
        self.node(id).as_folder()
    }

    #[must_use]
    pub fn file(&self, id: NodeId) -> Option<&RemoteFile> {
        self.node(id).as_file()
    }

    /// Attach `node` below the folder `parent`, replacing a same-named child
    pub fn insert(&mut self, parent: NodeId, node: RemoteNode) -> Result<NodeId, SyncError> {
        let parent_path = match &self.slots[parent.0].node {
            RemoteNode::Folder(_) => self.slots[parent.0].path.clone(),
            RemoteNode::File(f) => {
                return Err(SyncError::CacheInconsistency(format!(
                    "cannot attach '{}' below file '{}'",
                    node.name(),
                    f.name
                )))
            }
        };
        self.remove_child(parent, node.name());

        let path = join_path(&parent_path, node.name());
        let id = NodeId(self.slots.len());
        self.slots.push(Slot {
            node,
            parent: Some(parent),
            path: path.clone(),
        });
        self.by_path.insert(path, id);
        if let RemoteNode::Folder(folder) = &mut self.slots[parent.0].node {
            folder.children.push(id);
        }
        Ok(id)
    }

    /// Detach the child `name` of `parent`; returns whether one was removed
    ///
    /// The detached subtree stays in the arena but is no longer reachable.
    pub fn remove_child(&mut self, parent: NodeId, name: &str) -> bool {
        let Some(id) = self.child(parent, name) else {
            return false;
        };
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            stack.extend_from_slice(self.children(current));
            let path = self.slots[current.0].path.clone();
            self.by_path.remove(&path);
        }
        if let RemoteNode::Folder(folder) = &mut self.slots[parent.0].node {
            folder.children.retain(|c| *c != id);
        }
        true
    }

    /// Set the revision of the file at `path`
    ///
    /// Fails when the parent folder or the file itself is not in the tree.
    pub fn set_file_revision(&mut self, path: &str, revision: &str) -> Result<(), SyncError> {
        let path = path.trim_matches('/');
        let (parent_path, name) = split_path(path);
        if self.find(parent_path).and_then(|id| self.folder(id)).is_none() {
            return Err(SyncError::CacheInconsistency(format!(
                "no remote folder '{parent_path}' for file '{path}'"
            )));
        }
        let id = self.find(path).ok_or_else(|| {
            SyncError::CacheInconsistency(format!("no remote file '{path}'"))
        })?;
        match &mut self.slots[id.0].node {
            RemoteNode::File(file) => {
                file.revision = Some(revision.to_string());
                Ok(())
            }
            RemoteNode::Folder(_) => Err(SyncError::CacheInconsistency(format!(
                "'{path}' is a folder, not a file"
            ))),
        }
    }

    pub(crate) fn record_failure(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.failures.push(SubtreeFailure {
            path: path.into(),
            message: message.into(),
        });
    }

    /// Subtrees that were left empty because fetching them failed
    #[must_use]
    pub fn failures(&self) -> &[SubtreeFailure] {
        &self.failures
    }

    /// Whether the whole tree was built
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Reachable nodes in depth-first order, root first
    #[must_use]
    pub fn walk(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        order
    }

    /// Reachable files with their paths
    pub fn files(&self) -> impl Iterator<Item = (&str, &RemoteFile)> + '_ {
        self.walk()
            .into_iter()
            .filter_map(move |id| self.file(id).map(|f| (self.path(id), f)))
    }

    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files().count()
    }

    #[must_use]
    pub fn folder_count(&self) -> usize {
        self.walk().into_iter().filter(|id| self.folder(*id).is_some()).count()
    }
}

pub(crate) fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

/// Split `a/b/c` into (`a/b`, `c`); top-level names have an empty parent
pub(crate) fn split_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}
