//! Per-parent delta map
//!
//! Records what compare queries reported about each child name of each
//! folder. The first [`DeltaKind::Deleted`] recorded for a name is final: a
//! later event for the same name never turns a deletion back into something
//! else.

use std::collections::{BTreeMap, HashMap};

use tracing::trace;

use vcsync_core::ports::FileClassification;

use crate::remote::split_path;

/// What is known about a child from compare responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaKind {
    /// Changed remotely; the revision must be fetched
    Unknown,
    /// Gone from the repository
    Deleted,
    /// Present remotely only, found while querying a new folder
    Added,
    /// A folder present remotely only
    NewFolder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaRecord {
    pub kind: DeltaKind,
    pub classification: Option<FileClassification>,
}

/// Delta records keyed by parent path, then child name
#[derive(Debug, Default, Clone)]
pub struct DeltaMap {
    entries: HashMap<String, BTreeMap<String, DeltaRecord>>,
}

impl DeltaMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `kind` for the resource at `path`
    ///
    /// Returns `false` when an earlier deletion of the same name was kept.
    pub fn record(
        &mut self,
        path: &str,
        kind: DeltaKind,
        classification: Option<FileClassification>,
    ) -> bool {
        let (parent, name) = split_path(path.trim_matches('/'));
        let children = self.entries.entry(parent.to_string()).or_default();
        if let Some(existing) = children.get(name) {
            if existing.kind == DeltaKind::Deleted && kind != DeltaKind::Deleted {
                trace!(path, ?kind, "keeping earlier deletion");
                return false;
            }
        }
        children.insert(
            name.to_string(),
            DeltaRecord {
                kind,
                classification,
            },
        );
        true
    }

    #[must_use]
    pub fn get(&self, parent: &str, name: &str) -> Option<&DeltaRecord> {
        self.entries.get(parent).and_then(|children| children.get(name))
    }

    #[must_use]
    pub fn kind(&self, parent: &str, name: &str) -> Option<DeltaKind> {
        self.get(parent, name).map(|r| r.kind)
    }

    /// Records for the children of `parent`, ordered by name
    pub fn children<'a>(&'a self, parent: &str) -> impl Iterator<Item = (&'a str, &'a DeltaRecord)> + 'a {
        self.entries
            .get(parent)
            .into_iter()
            .flat_map(|children| children.iter().map(|(k, v)| (k.as_str(), v)))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.values().all(BTreeMap::is_empty)
    }

    /// Total number of recorded names
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }
}
