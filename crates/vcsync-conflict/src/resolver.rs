//! Sync classification and record transitions
//!
//! [`ConflictResolver::classify`] compares the local state of a resource and
//! its remote counterpart against the base record, the last revision both
//! sides agreed on. [`ConflictResolver::transition`] turns the resulting
//! classification into the change to apply to the base record.
//!
//! Content is never merged here: a conflicting file keeps its local content
//! and only its record moves to the remote revision.

use std::fmt;

use tracing::{debug, trace};

use vcsync_core::domain::{EntryTag, EntryTimestamp, FolderSyncInfo, KeywordMode, ResourceSyncInfo};

use crate::error::ConflictError;
use crate::policy::KeywordPolicy;

/// Which side changed relative to the base record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    /// Only the working copy changed
    Outgoing,
    /// Only the repository changed
    Incoming,
    /// Both sides changed
    Conflicting,
    /// Neither side changed, or both made the same change
    InSync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Addition,
    Deletion,
    Change,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncClassification {
    pub direction: SyncDirection,
    pub change: ChangeKind,
}

impl SyncClassification {
    #[must_use]
    pub const fn new(direction: SyncDirection, change: ChangeKind) -> Self {
        Self { direction, change }
    }

    #[must_use]
    pub const fn in_sync() -> Self {
        Self::new(SyncDirection::InSync, ChangeKind::Unchanged)
    }

    #[must_use]
    pub fn is_in_sync(&self) -> bool {
        self.direction == SyncDirection::InSync
    }
}

impl fmt::Display for SyncClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}-{:?}", self.direction, self.change)
    }
}

/// State of a resource in the working copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalState {
    pub name: String,
    pub exists: bool,
    /// Content differs from the base record
    pub modified: bool,
}

impl LocalState {
    pub fn present(name: impl Into<String>, modified: bool) -> Self {
        Self {
            name: name.into(),
            exists: true,
            modified,
        }
    }

    pub fn absent(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exists: false,
            modified: false,
        }
    }
}

/// State of a file in the repository
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RemoteState {
    /// `None` while the revision has not been fetched
    pub revision: Option<String>,
    pub keyword_mode: Option<KeywordMode>,
    pub tag: Option<EntryTag>,
}

impl RemoteState {
    pub fn at(revision: impl Into<String>) -> Self {
        Self {
            revision: Some(revision.into()),
            ..Self::default()
        }
    }
}

/// Change to apply to the sync record of a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTransition {
    /// Replace the record
    SetRecord(ResourceSyncInfo),
    /// Drop the record
    Unmanage,
    /// Content must be fetched first; the update step rewrites the record
    DeferToUpdate,
    /// Replace the mapping of a folder
    SetFolderSync(FolderSyncInfo),
    NoChange,
}

/// Classifies resources and computes their record transitions
#[derive(Debug, Clone, Default)]
pub struct ConflictResolver {
    policy: KeywordPolicy,
}

impl ConflictResolver {
    pub fn new(policy: KeywordPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &KeywordPolicy {
        &self.policy
    }

    /// Classify a file from its local state, base record and remote state
    pub fn classify(
        &self,
        local: &LocalState,
        base: Option<&ResourceSyncInfo>,
        remote: Option<&RemoteState>,
    ) -> SyncClassification {
        let local_changed = match base {
            None => local.exists,
            Some(b) => !local.exists || local.modified || b.is_added() || b.is_deleted(),
        };
        let remote_changed = match (base, remote) {
            (None, r) => r.is_some(),
            (Some(b), None) => !b.is_added(),
            (Some(b), Some(r)) => b.is_added() || r.revision.as_deref() != Some(b.revision()),
        };

        let locally_gone = !local.exists || base.is_some_and(ResourceSyncInfo::is_deleted);
        let classification = match (local_changed, remote_changed) {
            (false, false) => SyncClassification::in_sync(),
            // deleted on both sides
            (true, true) if locally_gone && remote.is_none() => SyncClassification::in_sync(),
            (true, false) => SyncClassification::new(
                SyncDirection::Outgoing,
                outgoing_change(local, base),
            ),
            (false, true) => SyncClassification::new(
                SyncDirection::Incoming,
                incoming_change(base, remote),
            ),
            (true, true) => SyncClassification::new(
                SyncDirection::Conflicting,
                conflicting_change(local, base, remote),
            ),
        };

        trace!(name = %local.name, %classification, "classified resource");
        classification
    }

    /// Record transition implied by `classification`
    ///
    /// `parent_tag` is the tag of the containing folder, recorded on new
    /// additions.
    pub fn transition(
        &self,
        local: &LocalState,
        base: Option<&ResourceSyncInfo>,
        remote: Option<&RemoteState>,
        classification: &SyncClassification,
        parent_tag: Option<&EntryTag>,
    ) -> Result<SyncTransition, ConflictError> {
        let transition = match classification.direction {
            SyncDirection::InSync => SyncTransition::NoChange,
            SyncDirection::Outgoing => self.outgoing(local, base, classification.change, parent_tag)?,
            SyncDirection::Incoming => incoming(local, classification.change),
            SyncDirection::Conflicting => self.conflicting(local, base, remote, parent_tag)?,
        };
        debug!(name = %local.name, %classification, ?transition, "computed sync transition");
        Ok(transition)
    }

    /// Mapping for a folder that is new in the repository
    ///
    /// Repository location and root come from the remote folder. Tag and
    /// static flag are inherited from the local parent.
    pub fn resolve_folder(
        &self,
        local_parent: &FolderSyncInfo,
        remote: &FolderSyncInfo,
    ) -> Result<FolderSyncInfo, ConflictError> {
        Ok(FolderSyncInfo::new(
            remote.repository(),
            remote.root(),
            local_parent.tag().cloned(),
            local_parent.is_static(),
        )?)
    }

    fn outgoing(
        &self,
        local: &LocalState,
        base: Option<&ResourceSyncInfo>,
        change: ChangeKind,
        parent_tag: Option<&EntryTag>,
    ) -> Result<SyncTransition, ConflictError> {
        let transition = match (change, base) {
            (ChangeKind::Addition, None) => SyncTransition::SetRecord(ResourceSyncInfo::new_addition(
                local.name.as_str(),
                self.policy.mode_for(&local.name),
                parent_tag.cloned(),
            )?),
            (ChangeKind::Deletion, Some(b)) if b.is_added() => SyncTransition::Unmanage,
            (ChangeKind::Deletion, Some(b)) if b.is_deleted() => SyncTransition::NoChange,
            (ChangeKind::Deletion, Some(b)) => SyncTransition::SetRecord(b.to_deletion()),
            (ChangeKind::Deletion, None) => {
                return Err(ConflictError::InvalidTransition(format!(
                    "outgoing deletion of unmanaged {}",
                    local.name
                )))
            }
            _ => SyncTransition::NoChange,
        };
        Ok(transition)
    }

    fn conflicting(
        &self,
        local: &LocalState,
        base: Option<&ResourceSyncInfo>,
        remote: Option<&RemoteState>,
        parent_tag: Option<&EntryTag>,
    ) -> Result<SyncTransition, ConflictError> {
        let Some(remote) = remote else {
            return Ok(SyncTransition::Unmanage);
        };
        let revision = remote
            .revision
            .as_deref()
            .ok_or_else(|| ConflictError::UnresolvedRevision(local.name.clone()))?;

        let target = match base {
            // keeps the old timestamp so the file stays modified
            Some(b) => b.from_deletion().with_revision(revision),
            None => ResourceSyncInfo::file(
                local.name.as_str(),
                revision,
                EntryTimestamp::Dummy,
                remote
                    .keyword_mode
                    .clone()
                    .unwrap_or_else(|| self.policy.mode_for(&local.name)),
                remote.tag.clone().or_else(|| parent_tag.cloned()),
            )?,
        };
        let target = if local.exists {
            target
        } else {
            target.to_deletion()
        };
        Ok(SyncTransition::SetRecord(target))
    }
}

fn incoming(local: &LocalState, change: ChangeKind) -> SyncTransition {
    match change {
        ChangeKind::Deletion | ChangeKind::Addition if !local.exists => SyncTransition::Unmanage,
        _ => SyncTransition::DeferToUpdate,
    }
}

fn outgoing_change(local: &LocalState, base: Option<&ResourceSyncInfo>) -> ChangeKind {
    match base {
        None => ChangeKind::Addition,
        Some(b) if !local.exists || b.is_deleted() => ChangeKind::Deletion,
        Some(b) if b.is_added() => ChangeKind::Addition,
        Some(_) => ChangeKind::Change,
    }
}

fn incoming_change(base: Option<&ResourceSyncInfo>, remote: Option<&RemoteState>) -> ChangeKind {
    match (base, remote) {
        (_, None) => ChangeKind::Deletion,
        (None, Some(_)) => ChangeKind::Addition,
        (Some(_), Some(_)) => ChangeKind::Change,
    }
}

fn conflicting_change(
    local: &LocalState,
    base: Option<&ResourceSyncInfo>,
    remote: Option<&RemoteState>,
) -> ChangeKind {
    if !local.exists || remote.is_none() || base.is_some_and(ResourceSyncInfo::is_deleted) {
        ChangeKind::Deletion
    } else if base.map_or(true, ResourceSyncInfo::is_added) {
        ChangeKind::Addition
    } else {
        ChangeKind::Change
    }
}
