//! Status command - Display dirty state and sync records
//!
//! Provides the `vcsync status` CLI command which:
//! 1. Shows the state of a single file when a file path is given
//! 2. Shows a folder and its members otherwise, descending with `--recursive`

use anyhow::{bail, Context as _, Result};
use clap::Args;
use serde::Serialize;
use tracing::info;

use vcsync_core::domain::{DirtyIndicator, Resource, ResourceKind, ResourcePath};
use vcsync_sync::{SyncError, SynchronizationCoordinator};

use super::{parse_resource_path, Context};
use crate::output::OutputFormat;

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// File or folder to inspect, relative to the working-copy root
    pub path: Option<String>,

    /// Descend into subfolders
    #[arg(short, long)]
    pub recursive: bool,
}

/// How the working copy records a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    Unmanaged,
    Ignored,
    Added,
    Deleted,
    Managed,
}

impl RecordState {
    /// One-column marker used in human output
    pub(crate) fn label(self) -> &'static str {
        match self {
            RecordState::Unmanaged => "?",
            RecordState::Ignored => "I",
            RecordState::Added => "A",
            RecordState::Deleted => "R",
            RecordState::Managed => " ",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusRow {
    pub path: String,
    pub kind: ResourceKind,
    pub state: RecordState,
    pub dirty: DirtyIndicator,
    pub revision: Option<String>,
    pub tag: Option<String>,
}

impl StatusCommand {
    pub async fn execute(&self, context: &Context, format: OutputFormat) -> Result<()> {
        let formatter = context.formatter(format);
        let target = parse_resource_path(self.path.as_deref().unwrap_or("."))?;
        let mut coordinator = context.coordinator();

        info!(path = %target, recursive = self.recursive, "Showing status");
        let rows = collect_status(&mut coordinator, &target, self.recursive)
            .with_context(|| format!("Failed to read the status of '{target}'"))?;

        formatter.status(&rows);
        Ok(())
    }
}

/// Status rows for `target` and, for a folder, its members
pub fn collect_status(
    coordinator: &mut SynchronizationCoordinator,
    target: &ResourcePath,
    recursive: bool,
) -> Result<Vec<StatusRow>> {
    let kind = match coordinator.working_copy().kind(target) {
        Some(kind) => kind,
        None if coordinator.resource_sync(target)?.is_some() => ResourceKind::File,
        None => bail!("'{target}' does not exist"),
    };
    let mut rows = Vec::new();
    match kind {
        ResourceKind::File => rows.push(file_row(coordinator, target)?),
        ResourceKind::Folder => {
            rows.push(folder_row(coordinator, target)?);
            collect_folder(coordinator, target, recursive, &mut rows)?;
        }
    }
    Ok(rows)
}

fn collect_folder(
    coordinator: &mut SynchronizationCoordinator,
    folder: &ResourcePath,
    recursive: bool,
    rows: &mut Vec<StatusRow>,
) -> Result<(), SyncError> {
    for member in coordinator.members(folder)? {
        match &member {
            Resource::File(path) => rows.push(file_row(coordinator, path)?),
            Resource::Folder(path) => {
                let row = folder_row(coordinator, path)?;
                let descend = recursive && row.state == RecordState::Managed;
                rows.push(row);
                if descend {
                    collect_folder(coordinator, path, recursive, rows)?;
                }
            }
        }
    }
    Ok(())
}

fn file_row(
    coordinator: &mut SynchronizationCoordinator,
    path: &ResourcePath,
) -> Result<StatusRow, SyncError> {
    let record = coordinator.resource_sync(path)?;
    let state = match &record {
        None if coordinator.is_ignored(path)? => RecordState::Ignored,
        None => RecordState::Unmanaged,
        Some(r) if r.is_added() => RecordState::Added,
        Some(r) if r.is_deleted() => RecordState::Deleted,
        Some(_) => RecordState::Managed,
    };
    let dirty = coordinator.dirty_indicator(&Resource::File(path.clone()))?;
    Ok(StatusRow {
        path: path.to_string(),
        kind: ResourceKind::File,
        state,
        dirty,
        revision: record.as_ref().map(|r| r.entry_revision()),
        tag: record.as_ref().and_then(|r| r.tag()).map(ToString::to_string),
    })
}

fn folder_row(
    coordinator: &mut SynchronizationCoordinator,
    path: &ResourcePath,
) -> Result<StatusRow, SyncError> {
    let mapping = coordinator.folder_sync(path)?;
    let state = match &mapping {
        Some(_) => RecordState::Managed,
        None if coordinator.is_ignored(path)? => RecordState::Ignored,
        None => RecordState::Unmanaged,
    };
    let dirty = coordinator.dirty_indicator(&Resource::Folder(path.clone()))?;
    Ok(StatusRow {
        path: path.to_string(),
        kind: ResourceKind::Folder,
        state,
        dirty,
        revision: None,
        tag: mapping.as_ref().and_then(|m| m.tag()).map(ToString::to_string),
    })
}
