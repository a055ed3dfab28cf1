//! Entries command - Print the decoded sync records of a managed folder

use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;
use tracing::info;

use vcsync_core::domain::{EntryTimestamp, ResourcePath, ResourceSyncInfo};
use vcsync_sync::{SyncError, SynchronizationCoordinator};

use super::{parse_resource_path, Context};
use crate::output::OutputFormat;

#[derive(Debug, Args)]
pub struct EntriesCommand {
    /// Managed folder, relative to the working-copy root
    pub folder: String,
}

/// One decoded record
#[derive(Debug, Clone, Serialize)]
pub struct EntryRow {
    pub name: String,
    pub directory: bool,
    pub revision: String,
    pub timestamp: Option<String>,
    pub keyword_mode: String,
    pub tag: Option<String>,
    pub line: String,
}

/// A managed folder's mapping and records
#[derive(Debug, Clone, Serialize)]
pub struct EntryListing {
    pub folder: String,
    pub location: String,
    pub repository: String,
    pub root: String,
    pub tag: Option<String>,
    #[serde(rename = "static")]
    pub is_static: bool,
    pub entries: Vec<EntryRow>,
}

impl From<&ResourceSyncInfo> for EntryRow {
    fn from(info: &ResourceSyncInfo) -> Self {
        let timestamp = match info.timestamp() {
            EntryTimestamp::Empty => None,
            other => Some(other.to_entry_line()),
        };
        Self {
            name: info.name().to_string(),
            directory: info.is_directory(),
            revision: info.entry_revision(),
            timestamp,
            keyword_mode: info.keyword_mode().to_string(),
            tag: info.tag().map(ToString::to_string),
            line: info.to_entry_line(),
        }
    }
}

impl EntriesCommand {
    pub async fn execute(&self, context: &Context, format: OutputFormat) -> Result<()> {
        let formatter = context.formatter(format);
        let folder = parse_resource_path(&self.folder)?;
        let mut coordinator = context.coordinator();

        let Some(mapping) = coordinator.folder_sync(&folder)? else {
            bail!("'{folder}' is not under version control");
        };
        info!(path = %folder, repository = %mapping.repository(), "Listing entries");
        let rows = collect_entries(&mut coordinator, &folder)?;

        let listing = EntryListing {
            folder: folder.to_string(),
            location: mapping.remote_location(),
            repository: mapping.repository().to_string(),
            root: mapping.root().to_string(),
            tag: mapping.tag().map(ToString::to_string),
            is_static: mapping.is_static(),
            entries: rows,
        };
        formatter.entries(&listing);
        Ok(())
    }
}

/// Records of the members of `folder`, including deleted ones
pub fn collect_entries(
    coordinator: &mut SynchronizationCoordinator,
    folder: &ResourcePath,
) -> Result<Vec<EntryRow>, SyncError> {
    let mut rows = Vec::new();
    for member in coordinator.members(folder)? {
        if let Some(info) = coordinator.resource_sync(member.path())? {
            rows.push(EntryRow::from(&info));
        }
    }
    Ok(rows)
}
