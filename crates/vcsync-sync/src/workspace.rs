//! Local filesystem working copy (secondary/driven adapter)
//!
//! Implements [`IWorkingCopy`] with `std::fs` against a working-copy root
//! directory. The metadata directory of every folder is hidden from member
//! listings.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{trace, warn};

use vcsync_core::domain::{Resource, ResourceKind, ResourcePath};
use vcsync_core::ports::IWorkingCopy;

/// Working copy rooted at a directory on disk
#[derive(Debug, Clone)]
pub struct LocalWorkingCopy {
    root: PathBuf,
    metadata_dir: String,
}

impl LocalWorkingCopy {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, metadata_dir: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            metadata_dir: metadata_dir.into(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn fs_path(&self, path: &ResourcePath) -> PathBuf {
        path.to_fs_path(&self.root)
    }
}

impl IWorkingCopy for LocalWorkingCopy {
    fn kind(&self, path: &ResourcePath) -> Option<ResourceKind> {
        match fs::metadata(self.fs_path(path)) {
            Ok(meta) if meta.is_dir() => Some(ResourceKind::Folder),
            Ok(_) => Some(ResourceKind::File),
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    trace!(path = %path, error = %e, "treating unreadable resource as absent");
                }
                None
            }
        }
    }

    fn members(&self, folder: &ResourcePath) -> anyhow::Result<Vec<Resource>> {
        let dir = self.fs_path(folder);
        let reader =
            fs::read_dir(&dir).with_context(|| format!("Failed to list {}", dir.display()))?;

        let mut members = Vec::new();
        for entry in reader {
            let entry = entry.with_context(|| format!("Failed to list {}", dir.display()))?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!(path = ?entry.path(), "Skipping non UTF-8 file name");
                continue;
            };
            if name == self.metadata_dir {
                continue;
            }
            let child = folder.join(&name)?;
            let is_dir = fs::metadata(entry.path()).map(|m| m.is_dir()).unwrap_or(false);
            members.push(if is_dir {
                Resource::Folder(child)
            } else {
                Resource::File(child)
            });
        }
        members.sort_by(|a, b| a.path().cmp(b.path()));
        Ok(members)
    }

    fn modification_time(&self, file: &ResourcePath) -> anyhow::Result<Option<DateTime<Utc>>> {
        let path = self.fs_path(file);
        let metadata = match fs::metadata(&path) {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to stat {}", path.display())),
        };
        let modified = metadata.modified().ok().and_then(|st| {
            st.duration_since(std::time::UNIX_EPOCH)
                .ok()
                .and_then(|dur| DateTime::from_timestamp(dur.as_secs() as i64, 0))
        });
        Ok(modified)
    }

    fn is_linked(&self, folder: &ResourcePath) -> bool {
        fs::symlink_metadata(self.fs_path(folder))
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }
}
