//! File-backed sync store (secondary/driven adapter)
//!
//! Implements [`ISyncStore`] on top of a metadata directory inside every
//! managed folder:
//!
//! ```text
//! <folder>/<metadata_dir>/Entries         one record line per managed child
//! <folder>/<metadata_dir>/Root            root location
//! <folder>/<metadata_dir>/Repository      repository-relative path
//! <folder>/<metadata_dir>/Tag             optional sticky tag
//! <folder>/<metadata_dir>/Entries.Static  present when the folder is static
//! <folder>/<ignore_file>                  one ignore glob per line
//! ```
//!
//! ## Design Decisions
//!
//! - **Atomic writes**: every file is written to a temporary sibling and
//!   renamed into place.
//! - **Lock marker**: while `Entries.lock` exists another writer is rewriting
//!   the folder. Whole-folder loads fail with [`StoreError::Locked`];
//!   single-record peeks still read the current file.
//! - A lone `D` line in `Entries` means "no subfolder entries" and is
//!   skipped on read.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use vcsync_core::domain::{EntryTag, FolderSyncInfo, ResourcePath};
use vcsync_core::ports::{ISyncStore, StoreError};

use crate::ignore::{parse_ignore_file, render_ignore_file};

const ENTRIES: &str = "Entries";
const ROOT: &str = "Root";
const REPOSITORY: &str = "Repository";
const TAG: &str = "Tag";
const STATIC: &str = "Entries.Static";
const LOCK: &str = "Entries.lock";
const NO_SUBDIRECTORIES: &str = "D";

/// Sync store persisting metadata next to the working-copy files
#[derive(Debug, Clone)]
pub struct FileSyncStore {
    root: PathBuf,
    metadata_dir: String,
    ignore_file: String,
}

impl FileSyncStore {
    /// Create a store for the working copy rooted at `root`
    #[must_use]
    pub fn new(
        root: impl Into<PathBuf>,
        metadata_dir: impl Into<String>,
        ignore_file: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            metadata_dir: metadata_dir.into(),
            ignore_file: ignore_file.into(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Metadata directory of `folder`
    #[must_use]
    pub fn metadata_path(&self, folder: &ResourcePath) -> PathBuf {
        folder.to_fs_path(&self.root).join(&self.metadata_dir)
    }

    fn ignore_path(&self, folder: &ResourcePath) -> PathBuf {
        folder.to_fs_path(&self.root).join(&self.ignore_file)
    }

    fn entries_lines(&self, folder: &ResourcePath) -> Result<Option<Vec<String>>, StoreError> {
        let meta = self.metadata_path(folder);
        if !meta.is_dir() {
            return Ok(None);
        }
        let path = meta.join(ENTRIES);
        let content = match read_optional(&path)? {
            Some(content) => content,
            None => return Ok(Some(Vec::new())),
        };
        let lines = content
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.is_empty() && *line != NO_SUBDIRECTORIES)
            .map(str::to_string)
            .collect();
        Ok(Some(lines))
    }
}

impl ISyncStore for FileSyncStore {
    fn read_entries(&self, folder: &ResourcePath) -> Result<Option<Vec<Vec<u8>>>, StoreError> {
        if self.metadata_path(folder).join(LOCK).exists() {
            debug!(path = %folder, "Entries file is locked");
            return Err(StoreError::Locked(folder.clone()));
        }
        let lines = self.entries_lines(folder)?;
        trace!(path = %folder, count = lines.as_ref().map_or(0, Vec::len), "read entries");
        Ok(lines.map(|lines| lines.into_iter().map(String::into_bytes).collect()))
    }

    fn read_entry(&self, folder: &ResourcePath, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let Some(lines) = self.entries_lines(folder)? else {
            return Ok(None);
        };
        Ok(lines
            .into_iter()
            .find(|line| line.split('/').nth(1) == Some(name))
            .map(String::into_bytes))
    }

    fn write_entries(&self, folder: &ResourcePath, entries: &[Vec<u8>]) -> Result<(), StoreError> {
        let meta = self.metadata_path(folder);
        create_dir(&meta)?;

        let mut content = String::new();
        let mut has_folders = false;
        for bytes in entries {
            let line = String::from_utf8_lossy(bytes);
            has_folders |= line.starts_with("D/");
            content.push_str(&line);
            content.push('\n');
        }
        if !has_folders {
            content.push_str(NO_SUBDIRECTORIES);
            content.push('\n');
        }

        debug!(path = %folder, count = entries.len(), "writing entries");
        write_atomic(&meta.join(ENTRIES), content.as_bytes())
    }

    fn read_folder_sync(&self, folder: &ResourcePath) -> Result<Option<FolderSyncInfo>, StoreError> {
        let meta = self.metadata_path(folder);
        if !meta.is_dir() {
            return Ok(None);
        }
        let Some(root) = read_optional(&meta.join(ROOT))? else {
            return Ok(None);
        };
        let repository_path = meta.join(REPOSITORY);
        let repository =
            read_optional(&repository_path)?.ok_or_else(|| StoreError::Malformed {
                path: repository_path.clone(),
                reason: "missing repository file".into(),
            })?;

        let tag_path = meta.join(TAG);
        let tag = match read_optional(&tag_path)? {
            Some(content) => {
                let spec = content.lines().next().unwrap_or("").trim().to_string();
                if spec.is_empty() {
                    None
                } else {
                    Some(
                        EntryTag::from_entry_line(&spec).map_err(|e| StoreError::Malformed {
                            path: tag_path.clone(),
                            reason: e.to_string(),
                        })?,
                    )
                }
            }
            None => None,
        };
        let is_static = meta.join(STATIC).exists();

        FolderSyncInfo::new(first_line(&repository), first_line(&root), tag, is_static)
            .map(Some)
            .map_err(|e| StoreError::Malformed {
                path: meta.join(ROOT),
                reason: e.to_string(),
            })
    }

    fn write_folder_sync(
        &self,
        folder: &ResourcePath,
        info: &FolderSyncInfo,
    ) -> Result<(), StoreError> {
        let meta = self.metadata_path(folder);
        create_dir(&meta)?;
        debug!(path = %folder, repository = %info.repository(), "writing folder sync");

        write_atomic(&meta.join(ROOT), format!("{}\n", info.root()).as_bytes())?;
        write_atomic(
            &meta.join(REPOSITORY),
            format!("{}\n", info.repository()).as_bytes(),
        )?;
        match info.tag() {
            Some(tag) => write_atomic(&meta.join(TAG), format!("{}\n", tag.to_entry_line()).as_bytes())?,
            None => remove_optional(&meta.join(TAG))?,
        }
        if info.is_static() {
            write_atomic(&meta.join(STATIC), b"")?;
        } else {
            remove_optional(&meta.join(STATIC))?;
        }
        let entries = meta.join(ENTRIES);
        if !entries.exists() {
            write_atomic(&entries, format!("{NO_SUBDIRECTORIES}\n").as_bytes())?;
        }
        Ok(())
    }

    fn delete_folder_sync(&self, folder: &ResourcePath) -> Result<(), StoreError> {
        let meta = self.metadata_path(folder);
        debug!(path = %folder, "deleting folder metadata");
        match fs::remove_dir_all(&meta) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path: meta, source }),
        }
    }

    fn read_ignores(&self, folder: &ResourcePath) -> Result<Option<Vec<String>>, StoreError> {
        Ok(read_optional(&self.ignore_path(folder))?.map(|content| parse_ignore_file(&content)))
    }

    fn write_ignores(&self, folder: &ResourcePath, patterns: &[String]) -> Result<(), StoreError> {
        let path = self.ignore_path(folder);
        if patterns.is_empty() {
            return remove_optional(&path);
        }
        write_atomic(&path, render_ignore_file(patterns).as_bytes())
    }
}

// ============================================================================
// File helpers
// ============================================================================

fn first_line(content: &str) -> &str {
    content.lines().next().unwrap_or("").trim()
}

fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn remove_optional(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn create_dir(path: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Write via a temporary sibling and rename so readers never see a partial file
fn write_atomic(target: &Path, data: &[u8]) -> Result<(), StoreError> {
    let tmp_path = {
        let mut p = target.as_os_str().to_owned();
        p.push(".tmp");
        PathBuf::from(p)
    };
    trace!(?tmp_path, "writing to temporary file");
    fs::write(&tmp_path, data).map_err(|source| StoreError::Io {
        path: tmp_path.clone(),
        source,
    })?;
    fs::rename(&tmp_path, target).map_err(|source| StoreError::Io {
        path: target.to_path_buf(),
        source,
    })
}
