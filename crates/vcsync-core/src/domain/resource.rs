//! Workspace-relative resource addressing
//!
//! Every resource managed by the engine is addressed by a [`ResourcePath`]
//! relative to the working-copy root. The root itself is the empty path.
//! [`Resource`] pairs a path with its kind so call sites match exhaustively
//! on files and folders instead of probing handles at runtime.

use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// ResourcePath
// ============================================================================

/// A normalized, `/`-separated path relative to the working-copy root
///
/// Invariants: no leading or trailing separator, no empty, `.` or `..`
/// segments. The empty string denotes the root folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourcePath(String);

impl ResourcePath {
    /// The working-copy root
    #[must_use]
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Create a validated path
    pub fn new(path: impl Into<String>) -> Result<Self, DomainError> {
        let path = path.into();
        if path.is_empty() {
            return Ok(Self::root());
        }
        if path.starts_with('/') || path.ends_with('/') {
            return Err(DomainError::InvalidPath(format!(
                "path must be relative without trailing separator: {path}"
            )));
        }
        for segment in path.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(DomainError::InvalidPath(format!(
                    "invalid segment '{segment}' in {path}"
                )));
            }
        }
        Ok(Self(path))
    }

    /// Whether this is the working-copy root
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The path as a `/`-separated string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The last segment, empty for the root
    #[must_use]
    pub fn name(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    /// The containing folder, `None` for the root
    #[must_use]
    pub fn parent(&self) -> Option<ResourcePath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => Some(Self::root()),
        }
    }

    /// Append a single child name
    pub fn join(&self, name: &str) -> Result<ResourcePath, DomainError> {
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            return Err(DomainError::InvalidPath(format!(
                "invalid child name '{name}'"
            )));
        }
        if self.is_root() {
            Ok(Self(name.to_string()))
        } else {
            Ok(Self(format!("{}/{}", self.0, name)))
        }
    }

    /// Number of segments (the root has depth 0)
    #[must_use]
    pub fn depth(&self) -> usize {
        if self.is_root() {
            0
        } else {
            self.0.split('/').count()
        }
    }

    /// Iterate over the path segments
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Whether `self` equals `ancestor` or lies below it
    #[must_use]
    pub fn starts_with(&self, ancestor: &ResourcePath) -> bool {
        if ancestor.is_root() {
            return true;
        }
        self.0 == ancestor.0
            || (self.0.starts_with(&ancestor.0) && self.0.as_bytes()[ancestor.0.len()] == b'/')
    }

    /// All proper ancestors, nearest first, ending with the root
    pub fn ancestors(&self) -> impl Iterator<Item = ResourcePath> {
        std::iter::successors(self.parent(), |p| p.parent())
    }

    /// Resolve against an absolute working-copy root on disk
    #[must_use]
    pub fn to_fs_path(&self, root: &Path) -> PathBuf {
        self.segments().fold(root.to_path_buf(), |acc, s| acc.join(s))
    }
}

impl Display for ResourcePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "/")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl FromStr for ResourcePath {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.trim_matches('/'))
    }
}

impl TryFrom<String> for ResourcePath {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResourcePath> for String {
    fn from(value: ResourcePath) -> Self {
        value.0
    }
}

// ============================================================================
// Resource
// ============================================================================

/// Kind discriminator for a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    File,
    Folder,
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::File => write!(f, "file"),
            ResourceKind::Folder => write!(f, "folder"),
        }
    }
}

/// A file or folder in the working copy
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "lowercase")]
pub enum Resource {
    File(ResourcePath),
    Folder(ResourcePath),
}

impl Resource {
    /// Build a resource from a path and kind
    #[must_use]
    pub fn new(path: ResourcePath, kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::File => Resource::File(path),
            ResourceKind::Folder => Resource::Folder(path),
        }
    }

    /// The working-copy root folder
    #[must_use]
    pub fn root() -> Self {
        Resource::Folder(ResourcePath::root())
    }

    #[must_use]
    pub fn path(&self) -> &ResourcePath {
        match self {
            Resource::File(p) | Resource::Folder(p) => p,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::File(_) => ResourceKind::File,
            Resource::Folder(_) => ResourceKind::Folder,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.path().name()
    }

    #[must_use]
    pub fn is_folder(&self) -> bool {
        matches!(self, Resource::Folder(_))
    }

    /// The containing folder as a resource
    #[must_use]
    pub fn parent(&self) -> Option<Resource> {
        self.path().parent().map(Resource::Folder)
    }

    /// Extract the folder path or fail with a typed error
    pub fn as_folder(&self) -> Result<&ResourcePath, DomainError> {
        match self {
            Resource::Folder(p) => Ok(p),
            Resource::File(p) => Err(DomainError::UnexpectedKind {
                path: p.to_string(),
                expected: ResourceKind::Folder.to_string(),
                found: ResourceKind::File.to_string(),
            }),
        }
    }

    /// Extract the file path or fail with a typed error
    pub fn as_file(&self) -> Result<&ResourcePath, DomainError> {
        match self {
            Resource::File(p) => Ok(p),
            Resource::Folder(p) => Err(DomainError::UnexpectedKind {
                path: p.to_string(),
                expected: ResourceKind::File.to_string(),
                found: ResourceKind::Folder.to_string(),
            }),
        }
    }
}

impl Display for Resource {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.path())
    }
}
