//! Per-folder synchronization records

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::tag::EntryTag;

/// Mapping of a managed folder onto the repository
///
/// Immutable value; equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderSyncInfo {
    repository: String,
    root: String,
    tag: Option<EntryTag>,
    is_static: bool,
}

impl FolderSyncInfo {
    pub fn new(
        repository: impl Into<String>,
        root: impl Into<String>,
        tag: Option<EntryTag>,
        is_static: bool,
    ) -> Result<Self, DomainError> {
        let repository = repository.into();
        let root = root.into();
        if root.trim().is_empty() {
            return Err(DomainError::ValidationFailed(
                "folder sync root location must not be empty".into(),
            ));
        }
        Ok(Self {
            repository: repository.trim_end_matches('/').to_string(),
            root: root.trim().to_string(),
            tag,
            is_static,
        })
    }

    /// Repository-relative path of the folder
    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Connection specification of the repository root
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    #[must_use]
    pub fn tag(&self) -> Option<&EntryTag> {
        self.tag.as_ref()
    }

    /// Whether the member set of the folder is fixed
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Directory part of the root specification
    ///
    /// `:pserver:anon@host:/cvsroot` yields `/cvsroot`.
    #[must_use]
    pub fn root_directory(&self) -> &str {
        match self.root.find('/') {
            Some(idx) => &self.root[idx..],
            None => &self.root,
        }
    }

    /// Absolute location of the folder inside the repository
    #[must_use]
    pub fn remote_location(&self) -> String {
        let root_dir = self.root_directory().trim_end_matches('/');
        if self.repository.starts_with(root_dir) && self.repository.starts_with('/') {
            self.repository.clone()
        } else if self.repository.is_empty() {
            root_dir.to_string()
        } else {
            format!("{root_dir}/{}", self.repository)
        }
    }

    /// Whether both records point at the same repository location
    #[must_use]
    pub fn is_same_mapping(&self, other: &FolderSyncInfo) -> bool {
        self.root == other.root && self.repository == other.repository
    }

    #[must_use]
    pub fn with_tag(&self, tag: Option<EntryTag>) -> Self {
        Self {
            tag,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_static(&self, is_static: bool) -> Self {
        Self {
            is_static,
            ..self.clone()
        }
    }

    /// Record for a child folder that inherits root, tag and static-ness
    #[must_use]
    pub fn child(&self, name: &str) -> Self {
        let repository = if self.repository.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.repository, name)
        };
        Self {
            repository,
            ..self.clone()
        }
    }
}

impl Display for FolderSyncInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.repository, self.root)?;
        if let Some(tag) = &self.tag {
            write!(f, " [{tag}]")?;
        }
        Ok(())
    }
}
