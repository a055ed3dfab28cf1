//! Entry tags
//!
//! A tag pins which remote revision a resource or folder compares against.
//! On disk a tag is written as a one-character type prefix followed by the
//! tag name:
//!
//! | Prefix | Meaning |
//! |--------|---------|
//! | `T`    | branch (or `THEAD` for the head) |
//! | `N`    | non-branch version tag |
//! | `D`    | date |

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Name used on the wire for the head of the trunk
pub const HEAD_NAME: &str = "HEAD";

/// A named point-in-time reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "lowercase")]
pub enum EntryTag {
    Branch(String),
    Version(String),
    Date(String),
    Head,
}

impl EntryTag {
    /// Parse the prefixed entry-line form (`Tname`, `Nname`, `Ddate`)
    ///
    /// Any other prefix, and `THEAD`, yields [`EntryTag::Head`].
    pub fn from_entry_line(spec: &str) -> Result<Self, DomainError> {
        let mut chars = spec.chars();
        let prefix = chars
            .next()
            .ok_or_else(|| DomainError::InvalidTag("empty tag specification".into()))?;
        let name = chars.as_str();
        let tag = match prefix {
            'T' if name == HEAD_NAME => EntryTag::Head,
            'T' | 'N' | 'D' if name.is_empty() => {
                return Err(DomainError::InvalidTag(format!("tag without a name: {spec}")))
            }
            'T' => EntryTag::Branch(name.to_string()),
            'N' => EntryTag::Version(name.to_string()),
            'D' => EntryTag::Date(name.to_string()),
            _ => EntryTag::Head,
        };
        Ok(tag)
    }

    /// The prefixed entry-line form
    #[must_use]
    pub fn to_entry_line(&self) -> String {
        match self {
            EntryTag::Branch(name) => format!("T{name}"),
            EntryTag::Version(name) => format!("N{name}"),
            EntryTag::Date(date) => format!("D{date}"),
            EntryTag::Head => format!("T{HEAD_NAME}"),
        }
    }

    /// The bare tag name
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            EntryTag::Branch(name) | EntryTag::Version(name) | EntryTag::Date(name) => name,
            EntryTag::Head => HEAD_NAME,
        }
    }

    #[must_use]
    pub fn is_head(&self) -> bool {
        matches!(self, EntryTag::Head)
    }

    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(self, EntryTag::Branch(_))
    }

    #[must_use]
    pub fn is_date(&self) -> bool {
        matches!(self, EntryTag::Date(_))
    }
}

impl Display for EntryTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            EntryTag::Branch(name) => write!(f, "branch {name}"),
            EntryTag::Version(name) => write!(f, "version {name}"),
            EntryTag::Date(date) => write!(f, "date {date}"),
            EntryTag::Head => write!(f, "{HEAD_NAME}"),
        }
    }
}

impl FromStr for EntryTag {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_entry_line(s.trim())
    }
}
