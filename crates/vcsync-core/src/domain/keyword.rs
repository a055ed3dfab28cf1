//! Keyword substitution modes
//!
//! The mode is stored verbatim in the entry line (`-kb`, `-ko`, ...). The
//! empty string stands for the default text expansion (`-kkv`).

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Binary: no keyword expansion, no newline conversion
pub const BINARY: &str = "-kb";
/// Old values: keywords are left as checked in
pub const OLD_VALUES: &str = "-ko";
/// Values only
pub const VALUES_ONLY: &str = "-kv";
/// Default keyword/value expansion, written as an empty slot
pub const KEYWORD_VALUE: &str = "-kkv";

/// A keyword substitution flag
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeywordMode(String);

impl KeywordMode {
    /// Default text expansion
    #[must_use]
    pub fn text() -> Self {
        Self(String::new())
    }

    /// Binary content
    #[must_use]
    pub fn binary() -> Self {
        Self(BINARY.to_string())
    }

    /// Build from the entry-line slot, normalizing `-kkv` to the empty slot
    #[must_use]
    pub fn from_entry_line(mode: &str) -> Self {
        let mode = mode.trim();
        if mode == KEYWORD_VALUE {
            Self::text()
        } else {
            Self(mode.to_string())
        }
    }

    #[must_use]
    pub fn to_entry_line(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_binary(&self) -> bool {
        self.0 == BINARY
    }

    #[must_use]
    pub fn is_default(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for KeywordMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "{KEYWORD_VALUE}")
        } else {
            write!(f, "{}", self.0)
        }
    }
}
