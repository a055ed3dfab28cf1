//! Modification state of a resource

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Dirty-child count meaning "not computed"
pub const UNKNOWN_DIRTY_COUNT: i32 = -1;

/// Cached "modified" indicator of a resource
///
/// Only [`DirtyIndicator::Clean`] and [`DirtyIndicator::Dirty`] answer a
/// query; [`DirtyIndicator::NeedsRecompute`] forces a rescan the next time
/// the indicator is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirtyIndicator {
    Clean,
    Dirty,
    NeedsRecompute,
}

impl DirtyIndicator {
    #[must_use]
    pub fn from_modified(modified: bool) -> Self {
        if modified {
            DirtyIndicator::Dirty
        } else {
            DirtyIndicator::Clean
        }
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        !matches!(self, DirtyIndicator::NeedsRecompute)
    }

    /// Indicator that ancestors receive when a descendant moves to `self`
    ///
    /// A dirty child makes every ancestor dirty; a clean child says nothing
    /// about its siblings, so ancestors must be recomputed.
    #[must_use]
    pub fn for_ancestors(&self) -> Self {
        match self {
            DirtyIndicator::Dirty => DirtyIndicator::Dirty,
            DirtyIndicator::Clean | DirtyIndicator::NeedsRecompute => {
                DirtyIndicator::NeedsRecompute
            }
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            DirtyIndicator::Clean => "clean",
            DirtyIndicator::Dirty => "dirty",
            DirtyIndicator::NeedsRecompute => "needs_recompute",
        }
    }
}

impl Display for DirtyIndicator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
