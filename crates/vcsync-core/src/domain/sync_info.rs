//! Per-resource synchronization records
//!
//! A [`ResourceSyncInfo`] is the decoded form of one line of a folder's
//! entries file:
//!
//! ```text
//! /name/revision/timestamp/keywordmode/tagspec     (file)
//! D/name////                                       (folder)
//! ```
//!
//! The revision slot encodes three lifecycle states:
//!
//! | Revision | Meaning |
//! |----------|---------|
//! | `0`      | pending addition |
//! | `-1.4`   | pending deletion of revision 1.4 |
//! | `1.4`    | managed at revision 1.4 |
//!
//! The timestamp slot either carries the file's modification time at the last
//! sync point or one of a handful of literals that mark merged, restored or
//! always-dirty records (see [`EntryTimestamp`]).

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::keyword::KeywordMode;
use super::tag::EntryTag;

/// Separator between entry-line slots
pub const SEPARATOR: char = '/';
/// First slot of a folder entry
pub const DIRECTORY_PREFIX: &str = "D";
/// Revision of a pending addition
pub const ADDED_REVISION: &str = "0";
/// Prefix marking a pending deletion
pub const DELETED_PREFIX: char = '-';
/// Permissions reported when none were recorded
pub const DEFAULT_PERMISSIONS: &str = "u=rw,g=rw,o=r";

/// Wire format of entry-line dates (asctime, UTC)
pub const ENTRY_LINE_DATE_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

const TIMESTAMP_DUMMY: &str = "dummy timestamp";
const TIMESTAMP_MERGED: &str = "Result of merge";
const TIMESTAMP_MERGED_WITH_CONFLICT: &str = "Result of merge+";
const TIMESTAMP_DELETED_AND_RESTORED: &str = "restored+";
const TIMESTAMP_SERVER_MERGED: &str = "+modified";
const TIMESTAMP_SERVER_MERGED_WITH_CONFLICT: &str = "+=";

const LOCKED_BY: &str = "locked by";
const MIN_SLOTS: usize = 6;

// ============================================================================
// EntryTimestamp
// ============================================================================

/// Decoded timestamp slot
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "date", rename_all = "snake_case")]
pub enum EntryTimestamp {
    /// No timestamp recorded (server entry lines, unparsable dates)
    #[default]
    Empty,
    /// Always dirty: freshly added files
    Dummy,
    /// Regular record: modification time at the last sync point
    At(DateTime<Utc>),
    /// Merged from the server without conflicts
    Merged,
    /// Merged with conflicts; carries the file timestamp right after the merge
    MergedWithConflicts(Option<DateTime<Utc>>),
    /// Deleted locally and later restored
    DeletedAndRestored(Option<DateTime<Utc>>),
}

impl EntryTimestamp {
    /// Parse the timestamp slot of an entry line
    #[must_use]
    pub fn from_entry_line(slot: &str) -> Self {
        if slot.is_empty() {
            return EntryTimestamp::Empty;
        }
        if slot == TIMESTAMP_DUMMY {
            return EntryTimestamp::Dummy;
        }
        if slot.contains(TIMESTAMP_SERVER_MERGED_WITH_CONFLICT) {
            return EntryTimestamp::MergedWithConflicts(None);
        }
        if slot.contains(TIMESTAMP_SERVER_MERGED) {
            return EntryTimestamp::Merged;
        }
        if let Some(rest) = slot.strip_prefix(TIMESTAMP_MERGED_WITH_CONFLICT) {
            return EntryTimestamp::MergedWithConflicts(parse_entry_date(rest));
        }
        if slot.starts_with(TIMESTAMP_MERGED) {
            return EntryTimestamp::Merged;
        }
        if let Some(rest) = slot.strip_prefix(TIMESTAMP_DELETED_AND_RESTORED) {
            return EntryTimestamp::DeletedAndRestored(parse_entry_date(rest));
        }
        match parse_entry_date(slot) {
            Some(date) => EntryTimestamp::At(date),
            None => EntryTimestamp::Empty,
        }
    }

    /// Encode for the timestamp slot
    #[must_use]
    pub fn to_entry_line(&self) -> String {
        match self {
            EntryTimestamp::Empty => String::new(),
            EntryTimestamp::Dummy => TIMESTAMP_DUMMY.to_string(),
            EntryTimestamp::At(date) => format_entry_date(date),
            EntryTimestamp::Merged => TIMESTAMP_MERGED.to_string(),
            EntryTimestamp::MergedWithConflicts(date) => format!(
                "{TIMESTAMP_MERGED_WITH_CONFLICT}{}",
                date.as_ref().map(format_entry_date).unwrap_or_default()
            ),
            EntryTimestamp::DeletedAndRestored(date) => format!(
                "{TIMESTAMP_DELETED_AND_RESTORED}{}",
                date.as_ref().map(format_entry_date).unwrap_or_default()
            ),
        }
    }

    /// The date carried by the slot, if any
    #[must_use]
    pub fn date(&self) -> Option<DateTime<Utc>> {
        match self {
            EntryTimestamp::At(date) => Some(*date),
            EntryTimestamp::MergedWithConflicts(date) | EntryTimestamp::DeletedAndRestored(date) => {
                *date
            }
            _ => None,
        }
    }

    /// The same slot with its date cut to whole seconds, the wire precision
    #[must_use]
    pub fn truncated(self) -> Self {
        match self {
            EntryTimestamp::At(date) => EntryTimestamp::At(date.trunc_subsecs(0)),
            EntryTimestamp::MergedWithConflicts(date) => {
                EntryTimestamp::MergedWithConflicts(date.map(|d| d.trunc_subsecs(0)))
            }
            EntryTimestamp::DeletedAndRestored(date) => {
                EntryTimestamp::DeletedAndRestored(date.map(|d| d.trunc_subsecs(0)))
            }
            other => other,
        }
    }
}

/// Format a date in the entry-line wire format
#[must_use]
pub fn format_entry_date(date: &DateTime<Utc>) -> String {
    date.format(ENTRY_LINE_DATE_FORMAT).to_string()
}

/// Parse a date in the entry-line wire format
#[must_use]
pub fn parse_entry_date(text: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text.trim(), ENTRY_LINE_DATE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

// ============================================================================
// ResourceSyncInfo
// ============================================================================

/// Synchronization record of a single file or managed folder entry
///
/// Folder entries only carry a name; file entries always carry a revision,
/// timestamp and keyword mode, and optionally a tag.
///
/// Permissions come from the server and have no slot in the entry line, so
/// equality and hashing cover the encoded fields only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSyncInfo {
    name: String,
    is_directory: bool,
    revision: String,
    deleted: bool,
    timestamp: EntryTimestamp,
    keyword_mode: KeywordMode,
    tag: Option<EntryTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    permissions: Option<String>,
}

impl ResourceSyncInfo {
    fn encoded_fields(
        &self,
    ) -> (&str, bool, &str, bool, &EntryTimestamp, &KeywordMode, Option<&EntryTag>) {
        (
            &self.name,
            self.is_directory,
            &self.revision,
            self.deleted,
            &self.timestamp,
            &self.keyword_mode,
            self.tag.as_ref(),
        )
    }
}

impl PartialEq for ResourceSyncInfo {
    fn eq(&self, other: &Self) -> bool {
        self.encoded_fields() == other.encoded_fields()
    }
}

impl Eq for ResourceSyncInfo {}

impl Hash for ResourceSyncInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.encoded_fields().hash(state);
    }
}

impl ResourceSyncInfo {
    /// Entry for a managed subfolder
    pub fn folder(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        validate_name(&name, &name)?;
        Ok(Self {
            name,
            is_directory: true,
            revision: String::new(),
            deleted: false,
            timestamp: EntryTimestamp::Empty,
            keyword_mode: KeywordMode::text(),
            tag: None,
            permissions: None,
        })
    }

    /// Entry for a managed file
    ///
    /// A revision prefixed with `-` produces a pending deletion.
    pub fn file(
        name: impl Into<String>,
        revision: &str,
        timestamp: EntryTimestamp,
        keyword_mode: KeywordMode,
        tag: Option<EntryTag>,
    ) -> Result<Self, DomainError> {
        let name = name.into();
        validate_name(&name, &name)?;
        let (revision, deleted) = split_revision(revision);
        if revision.is_empty() {
            return Err(DomainError::MissingRevision(name));
        }
        Ok(Self {
            name,
            is_directory: false,
            revision,
            deleted,
            timestamp: timestamp.truncated(),
            keyword_mode,
            tag,
            permissions: None,
        })
    }

    /// Record for a file scheduled for addition
    pub fn new_addition(
        name: impl Into<String>,
        keyword_mode: KeywordMode,
        tag: Option<EntryTag>,
    ) -> Result<Self, DomainError> {
        Self::file(name, ADDED_REVISION, EntryTimestamp::Dummy, keyword_mode, tag)
    }

    // ------------------------------------------------------------------------
    // Decoding
    // ------------------------------------------------------------------------

    /// Decode one entry line
    pub fn from_entry_line(line: &str) -> Result<Self, DomainError> {
        let slots: Vec<&str> = line.split(SEPARATOR).collect();
        if slots.len() < MIN_SLOTS {
            return Err(DomainError::MalformedEntryLine(line.to_string()));
        }

        let is_directory = match slots[0] {
            DIRECTORY_PREFIX => true,
            "" => false,
            _ => return Err(DomainError::MalformedEntryLine(line.to_string())),
        };

        let name = slots[1];
        if name.is_empty() {
            return Err(DomainError::MissingName(line.to_string()));
        }
        if is_directory {
            return Self::folder(name);
        }

        let revision = strip_locker(slots[2]);
        let timestamp = EntryTimestamp::from_entry_line(slots[3]);
        let keyword_mode = KeywordMode::from_entry_line(slots[4]);
        // a tag may itself contain the separator
        let tag_spec = slots[5..].join("/");
        let tag = if tag_spec.is_empty() {
            None
        } else {
            Some(EntryTag::from_entry_line(&tag_spec)?)
        };

        Self::file(name, revision, timestamp, keyword_mode, tag)
            .map_err(|e| match e {
                DomainError::MissingRevision(_) => DomainError::MissingRevision(line.to_string()),
                other => other,
            })
    }

    /// Decode the byte form stored in the cache
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DomainError> {
        let line = std::str::from_utf8(bytes)
            .map_err(|e| DomainError::MalformedEntryLine(format!("not UTF-8: {e}")))?;
        Self::from_entry_line(line)
    }

    // ------------------------------------------------------------------------
    // Encoding
    // ------------------------------------------------------------------------

    /// Encode as an entry line
    #[must_use]
    pub fn to_entry_line(&self) -> String {
        self.entry_line_with(&self.timestamp.to_entry_line())
    }

    /// Encode as the byte form stored in the cache
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_entry_line().into_bytes()
    }

    /// Entry line as sent to the server
    ///
    /// The timestamp is omitted unless the record results from a merge and
    /// the current file timestamp is known, in which case the server-side
    /// merge markers are used instead.
    #[must_use]
    pub fn to_server_entry_line(&self, file_timestamp: Option<DateTime<Utc>>) -> String {
        match file_timestamp {
            Some(ts) if self.is_merged() || self.is_merged_with_conflicts() => {
                let marker = if self.needs_merge(ts) {
                    TIMESTAMP_SERVER_MERGED_WITH_CONFLICT
                } else {
                    TIMESTAMP_SERVER_MERGED
                };
                self.entry_line_with(marker)
            }
            _ => self.entry_line_with(""),
        }
    }

    fn entry_line_with(&self, timestamp: &str) -> String {
        if self.is_directory {
            return format!("{DIRECTORY_PREFIX}/{}////", self.name);
        }
        format!(
            "/{}/{}/{}/{}/{}",
            self.name,
            self.entry_revision(),
            timestamp,
            self.keyword_mode.to_entry_line(),
            self.tag.as_ref().map(EntryTag::to_entry_line).unwrap_or_default()
        )
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    /// The revision without the deletion marker
    #[must_use]
    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// The revision as written in the entry line (`-` prefixed when deleted)
    #[must_use]
    pub fn entry_revision(&self) -> String {
        if self.deleted {
            format!("{DELETED_PREFIX}{}", self.revision)
        } else {
            self.revision.clone()
        }
    }

    #[must_use]
    pub fn timestamp(&self) -> &EntryTimestamp {
        &self.timestamp
    }

    #[must_use]
    pub fn keyword_mode(&self) -> &KeywordMode {
        &self.keyword_mode
    }

    #[must_use]
    pub fn tag(&self) -> Option<&EntryTag> {
        self.tag.as_ref()
    }

    #[must_use]
    pub fn permissions(&self) -> &str {
        self.permissions.as_deref().unwrap_or(DEFAULT_PERMISSIONS)
    }

    #[must_use]
    pub fn is_added(&self) -> bool {
        !self.is_directory && self.revision == ADDED_REVISION
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    #[must_use]
    pub fn is_merged(&self) -> bool {
        matches!(self.timestamp, EntryTimestamp::Merged)
    }

    #[must_use]
    pub fn is_merged_with_conflicts(&self) -> bool {
        matches!(self.timestamp, EntryTimestamp::MergedWithConflicts(_))
    }

    #[must_use]
    pub fn was_deleted_and_restored(&self) -> bool {
        matches!(self.timestamp, EntryTimestamp::DeletedAndRestored(_))
    }

    /// Whether a conflicting merge has not been touched since it happened
    #[must_use]
    pub fn needs_merge(&self, file_timestamp: DateTime<Utc>) -> bool {
        match self.timestamp {
            EntryTimestamp::MergedWithConflicts(Some(ts)) => ts == file_timestamp.trunc_subsecs(0),
            _ => false,
        }
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    /// Mark as a pending deletion, keeping the numeric revision
    ///
    /// Additions and folder entries are returned unchanged.
    #[must_use]
    pub fn to_deletion(&self) -> Self {
        let mut info = self.clone();
        if !info.is_directory && !info.is_added() {
            info.deleted = true;
        }
        info
    }

    /// Undo a pending deletion
    #[must_use]
    pub fn from_deletion(&self) -> Self {
        let mut info = self.clone();
        info.deleted = false;
        info
    }

    #[must_use]
    pub fn with_revision(&self, revision: &str) -> Self {
        let mut info = self.clone();
        let (revision, deleted) = split_revision(revision);
        info.revision = revision;
        info.deleted = deleted;
        if info.revision == ADDED_REVISION {
            info.timestamp = EntryTimestamp::Dummy;
        }
        info
    }

    #[must_use]
    pub fn with_timestamp(&self, timestamp: EntryTimestamp) -> Self {
        let mut info = self.clone();
        info.timestamp = timestamp.truncated();
        info
    }

    #[must_use]
    pub fn with_keyword_mode(&self, keyword_mode: KeywordMode) -> Self {
        let mut info = self.clone();
        info.keyword_mode = keyword_mode;
        info
    }

    #[must_use]
    pub fn with_tag(&self, tag: Option<EntryTag>) -> Self {
        let mut info = self.clone();
        info.tag = tag;
        info
    }

    #[must_use]
    pub fn with_permissions(&self, permissions: impl Into<String>) -> Self {
        let mut info = self.clone();
        info.permissions = Some(permissions.into());
        info
    }
}

impl Display for ResourceSyncInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_entry_line())
    }
}

fn validate_name(name: &str, context: &str) -> Result<(), DomainError> {
    if name.is_empty() {
        return Err(DomainError::MissingName(context.to_string()));
    }
    if name.contains(SEPARATOR) {
        return Err(DomainError::InvalidPath(format!(
            "entry name must not contain '{SEPARATOR}': {name}"
        )));
    }
    Ok(())
}

fn split_revision(revision: &str) -> (String, bool) {
    match revision.strip_prefix(DELETED_PREFIX) {
        Some(rest) => (rest.to_string(), true),
        None => (revision.to_string(), false),
    }
}

/// Drop a trailing `<whitespace>locked by ...` annotation from a revision
fn strip_locker(revision: &str) -> &str {
    if let Some(idx) = revision.find(LOCKED_BY) {
        let head = &revision[..idx];
        let has_tail = revision.len() > idx + LOCKED_BY.len();
        if has_tail && head.ends_with(char::is_whitespace) {
            return head.trim_end();
        }
    }
    revision
}

/// Whether the cached bytes describe a folder entry
#[must_use]
pub fn is_folder_entry(bytes: &[u8]) -> bool {
    bytes.starts_with(b"D/")
}

/// Whether the cached bytes describe a pending addition
#[must_use]
pub fn is_addition_entry(bytes: &[u8]) -> bool {
    ResourceSyncInfo::from_bytes(bytes)
        .map(|info| info.is_added())
        .unwrap_or(false)
}

/// Whether the cached bytes describe a pending deletion
#[must_use]
pub fn is_deletion_entry(bytes: &[u8]) -> bool {
    ResourceSyncInfo::from_bytes(bytes)
        .map(|info| info.is_deleted())
        .unwrap_or(false)
}

// ============================================================================
// Revision ordering
// ============================================================================

fn revision_digits(revision: &str) -> Option<Vec<u64>> {
    if revision.is_empty() {
        return None;
    }
    revision
        .split('.')
        .map(|segment| segment.parse::<u64>().ok())
        .collect()
}

/// Whether `remote` is a later revision than `local`
///
/// A pending addition is older than any branch revision. When one revision
/// is a prefix of the other, the longer (branched) one is later.
#[must_use]
pub fn is_later_revision(remote: &str, local: &str) -> bool {
    let Some(local_digits) = revision_digits(local) else {
        return false;
    };
    let Some(remote_digits) = revision_digits(remote) else {
        return true;
    };
    if local == ADDED_REVISION {
        return remote_digits.len() >= 2;
    }
    for (r, l) in remote_digits.iter().zip(local_digits.iter()) {
        match r.cmp(l) {
            Ordering::Greater => return true,
            Ordering::Less => return false,
            Ordering::Equal => {}
        }
    }
    remote_digits.len() > local_digits.len()
}

/// Whether `remote` is later than `local` on the same branch
#[must_use]
pub fn is_later_revision_on_same_branch(remote: &str, local: &str) -> bool {
    if remote == local {
        return false;
    }
    let (Some(remote_digits), Some(local_digits)) = (revision_digits(remote), revision_digits(local))
    else {
        return false;
    };
    if remote_digits.len() != local_digits.len() || remote_digits.is_empty() {
        return false;
    }
    let last = remote_digits.len() - 1;
    remote_digits[..last] == local_digits[..last] && remote_digits[last] > local_digits[last]
}
