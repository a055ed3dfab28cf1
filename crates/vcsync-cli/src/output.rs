//! Terminal and JSON rendering of command results
//!
//! Commands build typed views ([`StatusRow`], [`EntryListing`]) and hand
//! them to an [`OutputFormatter`]; the formatter decides between aligned
//! columns for people and one JSON document for scripts.

use serde::Serialize;

use vcsync_core::domain::{DirtyIndicator, ResourceKind};

use crate::commands::entries::EntryListing;
use crate::commands::status::StatusRow;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        matches!(self, OutputFormat::Json)
    }
}

pub trait OutputFormatter {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    fn print_json(&self, value: &serde_json::Value);

    /// Dirty state and record summary of each resource
    fn status(&self, rows: &[StatusRow]);

    /// Decoded records of one managed folder
    fn entries(&self, listing: &EntryListing);
}

// ============================================================================
// Human
// ============================================================================

pub struct HumanFormatter {
    quiet: bool,
}

impl HumanFormatter {
    fn line(&self, text: &str) {
        println!("  {text}");
    }
}

impl OutputFormatter for HumanFormatter {
    fn success(&self, message: &str) {
        if !self.quiet {
            println!("\u{2713} {message}");
        }
    }

    fn error(&self, message: &str) {
        eprintln!("\u{2717} Error: {message}");
    }

    fn warn(&self, message: &str) {
        eprintln!("\u{26a0} Warning: {message}");
    }

    fn info(&self, message: &str) {
        self.line(message);
    }

    fn print_json(&self, _value: &serde_json::Value) {}

    fn status(&self, rows: &[StatusRow]) {
        let modified = rows
            .iter()
            .filter(|r| r.dirty == DirtyIndicator::Dirty)
            .count();
        self.success(&format!(
            "{} resource{}, {} modified",
            rows.len(),
            plural(rows.len()),
            modified
        ));
        let width = rows
            .iter()
            .map(|r| r.revision.as_deref().map_or(1, str::len))
            .max()
            .unwrap_or(1);
        for row in rows {
            self.line(&status_line(row, width));
        }
    }

    fn entries(&self, listing: &EntryListing) {
        self.success(&format!("{} ({})", listing.location, listing.folder));
        if let Some(tag) = &listing.tag {
            self.line(&format!("Sticky tag: {tag}"));
        }
        if listing.is_static {
            self.line("Static folder");
        }
        if listing.entries.is_empty() {
            self.line("No entries");
        }
        for row in &listing.entries {
            self.line(&row.line);
        }
    }
}

/// `<state><dirty> <revision> <path>[/] [tag]`
fn status_line(row: &StatusRow, width: usize) -> String {
    let marker = if row.dirty == DirtyIndicator::Dirty { 'M' } else { ' ' };
    let suffix = if row.kind == ResourceKind::Folder { "/" } else { "" };
    let mut line = format!(
        "{}{} {:<width$} {}{}",
        row.state.label(),
        marker,
        row.revision.as_deref().unwrap_or("-"),
        row.path,
        suffix,
    );
    if let Some(tag) = &row.tag {
        line.push_str(&format!("  [{tag}]"));
    }
    line
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

// ============================================================================
// JSON
// ============================================================================

pub struct JsonFormatter;

impl JsonFormatter {
    fn emit<T: Serialize + ?Sized>(&self, view: &T) {
        match serde_json::to_value(view) {
            Ok(value) => self.print_json(&value),
            Err(e) => self.error(&format!("cannot encode output: {e}")),
        }
    }
}

impl OutputFormatter for JsonFormatter {
    fn success(&self, message: &str) {
        println!("{}", serde_json::json!({"success": true, "message": message}));
    }

    fn error(&self, message: &str) {
        eprintln!("{}", serde_json::json!({"success": false, "error": message}));
    }

    fn warn(&self, message: &str) {
        eprintln!("{}", serde_json::json!({"level": "warning", "message": message}));
    }

    fn info(&self, _message: &str) {}

    fn print_json(&self, value: &serde_json::Value) {
        println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
    }

    fn status(&self, rows: &[StatusRow]) {
        self.emit(rows);
    }

    fn entries(&self, listing: &EntryListing) {
        self.emit(listing);
    }
}

pub fn get_formatter(format: OutputFormat, quiet: bool) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Human => Box::new(HumanFormatter { quiet }),
    }
}

#[cfg(test)]
mod tests {
    use vcsync_core::domain::DirtyIndicator;

    use super::*;
    use crate::commands::status::RecordState;

    fn row(path: &str, state: RecordState, revision: Option<&str>) -> StatusRow {
        StatusRow {
            path: path.to_string(),
            kind: ResourceKind::File,
            state,
            dirty: DirtyIndicator::Dirty,
            revision: revision.map(str::to_string),
            tag: None,
        }
    }

    #[test]
    fn test_status_line_pads_revision_column() {
        let added = row("src/new.c", RecordState::Added, Some("0"));
        assert_eq!(status_line(&added, 4), "AM 0    src/new.c");

        let mut folder = row("src", RecordState::Managed, None);
        folder.kind = ResourceKind::Folder;
        folder.dirty = DirtyIndicator::Clean;
        folder.tag = Some("Tstable".to_string());
        assert_eq!(status_line(&folder, 1), "   - src/  [Tstable]");
    }

    #[test]
    fn test_unmanaged_file_line() {
        let unmanaged = row("notes.txt", RecordState::Unmanaged, None);
        assert_eq!(status_line(&unmanaged, 3), "?M -   notes.txt");
    }
}
