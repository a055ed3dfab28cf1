//! Ignore command - Append a pattern to a folder's ignore file

use anyhow::{bail, Result};
use clap::Args;
use tracing::info;

use vcsync_conflict::policy::validate_pattern;
use vcsync_core::domain::ResourceKind;

use super::{parse_resource_path, Context};
use crate::output::OutputFormat;

#[derive(Debug, Args)]
pub struct IgnoreCommand {
    /// Folder whose ignore file receives the pattern
    pub folder: String,
    /// Glob pattern matched against member names
    pub pattern: String,
}

impl IgnoreCommand {
    pub async fn execute(&self, context: &Context, format: OutputFormat) -> Result<()> {
        let formatter = context.formatter(format);
        let folder = parse_resource_path(&self.folder)?;
        validate_pattern(&self.pattern)?;

        let mut coordinator = context.coordinator();
        if coordinator.working_copy().kind(&folder) != Some(ResourceKind::Folder) {
            bail!("'{folder}' is not a folder");
        }

        let already = coordinator
            .ignore_patterns(&folder)?
            .iter()
            .any(|p| *p == self.pattern);
        coordinator.add_ignored(&folder, &self.pattern)?;
        let patterns = coordinator.ignore_patterns(&folder)?;
        info!(path = %folder, pattern = %self.pattern, already, "Ignore pattern applied");

        if format.is_json() {
            let json = serde_json::json!({
                "success": true,
                "folder": folder.to_string(),
                "pattern": self.pattern,
                "added": !already,
                "patterns": patterns,
            });
            formatter.print_json(&json);
        } else if already {
            formatter.warn(&format!("'{}' is already ignored in {}", self.pattern, folder));
        } else {
            formatter.success(&format!("Ignoring '{}' in {}", self.pattern, folder));
            formatter.info(&format!("{} pattern(s) now declared", patterns.len()));
        }
        Ok(())
    }
}
