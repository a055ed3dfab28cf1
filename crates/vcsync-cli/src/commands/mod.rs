//! CLI subcommands and the state they share

pub mod config;
pub mod entries;
pub mod ignore;
pub mod status;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use tracing::debug;

use vcsync_cache::FileSyncStore;
use vcsync_core::config::Config;
use vcsync_core::domain::ResourcePath;
use vcsync_sync::{LocalWorkingCopy, SynchronizationCoordinator};

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

/// Configuration and working-copy location resolved from global flags
#[derive(Debug, Clone)]
pub struct Context {
    pub config: Config,
    pub config_path: PathBuf,
    /// Whether `--config` named the file explicitly
    pub explicit_config: bool,
    pub root: PathBuf,
    pub quiet: bool,
}

impl Context {
    /// Resolve the configuration file and working-copy root
    ///
    /// An explicitly named configuration file must load; the default one
    /// falls back to built-in defaults.
    pub fn load(config: Option<PathBuf>, root: Option<PathBuf>, quiet: bool) -> Result<Self> {
        let explicit_config = config.is_some();
        let config_path = config.unwrap_or_else(Config::default_path);
        let config = if explicit_config {
            Config::load(&config_path)
                .with_context(|| format!("Failed to load {}", config_path.display()))?
        } else {
            Config::load_or_default(&config_path)
        };
        let root = match root {
            Some(root) => root,
            None => std::env::current_dir().context("Failed to read the current directory")?,
        };
        Ok(Self {
            config,
            config_path,
            explicit_config,
            root,
            quiet,
        })
    }

    pub fn formatter(&self, format: OutputFormat) -> Box<dyn OutputFormatter> {
        get_formatter(format, self.quiet)
    }

    /// Coordinator over the metadata files of the working copy
    pub fn coordinator(&self) -> SynchronizationCoordinator {
        let workspace = &self.config.workspace;
        debug!(root = %self.root.display(), "opening working copy");
        let store = FileSyncStore::new(
            self.root.clone(),
            workspace.metadata_dir.clone(),
            workspace.ignore_file.clone(),
        );
        let working_copy = LocalWorkingCopy::new(self.root.clone(), workspace.metadata_dir.clone());
        SynchronizationCoordinator::from_config(Arc::new(store), Arc::new(working_copy), workspace)
    }
}

/// Parse a working-copy-relative path given on the command line
///
/// Accepts `.`, `./a/b` and trailing separators.
pub fn parse_resource_path(arg: &str) -> Result<ResourcePath> {
    let trimmed = arg.trim();
    let trimmed = trimmed.strip_prefix("./").unwrap_or(trimmed);
    let trimmed = trimmed.trim_end_matches('/');
    let normalized = if trimmed == "." { "" } else { trimmed };
    ResourcePath::new(normalized).with_context(|| format!("Invalid path '{arg}'"))
}
