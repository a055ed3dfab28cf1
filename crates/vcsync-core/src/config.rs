//! Configuration module for vcsync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Revision lookups per status query accepted by common servers
pub const DEFAULT_REVISION_BATCH_SIZE: usize = 1024;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for vcsync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub keywords: KeywordConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Working-copy layout settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Name of the per-folder metadata directory.
    pub metadata_dir: String,
    /// Name of the per-folder ignore-pattern file.
    pub ignore_file: String,
    /// Glob patterns ignored in every folder, on top of the built-in defaults.
    pub global_ignores: Vec<String>,
}

/// Remote tree building settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Maximum number of files per status query.
    pub revision_batch_size: usize,
    /// Drop empty folders from remote trees.
    pub prune_empty_directories: bool,
}

/// Keyword substitution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordConfig {
    /// Mode recorded for text files (empty for the default `-kkv`).
    pub default_mode: String,
    /// File-name globs recorded as binary (`-kb`) when added.
    pub binary_patterns: Vec<String>,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/vcsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("vcsync")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            metadata_dir: "CVS".to_string(),
            ignore_file: ".cvsignore".to_string(),
            global_ignores: Vec::new(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            revision_batch_size: DEFAULT_REVISION_BATCH_SIZE,
            prune_empty_directories: false,
        }
    }
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            default_mode: String::new(),
            binary_patterns: [
                "*.png", "*.gif", "*.jpg", "*.jpeg", "*.ico", "*.bmp", "*.zip", "*.gz", "*.tgz",
                "*.jar", "*.war", "*.class", "*.pdf", "*.exe", "*.dll", "*.so", "*.a", "*.o",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"remote.revision_batch_size"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `keywords.default_mode`.
const VALID_KEYWORD_MODES: &[&str] = &["", "-kkv", "-kkvl", "-kk", "-kv", "-ko", "-kb"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- workspace ---
        for (field, value) in [
            ("workspace.metadata_dir", &self.workspace.metadata_dir),
            ("workspace.ignore_file", &self.workspace.ignore_file),
        ] {
            if value.trim().is_empty() {
                errors.push(ValidationError {
                    field: field.into(),
                    message: "must not be empty".into(),
                });
            } else if value.contains('/') || value == "." || value == ".." {
                errors.push(ValidationError {
                    field: field.into(),
                    message: format!("must be a plain file name, got '{value}'"),
                });
            }
        }
        if self.workspace.metadata_dir == self.workspace.ignore_file {
            errors.push(ValidationError {
                field: "workspace.ignore_file".into(),
                message: "must differ from workspace.metadata_dir".into(),
            });
        }
        if self
            .workspace
            .global_ignores
            .iter()
            .any(|p| p.trim().is_empty())
        {
            errors.push(ValidationError {
                field: "workspace.global_ignores".into(),
                message: "patterns must not be empty".into(),
            });
        }

        // --- remote ---
        if self.remote.revision_batch_size == 0 {
            errors.push(ValidationError {
                field: "remote.revision_batch_size".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- keywords ---
        if !VALID_KEYWORD_MODES.contains(&self.keywords.default_mode.as_str()) {
            errors.push(ValidationError {
                field: "keywords.default_mode".into(),
                message: format!(
                    "invalid mode '{}'; valid options: {}",
                    self.keywords.default_mode,
                    VALID_KEYWORD_MODES[1..].join(", ")
                ),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use vcsync_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .remote_revision_batch_size(512)
///     .remote_prune_empty_directories(true)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- workspace ---

    pub fn workspace_metadata_dir(mut self, name: impl Into<String>) -> Self {
        self.config.workspace.metadata_dir = name.into();
        self
    }

    pub fn workspace_ignore_file(mut self, name: impl Into<String>) -> Self {
        self.config.workspace.ignore_file = name.into();
        self
    }

    pub fn workspace_global_ignore(mut self, pattern: impl Into<String>) -> Self {
        self.config.workspace.global_ignores.push(pattern.into());
        self
    }

    // --- remote ---

    pub fn remote_revision_batch_size(mut self, size: usize) -> Self {
        self.config.remote.revision_batch_size = size;
        self
    }

    pub fn remote_prune_empty_directories(mut self, prune: bool) -> Self {
        self.config.remote.prune_empty_directories = prune;
        self
    }

    // --- keywords ---

    pub fn keywords_default_mode(mut self, mode: impl Into<String>) -> Self {
        self.config.keywords.default_mode = mode.into();
        self
    }

    pub fn keywords_binary_patterns(mut self, patterns: Vec<String>) -> Self {
        self.config.keywords.binary_patterns = patterns;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
