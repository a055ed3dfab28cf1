//! Keyword mode rules for newly added files
//!
//! File names are matched against binary glob rules in first-match-wins
//! order. Names matching no rule get the configured text mode.

use glob::Pattern;
use tracing::{debug, trace};

use vcsync_core::config::KeywordConfig;
use vcsync_core::domain::KeywordMode;

use crate::error::ConflictError;

/// Validates a single binary file-name pattern
pub fn validate_pattern(pattern: &str) -> Result<(), ConflictError> {
    Pattern::new(pattern).map_err(|e| ConflictError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;
    Ok(())
}

/// Chooses the keyword mode recorded for a file scheduled for addition
#[derive(Debug, Clone)]
pub struct KeywordPolicy {
    binary: Vec<Pattern>,
    default_mode: KeywordMode,
}

impl KeywordPolicy {
    /// Creates a policy from the text mode and a list of binary patterns
    ///
    /// Invalid patterns are logged and skipped.
    pub fn new(default_mode: KeywordMode, binary_patterns: &[String]) -> Self {
        let binary: Vec<Pattern> = binary_patterns
            .iter()
            .filter_map(|raw| match Pattern::new(raw) {
                Ok(p) => Some(p),
                Err(e) => {
                    tracing::warn!(
                        pattern = %raw,
                        error = %e,
                        "Skipping invalid binary file pattern"
                    );
                    None
                }
            })
            .collect();

        debug!(
            rules_count = binary.len(),
            default = %default_mode.to_entry_line(),
            "KeywordPolicy initialized"
        );

        Self {
            binary,
            default_mode,
        }
    }

    pub fn from_config(config: &KeywordConfig) -> Self {
        Self::new(
            KeywordMode::from_entry_line(&config.default_mode),
            &config.binary_patterns,
        )
    }

    /// Keyword mode for a file called `name`
    pub fn mode_for(&self, name: &str) -> KeywordMode {
        for pattern in &self.binary {
            if pattern.matches(name) {
                trace!(name, pattern = %pattern, "Binary file rule matched");
                return KeywordMode::binary();
            }
        }
        self.default_mode.clone()
    }

    pub fn default_mode(&self) -> &KeywordMode {
        &self.default_mode
    }

    /// Returns the number of compiled rules
    pub fn rules_count(&self) -> usize {
        self.binary.len()
    }
}

impl Default for KeywordPolicy {
    fn default() -> Self {
        Self::from_config(&KeywordConfig::default())
    }
}
