//! Config command - View and validate vcsync configuration
//!
//! Provides the `vcsync config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Validates the configuration file and its glob patterns
//! 3. Prints the configuration file location

use anyhow::{Context as _, Result};
use clap::Subcommand;
use tracing::info;

use vcsync_conflict::policy::validate_pattern;
use vcsync_core::config::{Config, ValidationError};

use super::Context;
use crate::output::OutputFormat;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Validate configuration file
    Validate,
    /// Print the configuration file path
    Path,
}

impl ConfigCommand {
    pub async fn execute(&self, context: &Context, format: OutputFormat) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(context, format),
            ConfigCommand::Validate => execute_validate(context, format),
            ConfigCommand::Path => execute_path(context, format),
        }
    }
}

fn execute_show(context: &Context, format: OutputFormat) -> Result<()> {
    let formatter = context.formatter(format);
    let config_path = &context.config_path;
    info!(config_path = %config_path.display(), "Showing configuration");

    if format.is_json() {
        let json = serde_json::to_value(&context.config)
            .context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
        return Ok(());
    }

    formatter.success(&format!("Configuration ({})", config_path.display()));
    if !config_path.exists() {
        formatter.info("File not found, showing defaults");
    }
    formatter.info("");
    let yaml = serde_yaml::to_string(&context.config)
        .context("Failed to serialize configuration to YAML")?;
    for line in yaml.lines() {
        formatter.info(line);
    }
    Ok(())
}

fn execute_validate(context: &Context, format: OutputFormat) -> Result<()> {
    let formatter = context.formatter(format);
    let config_path = &context.config_path;

    // the default file is optional; an explicit one was loaded already
    let config = if context.explicit_config {
        context.config.clone()
    } else {
        match Config::load(config_path) {
            Ok(config) => config,
            Err(e) => {
                let message = if config_path.exists() {
                    format!("Failed to parse configuration: {e}")
                } else {
                    "Configuration file not found. Using defaults.".to_string()
                };
                if format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "valid": false,
                        "config_path": config_path.display().to_string(),
                        "errors": [message],
                    }));
                } else if config_path.exists() {
                    formatter.error(&message);
                    formatter.info(&format!("File: {}", config_path.display()));
                } else {
                    formatter.info(&format!(
                        "Configuration file not found at {}",
                        config_path.display()
                    ));
                    formatter.info("Using default configuration.");
                }
                return Ok(());
            }
        }
    };

    info!(config_path = %config_path.display(), "Validating configuration");
    let errors = validate_all(&config);

    if format.is_json() {
        let error_strings: Vec<String> = errors.iter().map(ToString::to_string).collect();
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": config_path.display().to_string(),
            "errors": error_strings,
        }));
    } else if errors.is_empty() {
        formatter.success("Configuration is valid");
        formatter.info(&format!("File: {}", config_path.display()));
    } else {
        formatter.error(&format!(
            "Configuration has {} error{}:",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" }
        ));
        formatter.info(&format!("File: {}", config_path.display()));
        formatter.info("");
        for error in &errors {
            formatter.info(&format!("  {} - {}", error.field, error.message));
        }
    }
    Ok(())
}

fn execute_path(context: &Context, format: OutputFormat) -> Result<()> {
    let formatter = context.formatter(format);
    if format.is_json() {
        formatter.print_json(&serde_json::json!({
            "config_path": context.config_path.display().to_string(),
            "exists": context.config_path.exists(),
        }));
    } else {
        println!("{}", context.config_path.display());
    }
    Ok(())
}

/// Structural checks plus glob syntax of every configured pattern
fn validate_all(config: &Config) -> Vec<ValidationError> {
    let mut errors = config.validate();
    let patterns = config
        .workspace
        .global_ignores
        .iter()
        .map(|p| ("workspace.global_ignores", p))
        .chain(
            config
                .keywords
                .binary_patterns
                .iter()
                .map(|p| ("keywords.binary_patterns", p)),
        );
    for (field, pattern) in patterns {
        if let Err(e) = validate_pattern(pattern) {
            errors.push(ValidationError {
                field: field.to_string(),
                message: e.to_string(),
            });
        }
    }
    errors
}
