//! Config command - View and validate the Bracelet configuration
//!
//! Provides the `bracelet config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Prints the configuration file location
//! 3. Writes a default configuration file
//! 4. Validates the configuration file and reports errors

use std::path::Path;

use anyhow::{bail, Context, Result};
use bracelet_core::config::{Config, ValidationError};
use clap::Subcommand;
use tracing::info;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Print the configuration file path
    Path,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Validate the configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, config: &Config, path: &Path, format: OutputFormat) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(config, path, format),
            ConfigCommand::Path => {
                let formatter = get_formatter(format);
                if matches!(format, OutputFormat::Json) {
                    formatter.print_json(&serde_json::json!({
                        "config_path": path.display().to_string(),
                        "exists": path.exists(),
                    }));
                } else {
                    println!("{}", path.display());
                }
                Ok(())
            }
            ConfigCommand::Init { force } => self.execute_init(path, *force, format),
            ConfigCommand::Validate => self.execute_validate(path, format),
        }
    }

    fn execute_show(&self, config: &Config, path: &Path, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        info!(config_path = %path.display(), "Showing configuration");

        if matches!(format, OutputFormat::Json) {
            let json =
                serde_json::to_value(config).context("Failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
        } else {
            formatter.success(&format!("Configuration ({})", path.display()));
            formatter.info("");
            let yaml =
                serde_yaml::to_string(config).context("Failed to serialize configuration to YAML")?;
            for line in yaml.lines() {
                formatter.info(line);
            }
        }
        Ok(())
    }

    fn execute_init(&self, path: &Path, force: bool, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        write_default(path, force)?;

        if matches!(format, OutputFormat::Json) {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "config_path": path.display().to_string(),
            }));
        } else {
            formatter.success(&format!("Wrote default configuration to {}", path.display()));
        }
        Ok(())
    }

    fn execute_validate(&self, path: &Path, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        if !path.exists() {
            if matches!(format, OutputFormat::Json) {
                formatter.print_json(&serde_json::json!({
                    "valid": false,
                    "config_path": path.display().to_string(),
                    "errors": ["Configuration file not found. Using defaults."],
                }));
            } else {
                formatter.info(&format!("Configuration file not found at {}", path.display()));
                formatter.info("Using defaults. Run 'bracelet config init' to create one.");
            }
            return Ok(());
        }

        info!(config_path = %path.display(), "Validating configuration");
        let errors = match validate_file(path) {
            Ok(errors) => errors,
            Err(e) => {
                if matches!(format, OutputFormat::Json) {
                    formatter.print_json(&serde_json::json!({
                        "valid": false,
                        "config_path": path.display().to_string(),
                        "errors": [format!("{e:#}")],
                    }));
                } else {
                    formatter.error(&format!("{e:#}"));
                    formatter.info(&format!("File: {}", path.display()));
                }
                return Ok(());
            }
        };

        if matches!(format, OutputFormat::Json) {
            let error_strings: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            formatter.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": path.display().to_string(),
                "errors": error_strings,
            }));
        } else if errors.is_empty() {
            formatter.success("Configuration is valid");
            formatter.info(&format!("File: {}", path.display()));
        } else {
            formatter.error(&format!(
                "Configuration has {} error{}:",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" }
            ));
            formatter.info(&format!("File: {}", path.display()));
            formatter.info("");
            for error in &errors {
                formatter.info(&format!("  {} - {}", error.field, error.message));
            }
        }
        Ok(())
    }
}

/// Serializes the default configuration to `path`, creating parent
/// directories.
fn write_default(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create configuration directory")?;
    }
    let yaml =
        serde_yaml::to_string(&Config::default()).context("Failed to serialize configuration")?;
    std::fs::write(path, yaml).context("Failed to write configuration file")?;
    Ok(())
}

/// Parses the file strictly (no fallback to defaults) and validates it.
fn validate_file(path: &Path) -> Result<Vec<ValidationError>> {
    let config = Config::load(path).context("Failed to parse configuration")?;
    Ok(config.validate())
}
