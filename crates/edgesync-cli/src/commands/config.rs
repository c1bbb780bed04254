//! Config command - View and validate edgesync configuration
//!
//! Provides the `edgesync config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON) with secrets masked
//! 2. Validates the configuration and reports every problem
//! 3. Prints the configuration file location

use anyhow::{Context as _, Result};
use clap::Subcommand;
use edgesync_core::config::Config;

use super::Context;

const MASK: &str = "********";

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Validate the configuration
    Validate,
    /// Print the configuration file path
    Path,
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(ctx),
            ConfigCommand::Validate => execute_validate(ctx),
            ConfigCommand::Path => execute_path(ctx),
        }
    }
}

/// Copy of `config` with credentials replaced by a mask
fn masked(config: &Config) -> Config {
    let mut shown = config.clone();
    for secret in [
        &mut shown.store.secret_key,
        &mut shown.store.session_token,
    ] {
        if secret.is_some() {
            *secret = Some(MASK.to_string());
        }
    }
    shown
}

fn execute_show(ctx: &Context) -> Result<()> {
    let formatter = ctx.formatter();
    let shown = masked(&ctx.config);

    if ctx.format.is_json() {
        let json = serde_json::to_value(&shown)
            .context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
    } else {
        formatter.success(&format!("Configuration ({})", ctx.config_path.display()));
        let yaml = serde_yaml::to_string(&shown)
            .context("Failed to serialize configuration to YAML")?;
        for line in yaml.lines() {
            formatter.info(line);
        }
    }
    Ok(())
}

fn execute_validate(ctx: &Context) -> Result<()> {
    let formatter = ctx.formatter();
    let errors = ctx.config.validate();

    if ctx.format.is_json() {
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": ctx.config_path.display().to_string(),
            "errors": messages,
        }));
    } else if errors.is_empty() {
        formatter.success(&format!("Configuration is valid ({})", ctx.config_path.display()));
    } else {
        for error in &errors {
            formatter.error(&error.to_string());
        }
    }

    if !errors.is_empty() {
        anyhow::bail!("Configuration has {} error(s)", errors.len());
    }
    Ok(())
}

fn execute_path(ctx: &Context) -> Result<()> {
    let formatter = ctx.formatter();
    if ctx.format.is_json() {
        formatter.print_json(&serde_json::json!({
            "config_path": ctx.config_path.display().to_string(),
            "exists": ctx.config_path.exists(),
        }));
    } else {
        println!("{}", ctx.config_path.display());
    }
    Ok(())
}
