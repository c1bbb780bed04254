//! CLI command implementations

pub mod config;
pub mod flush;
pub mod list;
pub mod sync;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use edgesync_cloud::S3ObjectStore;
use edgesync_core::config::Config;
use edgesync_core::ports::object_store::IObjectStore;

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

/// State shared by every command
pub struct Context {
    pub config: Config,
    pub config_path: PathBuf,
    pub format: OutputFormat,
    pub quiet: bool,
}

impl Context {
    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        get_formatter(self.format, self.quiet)
    }

    /// Object store for the configured bucket
    pub fn object_store(&self) -> Result<Arc<dyn IObjectStore>> {
        let store = S3ObjectStore::new(&self.config.store).context("Failed to configure object store")?;
        Ok(Arc::new(store))
    }
}

/// Load configuration and overlay credentials from the environment
///
/// An explicit path must exist and parse; the default path falls back to
/// built-in defaults when absent.
pub fn load_config(explicit: Option<&Path>) -> Result<(Config, PathBuf)> {
    let (mut config, path) = match explicit {
        Some(path) => {
            let config = Config::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?;
            (config, path.to_path_buf())
        }
        None => {
            let path = Config::default_path();
            (Config::load_or_default(&path), path)
        }
    };
    config.apply_env_overrides();
    Ok((config, path))
}

/// Fail with every validation problem joined into one message
pub fn ensure_valid(config: &Config) -> Result<()> {
    let errors = config.validate();
    if errors.is_empty() {
        return Ok(());
    }
    let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
    anyhow::bail!("Invalid configuration: {}", messages.join("; "))
}
