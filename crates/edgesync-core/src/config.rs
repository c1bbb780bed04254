//! Configuration module for edgesync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, environment overrides, validation, defaults, and a builder
//! pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for edgesync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub sync: SyncConfig,
    pub cdn: CdnConfig,
    pub logging: LoggingConfig,
}

/// Object store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// S3-compatible endpoint. When unset, the Tencent COS endpoint for
    /// `region` is used.
    pub endpoint: Option<String>,
    /// Store region, e.g. `ap-singapore`.
    pub region: String,
    /// Bucket name (for COS, including the APPID suffix).
    pub bucket: String,
    pub secret_id: Option<String>,
    pub secret_key: Option<String>,
    /// Temporary credential token, if any.
    pub session_token: Option<String>,
    /// Address buckets as `endpoint/bucket` instead of `bucket.endpoint`.
    pub force_path_style: bool,
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Width of the diff and upload worker pools.
    pub threads: usize,
    /// Read size (in MiB) used when hashing file content.
    pub hash_chunk_mb: u64,
    /// Files above this size (in MiB) are uploaded as multipart.
    pub part_size_mb: u64,
    /// Minimum milliseconds between progress reports.
    pub progress_interval_ms: u64,
    /// Suffix appended to the prefix to name the ledger document.
    pub ledger_suffix: String,
    /// Keys with this suffix are uploaded after all other files.
    pub manifest_suffix: String,
    /// Remove ledger entries whose local file no longer exists.
    pub prune_missing: bool,
    /// Path of the persistent hash cache. `None` disables the cache file.
    pub hash_cache: Option<PathBuf>,
}

/// CDN purge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CdnConfig {
    /// EdgeOne API endpoint.
    pub endpoint: String,
    /// Region sent with API calls. Empty means none.
    pub region: String,
    /// Default zone for `flush` when none is given on the command line.
    pub zone_id: Option<String>,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

/// Environment variable overriding `store.secret_id`.
pub const ENV_SECRET_ID: &str = "EDGESYNC_SECRET_ID";
/// Environment variable overriding `store.secret_key`.
pub const ENV_SECRET_KEY: &str = "EDGESYNC_SECRET_KEY";
/// Environment variable overriding `store.session_token`.
pub const ENV_SESSION_TOKEN: &str = "EDGESYNC_SESSION_TOKEN";

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
    /// Typically `$XDG_CONFIG_HOME/edgesync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("edgesync")
            .join("config.yaml")
    }

    /// Overlay credentials from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Overlay credentials from `lookup`. Empty values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(id) = get(ENV_SECRET_ID) {
            self.store.secret_id = Some(id);
        }
        if let Some(key) = get(ENV_SECRET_KEY) {
            self.store.secret_key = Some(key);
        }
        if let Some(token) = get(ENV_SESSION_TOKEN) {
            self.store.session_token = Some(token);
        }
    }
}

impl SyncConfig {
    /// Hash read size in bytes.
    pub fn hash_chunk_bytes(&self) -> usize {
        usize::try_from(self.hash_chunk_mb.saturating_mul(1024 * 1024)).unwrap_or(usize::MAX)
    }

    /// Multipart threshold in bytes.
    pub fn part_size_bytes(&self) -> u64 {
        self.part_size_mb.saturating_mul(1024 * 1024)
    }

    /// Progress throttle interval.
    pub fn progress_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.progress_interval_ms)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: "ap-singapore".to_string(),
            bucket: String::new(),
            secret_id: None,
            secret_key: None,
            session_token: None,
            force_path_style: false,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            threads: 8,
            hash_chunk_mb: 4,
            part_size_mb: 4,
            progress_interval_ms: 1000,
            ledger_suffix: ".meta.json".to_string(),
            manifest_suffix: ".version".to_string(),
            prune_missing: false,
            hash_cache: None,
        }
    }
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://teo.tencentcloudapi.com".to_string(),
            region: String::new(),
            zone_id: None,
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
    /// Dotted path to the offending field, e.g. `"sync.threads"`.
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

/// Upper bound for `sync.threads`.
pub const MAX_THREADS: usize = 64;

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: &str, message: String| {
            errors.push(ValidationError {
                field: field.into(),
                message,
            });
        };

        // --- store ---
        if self.store.region.trim().is_empty() {
            push("store.region", "must not be empty".into());
        }
        if let Some(endpoint) = &self.store.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                push(
                    "store.endpoint",
                    format!("must be an http(s) URL, got {endpoint:?}"),
                );
            }
        }

        // --- sync ---
        if self.sync.threads == 0 || self.sync.threads > MAX_THREADS {
            push(
                "sync.threads",
                format!("must be between 1 and {MAX_THREADS}"),
            );
        }
        if self.sync.hash_chunk_mb == 0 {
            push("sync.hash_chunk_mb", "must be greater than 0".into());
        }
        if self.sync.part_size_mb == 0 {
            push("sync.part_size_mb", "must be greater than 0".into());
        }
        if self.sync.ledger_suffix.is_empty() {
            push("sync.ledger_suffix", "must not be empty".into());
        }
        if self.sync.manifest_suffix.is_empty() {
            push("sync.manifest_suffix", "must not be empty".into());
        }

        // --- cdn ---
        if !self.cdn.endpoint.starts_with("http://") && !self.cdn.endpoint.starts_with("https://")
        {
            push(
                "cdn.endpoint",
                format!("must be an http(s) URL, got {:?}", self.cdn.endpoint),
            );
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            push(
                "logging.level",
                format!(
                    "invalid log level '{}'; expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            );
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`Config`], starting from defaults.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Start from [`Config::default`].
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- store ---

    pub fn store_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.store.endpoint = Some(endpoint.into());
        self
    }

    pub fn store_region(mut self, region: impl Into<String>) -> Self {
        self.config.store.region = region.into();
        self
    }

    pub fn store_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.store.bucket = bucket.into();
        self
    }

    pub fn store_credentials(mut self, id: impl Into<String>, key: impl Into<String>) -> Self {
        self.config.store.secret_id = Some(id.into());
        self.config.store.secret_key = Some(key.into());
        self
    }

    // --- sync ---

    pub fn sync_threads(mut self, n: usize) -> Self {
        self.config.sync.threads = n;
        self
    }

    pub fn sync_hash_chunk_mb(mut self, mb: u64) -> Self {
        self.config.sync.hash_chunk_mb = mb;
        self
    }

    pub fn sync_part_size_mb(mut self, mb: u64) -> Self {
        self.config.sync.part_size_mb = mb;
        self
    }

    pub fn sync_progress_interval_ms(mut self, ms: u64) -> Self {
        self.config.sync.progress_interval_ms = ms;
        self
    }

    pub fn sync_prune_missing(mut self, prune: bool) -> Self {
        self.config.sync.prune_missing = prune;
        self
    }

    pub fn sync_hash_cache(mut self, path: PathBuf) -> Self {
        self.config.sync.hash_cache = Some(path);
        self
    }

    // --- cdn ---

    pub fn cdn_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.cdn.endpoint = endpoint.into();
        self
    }

    pub fn cdn_zone_id(mut self, zone_id: impl Into<String>) -> Self {
        self.config.cdn.zone_id = Some(zone_id.into());
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
