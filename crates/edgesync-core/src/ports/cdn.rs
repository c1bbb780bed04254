//! CDN purge port
//!
//! Invalidates cached copies of a URL or of every URL under a prefix. The
//! purger is stateless and independent of the sync engine.

use serde::{Deserialize, Serialize};

/// What a purge target denotes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurgeKind {
    /// A single URL
    Url,
    /// Every URL under a prefix
    Prefix,
}

impl PurgeKind {
    /// Targets ending in `/` are prefixes, anything else is a single URL
    #[must_use]
    pub fn for_target(target: &str) -> Self {
        if target.ends_with('/') {
            Self::Prefix
        } else {
            Self::Url
        }
    }
}

/// Result of an accepted purge request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeReceipt {
    /// Provider task identifier
    pub job_id: Option<String>,
    /// Provider request identifier
    pub request_id: Option<String>,
}

/// Port trait for CDN cache invalidation
#[async_trait::async_trait]
pub trait ICdnPurger: Send + Sync {
    /// Invalidates `target` (URL or prefix) in the given zone
    async fn purge(&self, target: &str, zone_id: &str) -> anyhow::Result<PurgeReceipt>;
}
