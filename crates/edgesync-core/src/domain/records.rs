//! Scan-scoped records
//!
//! These records are built fresh during one sync run and never persisted.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::ObjectKey;

/// A regular file found under the local scan root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileRecord {
    /// Remote key the file maps to
    pub key: ObjectKey,
    /// Absolute local path
    pub path: PathBuf,
    /// Size in bytes at scan time
    pub size: u64,
}

impl LocalFileRecord {
    #[must_use]
    pub fn new(key: ObjectKey, path: PathBuf, size: u64) -> Self {
        Self { key, path, size }
    }
}

/// One object from a remote listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    pub key: ObjectKey,
    pub size: u64,
    /// Etag as reported by the store, quotes stripped
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl RemoteObject {
    #[must_use]
    pub fn new(key: ObjectKey, size: u64) -> Self {
        Self {
            key,
            size,
            etag: None,
            last_modified: None,
        }
    }

    /// Set the etag, stripping surrounding quotes
    #[must_use]
    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        let etag: String = etag.into();
        self.etag = Some(etag.trim_matches('"').to_string());
        self
    }

    #[must_use]
    pub fn with_last_modified(mut self, at: DateTime<Utc>) -> Self {
        self.last_modified = Some(at);
        self
    }
}
