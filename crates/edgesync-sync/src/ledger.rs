//! Remote ledger persistence
//!
//! One JSON document per sync prefix, stored next to the prefix directory
//! (`site` -> `site.meta.json`). Loading never fails: a first sync has no
//! ledger, and a body that is not a JSON object is treated the same way so
//! the run rebuilds it. Damaged entries inside a valid object are kept with
//! defaulted fields.

use std::sync::Arc;

use edgesync_core::{
    domain::{
        errors::DomainError,
        ledger::{Ledger, LedgerEntry},
        newtypes::{KeyPrefix, ObjectKey},
    },
    ports::object_store::{IObjectStore, PutBody, PutOptions},
};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::hash_cache::hash_bytes;

/// Longest content preview logged for an unparseable ledger
const PREVIEW_CHARS: usize = 200;

/// Part size used when writing the ledger document
const LEDGER_PART_SIZE: u64 = 1024 * 1024;

/// Why a ledger body was rejected
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerParseError {
    #[error("ledger is empty")]
    Empty,

    #[error("ledger is not valid UTF-8")]
    NotUtf8,

    #[error("ledger is not a JSON object")]
    NotAnObject,

    #[error("invalid ledger JSON: {0}")]
    Json(String),
}

/// Parse a ledger document body
pub fn parse_ledger(body: &[u8]) -> Result<Ledger, LedgerParseError> {
    let text = std::str::from_utf8(body).map_err(|_| LedgerParseError::NotUtf8)?;
    if text.trim().is_empty() {
        return Err(LedgerParseError::Empty);
    }

    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| LedgerParseError::Json(e.to_string()))?;
    let serde_json::Value::Object(raw) = value else {
        return Err(LedgerParseError::NotAnObject);
    };

    // Damaged entries are kept with defaulted fields; only an unusable key
    // drops an entry.
    let mut ledger = Ledger::new();
    for (raw_key, raw_entry) in raw {
        let key = match ObjectKey::new(raw_key) {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "Skipping ledger entry with invalid key");
                continue;
            }
        };
        let (entry, issues) = LedgerEntry::from_value_lenient(raw_entry);
        if !issues.is_empty() {
            warn!(%key, issues = %issues.join("; "), "Ledger entry partly unreadable, keeping it");
        }
        ledger.upsert(key, entry);
    }
    Ok(ledger)
}

/// Serialize a ledger as compact JSON
pub fn serialize_ledger(ledger: &Ledger) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(ledger)
}

/// Reads and writes the ledger document for one prefix
pub struct MetaLedger {
    store: Arc<dyn IObjectStore>,
    key: ObjectKey,
}

impl MetaLedger {
    /// # Errors
    /// Returns error if `prefix` and `suffix` do not form a valid key
    pub fn new(
        store: Arc<dyn IObjectStore>,
        prefix: &KeyPrefix,
        suffix: &str,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            store,
            key: prefix.ledger_key(suffix)?,
        })
    }

    /// Key of the ledger document
    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    /// Fetch the ledger, degrading to an empty one on any failure
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn load(&self) -> Ledger {
        info!("Downloading ledger");

        let body = match self.store.get_object(&self.key).await {
            Ok(Some(body)) => body,
            Ok(None) => {
                info!("Ledger does not exist yet");
                return Ledger::new();
            }
            Err(e) => {
                error!(error = %format!("{e:#}"), "Failed to download ledger");
                return Ledger::new();
            }
        };

        info!(bytes = body.len(), "Ledger downloaded");

        match parse_ledger(&body) {
            Ok(ledger) => {
                info!(entries = ledger.len(), "Loaded ledger");
                ledger
            }
            Err(LedgerParseError::Empty) => {
                warn!("Ledger is empty");
                Ledger::new()
            }
            Err(e) => {
                let text = String::from_utf8_lossy(&body);
                let preview: String = text.chars().take(PREVIEW_CHARS).collect();
                error!(error = %e, %preview, "Failed to parse ledger, treating as empty");
                Ledger::new()
            }
        }
    }

    /// Overwrite the ledger document with `ledger`
    ///
    /// The body is stored with an `md5` metadata field for integrity checks.
    #[instrument(skip(self, ledger), fields(key = %self.key, entries = ledger.len()))]
    pub async fn save(&self, ledger: &Ledger) -> anyhow::Result<()> {
        let body = serialize_ledger(ledger)?;
        let md5 = hash_bytes(&body)?;
        info!(bytes = body.len(), "Uploading ledger");

        let options = PutOptions::new(LEDGER_PART_SIZE)
            .with_metadata("md5", md5.as_str())
            .with_content_type("application/json");
        self.store
            .put_object(&self.key, PutBody::Bytes(body), &options)
            .await?;

        info!("Ledger updated");
        Ok(())
    }
}
