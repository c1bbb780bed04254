//! Metadata ledger document
//!
//! The ledger is a single JSON object per sync prefix mapping every remote
//! key this tool believes exists to its size, content hash and store etag.
//! It is the source of truth for change detection; the store's own listing
//! is only consulted during reconciliation.

use std::collections::btree_map;
use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::newtypes::{ContentHash, KeyPrefix, ObjectKey};

/// One ledger record describing a remote object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Object size in bytes, as recorded when its hash was computed
    #[serde(default, deserialize_with = "deserialize_size")]
    pub size: u64,

    /// Hex MD5 of the object content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,

    /// Etag reported by the store when the object was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    /// Fields written by other tools
    ///
    /// Kept on load and save, and carried over when the key is re-uploaded.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl LedgerEntry {
    /// Create an entry for a freshly uploaded object
    ///
    /// When the store reports no etag, the content hash stands in for it.
    #[must_use]
    pub fn uploaded(size: u64, md5: &ContentHash, etag: Option<String>) -> Self {
        let etag = etag
            .map(|e| e.trim_matches('"').to_string())
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| md5.as_str().to_string());
        Self {
            size,
            md5: Some(md5.as_str().to_string()),
            etag: Some(etag),
            extra: BTreeMap::new(),
        }
    }

    /// Create an entry for an object uploaded without a known content hash
    ///
    /// Only the size and store etag are recorded, so the next run verifies
    /// the object through the etag or uploads it again.
    #[must_use]
    pub fn unverified(size: u64, etag: Option<String>) -> Self {
        Self {
            size,
            md5: None,
            etag: etag
                .map(|e| e.trim_matches('"').to_string())
                .filter(|e| !e.is_empty()),
            extra: BTreeMap::new(),
        }
    }

    /// Keep fields written by other tools from the entry this one replaces
    #[must_use]
    pub fn with_extra_from(mut self, previous: Option<&LedgerEntry>) -> Self {
        if let Some(previous) = previous {
            for (name, value) in &previous.extra {
                self.extra.entry(name.clone()).or_insert_with(|| value.clone());
            }
        }
        self
    }

    /// Build an entry from loosely typed JSON without ever failing
    ///
    /// Fields that cannot be read are dropped and described in the returned
    /// notes. An unreadable size becomes 0, which never matches a real
    /// object, so the entry forces an upload and blocks reconciliation
    /// instead of vanishing from the ledger.
    #[must_use]
    pub fn from_value_lenient(value: Value) -> (Self, Vec<String>) {
        let mut fields = match value {
            Value::Object(fields) => fields,
            other => {
                let entry = Self::unverified(0, None);
                return (entry, vec![format!("entry is not an object: {other}")]);
            }
        };

        let mut issues = Vec::new();
        let size = match fields.remove("size") {
            None | Some(Value::Null) => 0,
            Some(raw) => size_from_value(&raw).unwrap_or_else(|| {
                issues.push(format!("invalid size: {raw}"));
                0
            }),
        };
        let md5 = take_text(&mut fields, "md5", &mut issues);
        let etag = take_text(&mut fields, "etag", &mut issues);

        let entry = Self {
            size,
            md5,
            etag,
            extra: fields.into_iter().collect(),
        };
        (entry, issues)
    }

    /// Recorded md5, if present and non-empty
    #[must_use]
    pub fn md5(&self) -> Option<&str> {
        self.md5.as_deref().filter(|s| !s.is_empty())
    }

    /// Recorded etag with quotes stripped, if present and non-empty
    #[must_use]
    pub fn etag(&self) -> Option<&str> {
        self.etag
            .as_deref()
            .map(|s| s.trim_matches('"'))
            .filter(|s| !s.is_empty())
    }
}

/// Accept sizes written as integers, integral floats or numeric strings
fn deserialize_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value = Value::deserialize(deserializer)?;
    size_from_value(&value).ok_or_else(|| D::Error::custom(format!("invalid size: {value}")))
}

/// Read a size written as an integer, an integral float or a numeric string
#[must_use]
pub fn size_from_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

/// Take an optional string field out of `fields`, noting a wrong type
fn take_text(fields: &mut Map<String, Value>, name: &str, issues: &mut Vec<String>) -> Option<String> {
    match fields.remove(name) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => {
            issues.push(format!("{name} is not a string: {other}"));
            None
        }
    }
}

/// The ledger document for one prefix
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    entries: BTreeMap<ObjectKey, LedgerEntry>,
}

impl Ledger {
    /// Create an empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the ledger has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry
    #[must_use]
    pub fn get(&self, key: &ObjectKey) -> Option<&LedgerEntry> {
        self.entries.get(key)
    }

    /// Returns true if the ledger tracks the key
    #[must_use]
    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace an entry, returning true if the document changed
    pub fn upsert(&mut self, key: ObjectKey, entry: LedgerEntry) -> bool {
        match self.entries.get(&key) {
            Some(existing) if *existing == entry => false,
            _ => {
                self.entries.insert(key, entry);
                true
            }
        }
    }

    /// Remove an entry
    pub fn remove(&mut self, key: &ObjectKey) -> Option<LedgerEntry> {
        self.entries.remove(key)
    }

    /// Drop entries under `prefix` for which `keep` returns false
    ///
    /// Returns the removed keys. Entries outside the prefix are never touched.
    pub fn prune_under<F>(&mut self, prefix: &KeyPrefix, mut keep: F) -> Vec<ObjectKey>
    where
        F: FnMut(&ObjectKey) -> bool,
    {
        let doomed: Vec<ObjectKey> = self
            .entries
            .keys()
            .filter(|k| k.is_under(prefix) && !keep(k))
            .cloned()
            .collect();
        for key in &doomed {
            self.entries.remove(key);
        }
        doomed
    }

    /// Iterate over entries in key order
    pub fn iter(&self) -> btree_map::Iter<'_, ObjectKey, LedgerEntry> {
        self.entries.iter()
    }

    /// Iterate over keys in key order
    pub fn keys(&self) -> btree_map::Keys<'_, ObjectKey, LedgerEntry> {
        self.entries.keys()
    }
}

impl FromIterator<(ObjectKey, LedgerEntry)> for Ledger {
    fn from_iter<T: IntoIterator<Item = (ObjectKey, LedgerEntry)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Ledger {
    type Item = (&'a ObjectKey, &'a LedgerEntry);
    type IntoIter = btree_map::Iter<'a, ObjectKey, LedgerEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
