//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for object keys, sync
//! prefixes and content hashes. Each newtype ensures data validity at
//! construction time.

use std::fmt::{self, Display, Formatter};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// ObjectKey
// ============================================================================

/// A key naming one object in the remote store
///
/// Keys always use `/` separators and never start with `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Create a new ObjectKey
    ///
    /// # Errors
    /// Returns error if the key is empty or starts with `/`
    pub fn new(key: String) -> Result<Self, DomainError> {
        if key.is_empty() {
            return Err(DomainError::InvalidKey("Key cannot be empty".to_string()));
        }
        if key.starts_with('/') {
            return Err(DomainError::InvalidKey(format!(
                "Key must not start with '/': {key}"
            )));
        }
        Ok(Self(key))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the key ends with the given suffix
    #[must_use]
    pub fn has_suffix(&self, suffix: &str) -> bool {
        !suffix.is_empty() && self.0.ends_with(suffix)
    }

    /// Returns true if the key lives under the given prefix
    #[must_use]
    pub fn is_under(&self, prefix: &KeyPrefix) -> bool {
        self.0.starts_with(prefix.as_dir())
    }
}

impl Display for ObjectKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ObjectKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for ObjectKey {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ObjectKey> for String {
    fn from(key: ObjectKey) -> Self {
        key.0
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// KeyPrefix
// ============================================================================

/// A normalized sync prefix
///
/// Leading and trailing slashes are stripped on construction. The empty
/// prefix denotes the bucket root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct KeyPrefix {
    /// Prefix without trailing slash (`""` for root)
    bare: String,
    /// Prefix with trailing slash (`""` for root)
    dir: String,
}

impl KeyPrefix {
    /// Normalize a user-supplied prefix
    #[must_use]
    pub fn new(raw: &str) -> Self {
        let bare = raw.trim_matches('/').to_string();
        let dir = if bare.is_empty() {
            String::new()
        } else {
            format!("{bare}/")
        };
        Self { bare, dir }
    }

    /// The bucket root
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Returns true if this prefix denotes the bucket root
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.bare.is_empty()
    }

    /// Prefix without trailing slash
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.bare
    }

    /// Prefix with trailing slash, used for listings and key joins
    #[must_use]
    pub fn as_dir(&self) -> &str {
        &self.dir
    }

    /// Key of the ledger document for this prefix
    ///
    /// The ledger sits next to the prefix directory, e.g. `site` ->
    /// `site.meta.json`.
    ///
    /// # Errors
    /// Returns error if the resulting key is invalid (empty suffix at root)
    pub fn ledger_key(&self, suffix: &str) -> Result<ObjectKey, DomainError> {
        ObjectKey::new(format!("{}{}", self.bare, suffix))
    }

    /// Build the remote key for a path relative to the scan root
    ///
    /// Path components are joined with `/` regardless of platform.
    ///
    /// # Errors
    /// Returns error if the path has no usable components
    pub fn key_for(&self, relative: &Path) -> Result<ObjectKey, DomainError> {
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                std::path::Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        if parts.is_empty() {
            return Err(DomainError::InvalidKey(format!(
                "Path has no components: {}",
                relative.display()
            )));
        }

        ObjectKey::new(format!("{}{}", self.dir, parts.join("/")))
    }
}

impl Display for KeyPrefix {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "/")
        } else {
            write!(f, "{}", self.dir)
        }
    }
}

impl From<&str> for KeyPrefix {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

// ============================================================================
// ContentHash
// ============================================================================

/// MD5 content hash, 32 lowercase hexadecimal characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Length of an MD5 digest rendered as hex
    pub const HEX_LEN: usize = 32;

    /// Create a new ContentHash from a hex string
    ///
    /// Uppercase input is accepted and normalized to lowercase.
    ///
    /// # Errors
    /// Returns error if the input is not 32 hexadecimal characters
    pub fn new(hash: String) -> Result<Self, DomainError> {
        if hash.len() != Self::HEX_LEN {
            return Err(DomainError::InvalidHash(format!(
                "expected {} hex characters, got {}",
                Self::HEX_LEN,
                hash.len()
            )));
        }
        if !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DomainError::InvalidHash(format!(
                "not a hexadecimal string: {hash}"
            )));
        }
        Ok(Self(hash.to_ascii_lowercase()))
    }

    /// Build a ContentHash from raw digest bytes
    ///
    /// # Errors
    /// Returns error if the digest is not 16 bytes long
    pub fn from_digest(digest: &[u8]) -> Result<Self, DomainError> {
        Self::new(hex::encode(digest))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare against a digest string recorded elsewhere (ledger md5 or
    /// store etag). Surrounding quotes and letter case are ignored.
    #[must_use]
    pub fn matches(&self, other: &str) -> bool {
        other.trim_matches('"').eq_ignore_ascii_case(&self.0)
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContentHash {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for ContentHash {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}
