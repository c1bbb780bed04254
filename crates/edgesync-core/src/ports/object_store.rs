//! Object store port (driven/secondary port)
//!
//! This module defines the interface for an S3-style object store. The
//! engine never talks to a store SDK directly; it goes through
//! [`IObjectStore`].
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are adapter-specific
//!   and don't need domain-level classification.
//! - Listing is page-at-a-time; callers own pagination so they can apply
//!   their own continuation policy.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::domain::newtypes::ObjectKey;
use crate::domain::records::RemoteObject;

/// Default page size for listings
pub const DEFAULT_MAX_KEYS: u32 = 1000;

// ============================================================================
// Listing DTOs
// ============================================================================

/// Parameters for one `ListObjects` page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    /// Only keys starting with this string are returned
    pub prefix: String,
    /// Group keys sharing a prefix up to this delimiter into `common_prefixes`
    pub delimiter: Option<String>,
    /// Return keys strictly after this one
    pub marker: Option<String>,
    /// Maximum number of keys per page
    pub max_keys: u32,
}

impl ListRequest {
    /// Request the first page of a recursive listing under `prefix`
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            delimiter: None,
            marker: None,
            max_keys: DEFAULT_MAX_KEYS,
        }
    }

    #[must_use]
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    #[must_use]
    pub fn with_marker(mut self, marker: Option<String>) -> Self {
        self.marker = marker;
        self
    }
}

/// One page of a listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub items: Vec<RemoteObject>,
    /// More results are available
    pub truncated: bool,
    /// Continuation marker, when the store supplies one
    pub next_marker: Option<String>,
    /// Grouped prefixes when a delimiter was requested
    pub common_prefixes: Vec<String>,
}

// ============================================================================
// Upload DTOs
// ============================================================================

/// Source of an object body
#[derive(Debug, Clone)]
pub enum PutBody {
    /// Stream the body from a local file
    File(PathBuf),
    /// Upload an in-memory buffer
    Bytes(Vec<u8>),
}

/// Options for a put
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// Bodies larger than this are sent as multipart uploads
    pub part_size: u64,
    /// User metadata stored with the object (e.g. `md5`)
    pub metadata: BTreeMap<String, String>,
    pub content_type: Option<String>,
}

impl PutOptions {
    #[must_use]
    pub fn new(part_size: u64) -> Self {
        Self {
            part_size,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Store acknowledgement of a completed put
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutReceipt {
    /// Etag reported by the store, quotes stripped
    pub etag: Option<String>,
}

// ============================================================================
// IObjectStore trait
// ============================================================================

/// Port trait for object store operations
///
/// ## Implementation Notes
///
/// - `get_object` returns `Ok(None)` when the key does not exist; any other
///   failure is an error.
/// - `list_objects` must report a transport failure as an error, never as an
///   empty page.
#[async_trait::async_trait]
pub trait IObjectStore: Send + Sync {
    /// Lists one page of objects
    async fn list_objects(&self, request: &ListRequest) -> anyhow::Result<ListPage>;

    /// Downloads an object's full body
    ///
    /// # Returns
    /// `None` if the object does not exist
    async fn get_object(&self, key: &ObjectKey) -> anyhow::Result<Option<Vec<u8>>>;

    /// Uploads an object, overwriting any existing one
    ///
    /// # Arguments
    /// * `key` - Destination key
    /// * `body` - File path or in-memory bytes
    /// * `options` - Part-size hint and object metadata
    async fn put_object(
        &self,
        key: &ObjectKey,
        body: PutBody,
        options: &PutOptions,
    ) -> anyhow::Result<PutReceipt>;

    /// Deletes an object
    async fn delete_object(&self, key: &ObjectKey) -> anyhow::Result<()>;
}
