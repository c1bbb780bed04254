//! edgesync Sync - Ledger-driven incremental sync engine
//!
//! Provides:
//! - Local tree scanning and content hashing with a persistent cache
//! - Change detection against a remote metadata ledger
//! - Ordered, concurrent uploads (content before manifests)
//! - Consistency-gated deletion of untracked remote objects
//!
//! ## Modules
//!
//! - [`scanner`] - Walks the local tree into key -> file records
//! - [`hash_cache`] - Identity-keyed MD5 cache persisted between runs
//! - [`ledger`] - Loads and saves the per-prefix ledger document
//! - [`delta`] - Decides which files must be uploaded
//! - [`uploader`] - Two-phase concurrent uploads
//! - [`listing`] - Paginated remote listings
//! - [`reconciler`] - Deletes remote objects absent from the ledger
//! - [`engine`] - Orchestrates one sync run
//! - [`progress`] - Throttled progress reporting

pub mod delta;
pub mod engine;
pub mod hash_cache;
pub mod ledger;
pub mod listing;
pub mod progress;
pub mod reconciler;
pub mod scanner;
pub mod uploader;

pub use engine::{SyncRequest, SyncSettings, SyncSummary, Synchronizer, UploadFailure};
pub use reconciler::ConsistencyReport;

use thiserror::Error;

/// Errors that abort a sync run
///
/// Per-file failures (hashing, a single upload, a single delete) are not
/// errors; they are reported through typed outcomes and the run continues.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The local tree could not be scanned
    #[error("Local scan failed: {0}")]
    Scan(#[from] scanner::ScanError),

    /// The remote listing failed; the remote is never assumed empty
    #[error("ListObjects failed: {0:#}")]
    Listing(anyhow::Error),

    /// The ledger disagrees with the live listing; nothing was deleted
    #[error("{0}")]
    Consistency(ConsistencyReport),

    /// The updated ledger could not be written
    #[error("Failed to save ledger {key}: {cause:#}")]
    LedgerSave { key: String, cause: anyhow::Error },

    /// A worker task panicked or was cancelled
    #[error("Worker task failed: {0}")]
    Task(String),

    /// A domain-level error propagated from edgesync-core
    #[error("Domain error: {0}")]
    Domain(#[from] edgesync_core::domain::errors::DomainError),
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

impl From<tokio::sync::AcquireError> for SyncError {
    fn from(err: tokio::sync::AcquireError) -> Self {
        Self::Task(err.to_string())
    }
}
