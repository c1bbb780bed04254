//! Change detection against the ledger
//!
//! For each local file, decides whether it must be uploaded:
//!
//! 1. No ledger entry, or a different size: upload without hashing.
//! 2. Otherwise hash the file (through the [`HashCache`]) and compare with
//!    the ledger's `md5`, or with its etag when the etag is a plain
//!    single-part digest.
//! 3. With neither usable digest, upload. A multipart etag (`<hash>-<n>`)
//!    is not a content hash, so equality cannot be shown.
//!
//! A hashing failure resolves to "upload" so a transient read error never
//! silently skips a file.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use edgesync_core::domain::{
    ledger::{Ledger, LedgerEntry},
    newtypes::ContentHash,
    records::LocalFileRecord,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::hash_cache::HashCache;
use crate::progress::{format_size, LogProgress, ProgressTracker};
use crate::scanner::LocalMap;
use crate::SyncError;

/// Why a file was selected for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadReason {
    /// The ledger has no entry for the key
    NotInLedger,
    /// Local size differs from the ledger size
    SizeChanged,
    /// Local hash differs from the ledger md5
    ContentChanged,
    /// Local hash differs from a single-part etag
    EtagMismatch,
    /// Only a multipart etag is recorded
    UnverifiableEtag,
    /// The entry carries neither md5 nor etag
    NoRemoteDigest,
    /// Hashing failed; uploading is the safe default
    HashFailed(String),
}

impl fmt::Display for UploadReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInLedger => write!(f, "new file"),
            Self::SizeChanged => write!(f, "size changed"),
            Self::ContentChanged => write!(f, "content changed"),
            Self::EtagMismatch => write!(f, "etag mismatch"),
            Self::UnverifiableEtag => write!(f, "multipart etag"),
            Self::NoRemoteDigest => write!(f, "no remote digest"),
            Self::HashFailed(e) => write!(f, "hash failed: {e}"),
        }
    }
}

/// Outcome of the per-file diff
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffDecision {
    Skip,
    Upload(UploadReason),
}

impl DiffDecision {
    pub fn needs_upload(&self) -> bool {
        matches!(self, Self::Upload(_))
    }
}

/// Returns true for etags of the form `<digest>-<parts>`
pub fn is_multipart_etag(etag: &str) -> bool {
    etag.contains('-')
}

/// Decision that can be made from sizes alone
///
/// Returns `None` when the sizes match and the content must be hashed.
pub fn precheck(local_size: u64, entry: Option<&LedgerEntry>) -> Option<DiffDecision> {
    match entry {
        None => Some(DiffDecision::Upload(UploadReason::NotInLedger)),
        Some(e) if e.size != local_size => Some(DiffDecision::Upload(UploadReason::SizeChanged)),
        Some(_) => None,
    }
}

/// Compare a local hash with the digests recorded in a same-size entry
pub fn compare_digest(entry: &LedgerEntry, local: &ContentHash) -> DiffDecision {
    if let Some(md5) = entry.md5() {
        return if local.matches(md5) {
            DiffDecision::Skip
        } else {
            DiffDecision::Upload(UploadReason::ContentChanged)
        };
    }

    match entry.etag() {
        Some(etag) if is_multipart_etag(etag) => DiffDecision::Upload(UploadReason::UnverifiableEtag),
        Some(etag) if local.matches(etag) => DiffDecision::Skip,
        Some(_) => DiffDecision::Upload(UploadReason::EtagMismatch),
        None => DiffDecision::Upload(UploadReason::NoRemoteDigest),
    }
}

/// A file selected for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUpload {
    pub record: LocalFileRecord,
    pub reason: UploadReason,
}

/// Result of a diff pass
#[derive(Debug, Clone, Default)]
pub struct DeltaPlan {
    /// Files to upload, in key order
    pub to_upload: Vec<PlannedUpload>,
    /// Files examined
    pub examined: usize,
    /// Bytes read to compute hashes (cache hits count their size too)
    pub hashed_bytes: u64,
}

/// Concurrent diff of a local scan against a ledger
pub struct DeltaEngine {
    cache: Arc<HashCache>,
    threads: usize,
    progress_interval: Duration,
}

impl DeltaEngine {
    pub fn new(cache: Arc<HashCache>, threads: usize, progress_interval: Duration) -> Self {
        Self {
            cache,
            threads: threads.max(1),
            progress_interval,
        }
    }

    /// Decide which files of `local` need uploading
    #[instrument(skip_all, fields(files = local.len(), threads = self.threads))]
    pub async fn compute(&self, local: &LocalMap, ledger: &Ledger) -> Result<DeltaPlan, SyncError> {
        info!("Calculating delta");

        let progress = Arc::new(ProgressTracker::new(
            "Diff",
            self.progress_interval,
            Arc::new(LogProgress),
        ));
        progress.reset(local.len() as u64, 0);

        let semaphore = Arc::new(Semaphore::new(self.threads));
        let mut workers = JoinSet::new();

        for record in local.values() {
            let permit = semaphore.clone().acquire_owned().await?;
            let record = record.clone();
            let entry = ledger.get(&record.key).cloned();
            let cache = Arc::clone(&self.cache);
            let progress = Arc::clone(&progress);

            workers.spawn_blocking(move || {
                let _permit = permit;
                let (decision, hashed) = decide(&cache, &record, entry.as_ref());
                progress.advance(1, hashed);
                (record, decision, hashed)
            });
        }

        let mut plan = DeltaPlan {
            examined: local.len(),
            ..DeltaPlan::default()
        };
        while let Some(joined) = workers.join_next().await {
            let (record, decision, hashed) = joined?;
            plan.hashed_bytes += hashed;
            if let DiffDecision::Upload(reason) = decision {
                debug!(key = %record.key, %reason, "Needs upload");
                plan.to_upload.push(PlannedUpload { record, reason });
            }
        }
        progress.finish();

        plan.to_upload.sort_by(|a, b| a.record.key.cmp(&b.record.key));
        info!(
            to_upload = plan.to_upload.len(),
            hashed = %format_size(plan.hashed_bytes),
            "Delta calculated"
        );
        Ok(plan)
    }
}

/// Full per-file decision; blocking when a hash is needed
fn decide(cache: &HashCache, record: &LocalFileRecord, entry: Option<&LedgerEntry>) -> (DiffDecision, u64) {
    if let Some(decision) = precheck(record.size, entry) {
        return (decision, 0);
    }
    let Some(entry) = entry else {
        return (DiffDecision::Upload(UploadReason::NotInLedger), 0);
    };

    match cache.get_or_compute(&record.path) {
        Ok(digest) => (compare_digest(entry, &digest.md5), digest.size),
        Err(e) => {
            warn!(key = %record.key, error = %e, "Failed to hash file, scheduling upload");
            (DiffDecision::Upload(UploadReason::HashFailed(e.to_string())), 0)
        }
    }
}
