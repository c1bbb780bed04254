//! Sync orchestration
//!
//! One run moves through fixed stages:
//!
//! ```text
//! LoadLedger -> [ScanAndDiff -> Upload] -> [SaveLedger] -> [Reconcile] -> Report
//! ```
//!
//! Scan, diff and upload run only with a local directory. The ledger is
//! saved only if it changed. Reconciliation runs only when deletion was
//! requested, after the ledger is up to date. A fatal error at any stage
//! stops the run; nothing after it executes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use edgesync_core::{
    config::SyncConfig,
    domain::{
        ledger::{Ledger, LedgerEntry},
        newtypes::KeyPrefix,
    },
    ports::object_store::IObjectStore,
};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::delta::DeltaEngine;
use crate::hash_cache::HashCache;
use crate::ledger::MetaLedger;
use crate::progress::{format_size, LogProgress, ProgressSink};
use crate::reconciler::Reconciler;
use crate::scanner::{scan_directory, LocalMap};
use crate::uploader::{FileUploadOutcome, Uploader};
use crate::SyncError;

// ============================================================================
// Settings and request
// ============================================================================

/// Engine tunables, usually taken from [`SyncConfig`]
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub threads: usize,
    pub hash_chunk_bytes: usize,
    pub part_size: u64,
    pub progress_interval: Duration,
    pub ledger_suffix: String,
    pub manifest_suffix: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SyncSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            threads: config.threads.max(1),
            hash_chunk_bytes: config.hash_chunk_bytes(),
            part_size: config.part_size_bytes(),
            progress_interval: config.progress_interval(),
            ledger_suffix: config.ledger_suffix.clone(),
            manifest_suffix: config.manifest_suffix.clone(),
        }
    }
}

/// What one run should do
#[derive(Debug, Clone, Default)]
pub struct SyncRequest {
    /// Remote prefix the ledger describes
    pub prefix: KeyPrefix,
    /// Local tree to upload; `None` skips scan, diff and upload
    pub local_dir: Option<PathBuf>,
    /// Delete remote objects the ledger does not track
    pub delete_extra: bool,
    /// Drop ledger entries whose local file is gone
    pub prune_missing: bool,
    /// Persistent hash cache file
    pub hash_cache: Option<PathBuf>,
}

impl SyncRequest {
    pub fn new(prefix: KeyPrefix) -> Self {
        Self {
            prefix,
            ..Self::default()
        }
    }

    pub fn with_local_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.local_dir = Some(dir.into());
        self
    }

    pub fn with_delete(mut self, delete: bool) -> Self {
        self.delete_extra = delete;
        self
    }

    pub fn with_prune(mut self, prune: bool) -> Self {
        self.prune_missing = prune;
        self
    }

    pub fn with_hash_cache(mut self, path: Option<PathBuf>) -> Self {
        self.hash_cache = path;
        self
    }
}

// ============================================================================
// SyncSummary
// ============================================================================

/// A file that could not be uploaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadFailure {
    pub key: String,
    pub error: String,
}

/// Result of a sync run
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncSummary {
    /// Local files found
    pub scanned_local: usize,
    /// Entries in the ledger as loaded
    pub scanned_remote: usize,
    /// Files selected by the diff
    pub to_upload: usize,
    /// Uploads the store confirmed
    pub uploaded: usize,
    pub upload_failed: usize,
    pub failures: Vec<UploadFailure>,
    /// Ledger entries dropped because the local file is gone
    pub pruned: usize,
    pub deleted: usize,
    pub delete_failed: usize,
    /// Bytes of confirmed uploads
    pub total_bytes: u64,
    /// Bytes covered by content hashing during the diff
    pub hashed_bytes: u64,
    pub ledger_saved: bool,
    /// Entries in the ledger at the end of the run
    pub ledger_entries: usize,
    pub elapsed_secs: f64,
}

// ============================================================================
// Synchronizer
// ============================================================================

/// Runs one-way syncs from a local tree to an object store prefix
pub struct Synchronizer {
    store: Arc<dyn IObjectStore>,
    settings: SyncSettings,
    upload_progress: Arc<dyn ProgressSink>,
}

impl Synchronizer {
    pub fn new(store: Arc<dyn IObjectStore>, settings: SyncSettings) -> Self {
        Self {
            store,
            settings,
            upload_progress: Arc::new(LogProgress),
        }
    }

    /// Route upload progress to `sink` (e.g. an in-place terminal line)
    pub fn with_upload_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.upload_progress = sink;
        self
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Execute one sync run
    ///
    /// # Errors
    /// Returns the first fatal stage failure: scan, listing, ledger save,
    /// or a consistency violation during reconciliation.
    #[instrument(skip(self, request), fields(prefix = %request.prefix))]
    pub async fn sync(&self, request: &SyncRequest) -> Result<SyncSummary, SyncError> {
        let started = Instant::now();
        info!(
            local = ?request.local_dir,
            delete_extra = request.delete_extra,
            "Starting sync"
        );
        info!(
            threads = self.settings.threads,
            hash_chunk = %format_size(self.settings.hash_chunk_bytes as u64),
            hash_cache = request.hash_cache.is_some(),
            prune = request.prune_missing,
            "Settings"
        );

        match self.run(request).await {
            Ok(mut summary) => {
                summary.elapsed_secs = started.elapsed().as_secs_f64();
                info!(elapsed = %format!("{:.2}s", summary.elapsed_secs), "Sync completed");
                Ok(summary)
            }
            Err(e) => {
                error!(error = %e, "Sync failed");
                Err(e)
            }
        }
    }

    async fn run(&self, request: &SyncRequest) -> Result<SyncSummary, SyncError> {
        let mut summary = SyncSummary::default();

        // LoadLedger
        let meta = MetaLedger::new(
            Arc::clone(&self.store),
            &request.prefix,
            &self.settings.ledger_suffix,
        )?;
        let loaded = meta.load().await;
        summary.scanned_remote = loaded.len();
        let mut ledger = loaded.clone();

        // ScanAndDiff + Upload
        if let Some(dir) = &request.local_dir {
            self.sync_local(dir, request, &meta, &mut ledger, &mut summary)
                .await?;
        }

        // SaveLedger
        if ledger != loaded {
            info!(entries = ledger.len(), "Ledger has changes, uploading");
            meta.save(&ledger)
                .await
                .map_err(|cause| SyncError::LedgerSave {
                    key: meta.key().to_string(),
                    cause,
                })?;
            summary.ledger_saved = true;
        } else {
            info!("No changes to ledger, skipping upload");
        }
        summary.ledger_entries = ledger.len();

        // Reconcile
        if request.delete_extra {
            let reconciler = Reconciler::new(Arc::clone(&self.store), self.settings.threads);
            let report = reconciler
                .reconcile(
                    &ledger,
                    &request.prefix,
                    meta.key(),
                    &self.settings.ledger_suffix,
                )
                .await?;
            summary.deleted = report.deleted();
            summary.delete_failed = report.outcomes.len() - report.deleted();
        }

        Ok(summary)
    }

    /// Scan, diff, upload, and fold confirmed uploads into `ledger`
    async fn sync_local(
        &self,
        dir: &std::path::Path,
        request: &SyncRequest,
        meta: &MetaLedger,
        ledger: &mut Ledger,
        summary: &mut SyncSummary,
    ) -> Result<(), SyncError> {
        let local = self.scan(dir, &request.prefix, meta).await?;
        summary.scanned_local = local.len();

        let cache = self.load_cache(request.hash_cache.clone()).await?;
        cache.prune(local.values().map(|r| r.path.as_path()));

        let delta = DeltaEngine::new(
            Arc::clone(&cache),
            self.settings.threads,
            self.settings.progress_interval,
        );
        let plan = delta.compute(&local, ledger).await?;
        summary.to_upload = plan.to_upload.len();
        summary.hashed_bytes = plan.hashed_bytes;

        let uploader = Arc::new(Uploader::new(
            Arc::clone(&self.store),
            Arc::clone(&cache),
            self.settings.threads,
            self.settings.part_size,
            self.settings.manifest_suffix.clone(),
            self.settings.progress_interval,
            Arc::clone(&self.upload_progress),
        ));
        let files = plan.to_upload.into_iter().map(|p| p.record).collect();
        let report = uploader.upload(files).await?;

        // Only confirmed uploads reach the ledger; a failed file keeps its
        // previous entry and is detected again next run.
        for outcome in &report.outcomes {
            match outcome {
                FileUploadOutcome::Uploaded(f) => {
                    let entry = match &f.md5 {
                        Some(md5) => LedgerEntry::uploaded(f.size, md5, f.etag.clone()),
                        None => LedgerEntry::unverified(f.size, f.etag.clone()),
                    };
                    let entry = entry.with_extra_from(ledger.get(&f.key));
                    ledger.upsert(f.key.clone(), entry);
                    summary.uploaded += 1;
                }
                FileUploadOutcome::Failed { key, error } => {
                    summary.upload_failed += 1;
                    summary.failures.push(UploadFailure {
                        key: key.to_string(),
                        error: error.clone(),
                    });
                }
            }
        }
        summary.total_bytes = report.bytes;

        if request.prune_missing {
            let removed = ledger.prune_under(&request.prefix, |k| local.contains_key(k));
            if !removed.is_empty() {
                info!(count = removed.len(), "Pruned ledger entries for deleted local files");
            }
            summary.pruned = removed.len();
        }

        if let Some(path) = request.hash_cache.clone() {
            let cache = Arc::clone(&cache);
            let saved = tokio::task::spawn_blocking(move || cache.save(&path)).await?;
            if let Err(e) = saved {
                warn!(error = %format!("{e:#}"), "Failed to save hash cache");
            }
        }

        Ok(())
    }

    async fn scan(
        &self,
        dir: &std::path::Path,
        prefix: &KeyPrefix,
        meta: &MetaLedger,
    ) -> Result<LocalMap, SyncError> {
        let root = dir.to_path_buf();
        let prefix = prefix.clone();
        let mut local = tokio::task::spawn_blocking(move || scan_directory(&root, &prefix)).await??;

        // Never overwrite the ledger document with a local file.
        if local.remove(meta.key()).is_some() {
            warn!(key = %meta.key(), "Skipping local file that collides with the ledger key");
        }
        Ok(local)
    }

    async fn load_cache(&self, path: Option<PathBuf>) -> Result<Arc<HashCache>, SyncError> {
        let chunk = self.settings.hash_chunk_bytes;
        let cache = match path {
            Some(path) => tokio::task::spawn_blocking(move || HashCache::load(&path, chunk)).await?,
            None => HashCache::new(chunk),
        };
        Ok(Arc::new(cache))
    }
}
