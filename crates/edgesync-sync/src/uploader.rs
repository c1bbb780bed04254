//! Two-phase concurrent uploads
//!
//! Files are split into content files and manifest files (keys ending in
//! the manifest suffix, `.version` by default). Every content file finishes
//! before the first manifest starts, since readers follow manifests to
//! content that must already exist.
//!
//! Within a phase a bounded pool uploads in parallel. One failed file does
//! not stop its siblings; it is reported as [`FileUploadOutcome::Failed`]
//! and contributes no bytes.

use std::sync::Arc;

use edgesync_core::{
    domain::{newtypes::ObjectKey, newtypes::ContentHash, records::LocalFileRecord},
    ports::object_store::{IObjectStore, PutBody, PutOptions},
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::hash_cache::HashCache;
use crate::progress::{format_size, ProgressSink, ProgressTracker};
use crate::SyncError;

/// A file the store confirmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub key: ObjectKey,
    /// Size at hash time
    pub size: u64,
    /// Content hash; `None` when the file could not be hashed
    pub md5: Option<ContentHash>,
    /// Etag reported by the store, if any
    pub etag: Option<String>,
}

/// Per-file result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileUploadOutcome {
    Uploaded(UploadedFile),
    Failed { key: ObjectKey, error: String },
}

impl FileUploadOutcome {
    pub fn key(&self) -> &ObjectKey {
        match self {
            Self::Uploaded(f) => &f.key,
            Self::Failed { key, .. } => key,
        }
    }
}

/// Aggregate result of an upload run
#[derive(Debug, Clone, Default)]
pub struct UploadReport {
    pub outcomes: Vec<FileUploadOutcome>,
    /// Bytes of confirmed uploads
    pub bytes: u64,
}

impl UploadReport {
    /// Files attempted
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn uploaded(&self) -> impl Iterator<Item = &UploadedFile> {
        self.outcomes.iter().filter_map(|o| match o {
            FileUploadOutcome::Uploaded(f) => Some(f),
            FileUploadOutcome::Failed { .. } => None,
        })
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, FileUploadOutcome::Failed { .. }))
            .count()
    }
}

/// Split files into (content, manifests), preserving order
pub fn partition_manifests(
    files: Vec<LocalFileRecord>,
    manifest_suffix: &str,
) -> (Vec<LocalFileRecord>, Vec<LocalFileRecord>) {
    files
        .into_iter()
        .partition(|f| !f.key.has_suffix(manifest_suffix))
}

/// Uploads files through an [`IObjectStore`]
pub struct Uploader {
    store: Arc<dyn IObjectStore>,
    cache: Arc<HashCache>,
    threads: usize,
    part_size: u64,
    manifest_suffix: String,
    progress: ProgressTracker,
}

impl Uploader {
    pub fn new(
        store: Arc<dyn IObjectStore>,
        cache: Arc<HashCache>,
        threads: usize,
        part_size: u64,
        manifest_suffix: impl Into<String>,
        progress_interval: std::time::Duration,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            store,
            cache,
            threads: threads.max(1),
            part_size,
            manifest_suffix: manifest_suffix.into(),
            progress: ProgressTracker::new("Upload", progress_interval, sink),
        }
    }

    /// Upload all files, content first and manifests last
    #[instrument(skip_all, fields(files = files.len(), threads = self.threads))]
    pub async fn upload(self: &Arc<Self>, files: Vec<LocalFileRecord>) -> Result<UploadReport, SyncError> {
        let mut report = UploadReport::default();
        if files.is_empty() {
            info!("No files to upload");
            return Ok(report);
        }

        let total: u64 = files.iter().map(|f| f.size).sum();
        info!(total = %format_size(total), "Uploading {} files", files.len());

        let (content, manifests) = partition_manifests(files, &self.manifest_suffix);

        for (label, batch) in [("content", content), ("manifest", manifests)] {
            if batch.is_empty() {
                continue;
            }
            info!(batch = label, files = batch.len(), threads = self.threads, "Starting upload batch");
            let (outcomes, bytes) = self.upload_batch(batch).await?;
            report.outcomes.extend(outcomes);
            report.bytes += bytes;
        }

        info!(
            uploaded = report.attempted() - report.failed_count(),
            failed = report.failed_count(),
            bytes = %format_size(report.bytes),
            "Upload complete"
        );
        Ok(report)
    }

    /// Upload one phase and wait for every file in it
    async fn upload_batch(
        self: &Arc<Self>,
        batch: Vec<LocalFileRecord>,
    ) -> Result<(Vec<FileUploadOutcome>, u64), SyncError> {
        let batch_bytes: u64 = batch.iter().map(|f| f.size).sum();
        self.progress.reset(batch.len() as u64, batch_bytes);

        let semaphore = Arc::new(Semaphore::new(self.threads));
        let mut workers = JoinSet::new();

        for record in batch {
            let permit = semaphore.clone().acquire_owned().await?;
            let this = Arc::clone(self);
            workers.spawn(async move {
                let _permit = permit;
                this.upload_one(record).await
            });
        }

        let mut outcomes = Vec::new();
        let mut bytes = 0;
        while let Some(joined) = workers.join_next().await {
            let outcome = joined?;
            if let FileUploadOutcome::Uploaded(f) = &outcome {
                bytes += f.size;
            }
            outcomes.push(outcome);
        }
        self.progress.finish();

        outcomes.sort_by(|a, b| a.key().cmp(b.key()));
        Ok((outcomes, bytes))
    }

    async fn upload_one(&self, record: LocalFileRecord) -> FileUploadOutcome {
        let key = record.key.clone();
        match self.transfer(record).await {
            Ok(file) => {
                debug!(key = %file.key, size = file.size, "Uploaded");
                self.progress.advance(1, file.size);
                FileUploadOutcome::Uploaded(file)
            }
            Err(e) => {
                let error = format!("{e:#}");
                error!(%key, %error, "Failed to upload");
                self.progress.advance(1, 0);
                FileUploadOutcome::Failed { key, error }
            }
        }
    }

    /// Hash (usually a cache hit from the diff) and put one file
    ///
    /// A file that cannot be hashed is still sent, without `md5` metadata,
    /// so a diff that failed open to "upload" is honored.
    async fn transfer(&self, record: LocalFileRecord) -> anyhow::Result<UploadedFile> {
        let cache = Arc::clone(&self.cache);
        let path = record.path.clone();
        let digest = tokio::task::spawn_blocking(move || cache.get_or_compute(&path)).await?;

        let (size, md5) = match digest {
            Ok(digest) => (digest.size, Some(digest.md5)),
            Err(e) => {
                warn!(key = %record.key, error = %e, "Hash unavailable, uploading without md5");
                (tokio::fs::metadata(&record.path).await?.len(), None)
            }
        };

        let receipt = self
            .store
            .put_object(
                &record.key,
                PutBody::File(record.path),
                &put_options(self.part_size, md5.as_ref()),
            )
            .await?;

        Ok(UploadedFile {
            key: record.key,
            size,
            md5,
            etag: receipt.etag,
        })
    }
}

fn put_options(part_size: u64, md5: Option<&ContentHash>) -> PutOptions {
    let options = PutOptions::new(part_size);
    match md5 {
        Some(md5) => options.with_metadata("md5", md5.as_str()),
        None => options,
    }
}
