//! Sync command - Upload a local directory to a remote prefix
//!
//! Provides the `edgesync sync` CLI command which:
//! 1. Applies command-line overrides on top of the loaded configuration
//! 2. Creates the object store adapter
//! 3. Runs the Synchronizer and displays the summary
//!
//! Without `--local` only the ledger is loaded and, with `--delete`, the
//! remote prefix is reconciled against it.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use edgesync_core::domain::newtypes::KeyPrefix;
use edgesync_sync::progress::{format_size, InlineProgress};
use edgesync_sync::{SyncRequest, SyncSettings, SyncSummary, Synchronizer};
use tracing::info;

use super::{ensure_valid, Context};
use crate::output::{plural, OutputFormatter};

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Remote prefix to sync into (empty for the bucket root)
    #[arg(long)]
    pub prefix: String,

    /// Local directory to upload
    #[arg(long)]
    pub local: Option<PathBuf>,

    /// Delete remote objects under the prefix that the ledger does not track
    #[arg(long)]
    pub delete: bool,

    /// Drop ledger entries whose local file no longer exists
    #[arg(long)]
    pub prune: bool,

    /// Number of concurrent workers
    #[arg(long)]
    pub threads: Option<usize>,

    /// Hash read size in MB
    #[arg(long)]
    pub hash_chunk: Option<u64>,

    /// Multipart threshold in MB
    #[arg(long)]
    pub part_size: Option<u64>,

    /// Hash cache file
    #[arg(long)]
    pub md5_cache: Option<PathBuf>,
}

impl SyncCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let formatter = ctx.formatter();

        let mut config = ctx.config.clone();
        if let Some(threads) = self.threads {
            config.sync.threads = threads;
        }
        if let Some(mb) = self.hash_chunk {
            config.sync.hash_chunk_mb = mb;
        }
        if let Some(mb) = self.part_size {
            config.sync.part_size_mb = mb;
        }
        ensure_valid(&config)?;

        let store = ctx.object_store()?;
        let mut synchronizer = Synchronizer::new(store, SyncSettings::from(&config.sync));
        if !ctx.format.is_json() && !ctx.quiet {
            synchronizer = synchronizer.with_upload_progress(Arc::new(InlineProgress::stderr()));
        }

        let request = SyncRequest::new(KeyPrefix::new(&self.prefix))
            .with_delete(self.delete)
            .with_prune(self.prune || config.sync.prune_missing)
            .with_hash_cache(self.md5_cache.clone().or_else(|| config.sync.hash_cache.clone()));
        let request = match &self.local {
            Some(dir) => request.with_local_dir(dir),
            None => request,
        };

        info!(prefix = %request.prefix, "Starting sync command");
        let summary = synchronizer.sync(&request).await?;

        if ctx.format.is_json() {
            formatter.print_json(&serde_json::to_value(&summary)?);
        } else {
            print_summary(formatter.as_ref(), &summary);
        }

        if summary.upload_failed > 0 {
            anyhow::bail!("{} failed to upload", plural(summary.upload_failed, "file"));
        }
        Ok(())
    }
}

fn print_summary(formatter: &dyn OutputFormatter, summary: &SyncSummary) {
    if summary.uploaded == 0 && summary.deleted == 0 && summary.upload_failed == 0 {
        formatter.success(&format!(
            "Already up to date ({:.2}s)",
            summary.elapsed_secs
        ));
    } else {
        formatter.success(&format!("Sync completed in {:.2}s", summary.elapsed_secs));
    }

    formatter.info(&format!("Local files:    {}", summary.scanned_local));
    formatter.info(&format!("Ledger entries: {}", summary.ledger_entries));
    formatter.info(&format!(
        "Uploaded:       {} of {} ({})",
        summary.uploaded,
        summary.to_upload,
        format_size(summary.total_bytes)
    ));
    if summary.pruned > 0 {
        formatter.info(&format!("Pruned:         {}", summary.pruned));
    }
    if summary.deleted > 0 || summary.delete_failed > 0 {
        formatter.info(&format!("Deleted:        {}", plural(summary.deleted, "object")));
    }
    if summary.delete_failed > 0 {
        formatter.warn(&format!(
            "{} could not be deleted",
            plural(summary.delete_failed, "object")
        ));
    }
    if !summary.ledger_saved {
        formatter.info("Ledger unchanged");
    }

    for failure in &summary.failures {
        formatter.error(&format!("{}: {}", failure.key, failure.error));
    }
}
