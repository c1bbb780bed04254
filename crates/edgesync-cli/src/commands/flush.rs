//! Flush command - Purge CDN cache for a URL or prefix
//!
//! A target ending in `/` purges every cached URL under it; anything else
//! purges that single URL.

use anyhow::{Context as _, Result};
use clap::Args;
use edgesync_cloud::{Credentials, EdgeOnePurger};
use edgesync_core::ports::cdn::{ICdnPurger, PurgeKind};
use tracing::info;

use super::Context;

#[derive(Debug, Args)]
pub struct FlushCommand {
    /// EdgeOne zone id (defaults to cdn.zone_id from the config)
    #[arg(long)]
    pub zone_id: Option<String>,

    /// URL or prefix to purge, e.g. https://example.com/ or https://example.com/path/
    #[arg(long)]
    pub target: String,
}

impl FlushCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let formatter = ctx.formatter();

        let zone_id = self
            .zone_id
            .clone()
            .or_else(|| ctx.config.cdn.zone_id.clone())
            .filter(|z| !z.is_empty())
            .context("--zone-id is required for flush (or set cdn.zone_id)")?;
        if self.target.is_empty() {
            anyhow::bail!("--target must not be empty");
        }

        let credentials = Credentials::from_store(&ctx.config.store)?;
        let purger = EdgeOnePurger::new(&ctx.config.cdn, credentials)?;
        let kind = PurgeKind::for_target(&self.target);

        info!(target = %self.target, ?kind, "Purging CDN cache");
        let receipt = purger.purge(&self.target, &zone_id).await?;

        if ctx.format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "target": self.target,
                "kind": kind,
                "zone_id": zone_id,
                "job_id": receipt.job_id,
                "request_id": receipt.request_id,
            }));
        } else {
            formatter.success(&format!("Cache purge submitted for {}", self.target));
            if let Some(job) = &receipt.job_id {
                formatter.info(&format!("Job: {job}"));
            }
        }
        Ok(())
    }
}
