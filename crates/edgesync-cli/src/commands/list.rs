//! List command - Show folders directly under a remote prefix

use anyhow::Result;
use clap::Args;
use edgesync_core::domain::newtypes::KeyPrefix;
use edgesync_sync::listing::list_folders;
use tracing::info;

use super::Context;
use crate::output::plural;

#[derive(Debug, Args)]
pub struct ListCommand {
    /// Remote prefix to list (empty for the bucket root)
    #[arg(long)]
    pub prefix: String,
}

impl ListCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let formatter = ctx.formatter();
        let prefix = KeyPrefix::new(&self.prefix);
        let store = ctx.object_store()?;

        info!(%prefix, "Listing folders");
        let folders = list_folders(store.as_ref(), &prefix).await?;

        if ctx.format.is_json() {
            formatter.print_json(&serde_json::json!({
                "prefix": prefix.as_str(),
                "folders": folders,
            }));
        } else {
            formatter.success(&format!(
                "{} under {}",
                plural(folders.len(), "folder"),
                prefix
            ));
            for folder in &folders {
                formatter.info(folder);
            }
        }
        Ok(())
    }
}
