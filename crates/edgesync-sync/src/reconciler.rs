//! Consistency-gated deletion of untracked remote objects
//!
//! Deleting "everything not in the ledger" is only safe when the ledger
//! really describes the store. Before any delete, every ledger entry must be
//! present in the live listing with exactly the recorded size. A single
//! discrepancy aborts the phase with zero deletions.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use edgesync_core::{
    domain::{
        ledger::Ledger,
        newtypes::{KeyPrefix, ObjectKey},
        records::RemoteObject,
    },
    ports::object_store::IObjectStore,
};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument};

use crate::listing::list_all_objects;
use crate::SyncError;

/// Discrepancies logged individually before summarizing the rest
const REPORT_SAMPLE: usize = 5;

/// A ledger entry whose remote size differs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SizeMismatch {
    pub key: ObjectKey,
    pub ledger_size: u64,
    pub remote_size: u64,
}

/// Every disagreement between the ledger and the live listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    /// Ledger keys absent from the store
    pub missing: Vec<ObjectKey>,
    /// Ledger keys present with another size
    pub size_mismatch: Vec<SizeMismatch>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.missing.is_empty() && self.size_mismatch.is_empty()
    }

    /// Log the first few discrepancies of each kind and summarize the rest
    fn log(&self) {
        if !self.missing.is_empty() {
            error!(count = self.missing.len(), "Ledger entries missing from store");
            for key in self.missing.iter().take(REPORT_SAMPLE) {
                error!(%key, "Missing");
            }
            if self.missing.len() > REPORT_SAMPLE {
                error!("... and {} more", self.missing.len() - REPORT_SAMPLE);
            }
        }

        if !self.size_mismatch.is_empty() {
            error!(count = self.size_mismatch.len(), "Ledger entries with size mismatch");
            for m in self.size_mismatch.iter().take(REPORT_SAMPLE) {
                error!(key = %m.key, ledger = m.ledger_size, actual = m.remote_size, "Size mismatch");
            }
            if self.size_mismatch.len() > REPORT_SAMPLE {
                error!("... and {} more", self.size_mismatch.len() - REPORT_SAMPLE);
            }
        }
    }
}

impl fmt::Display for ConsistencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Remote files don't match ledger: {} missing, {} size mismatch",
            self.missing.len(),
            self.size_mismatch.len()
        )?;
        for key in &self.missing {
            write!(f, "\n  missing: {key}")?;
        }
        for m in &self.size_mismatch {
            write!(
                f,
                "\n  size mismatch: {} (ledger: {}, actual: {})",
                m.key, m.ledger_size, m.remote_size
            )?;
        }
        Ok(())
    }
}

/// Compare every ledger entry with the live listing
pub fn check_consistency(
    ledger: &Ledger,
    remote: &BTreeMap<ObjectKey, RemoteObject>,
) -> ConsistencyReport {
    let mut report = ConsistencyReport::default();
    for (key, entry) in ledger {
        match remote.get(key) {
            None => report.missing.push(key.clone()),
            Some(obj) if obj.size != entry.size => report.size_mismatch.push(SizeMismatch {
                key: key.clone(),
                ledger_size: entry.size,
                remote_size: obj.size,
            }),
            Some(_) => {}
        }
    }
    report
}

/// Remote keys that are neither tracked by the ledger nor ledger documents
pub fn extra_keys(
    ledger: &Ledger,
    remote: &BTreeMap<ObjectKey, RemoteObject>,
    ledger_key: &ObjectKey,
    ledger_suffix: &str,
) -> Vec<ObjectKey> {
    remote
        .keys()
        .filter(|k| !ledger.contains(k))
        .filter(|k| *k != ledger_key && !k.has_suffix(ledger_suffix))
        .cloned()
        .collect()
}

/// Per-key delete result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted(ObjectKey),
    Failed { key: ObjectKey, error: String },
}

/// Result of a reconciliation pass
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Objects in the live listing
    pub listed: usize,
    pub outcomes: Vec<DeleteOutcome>,
}

impl ReconcileReport {
    pub fn deleted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, DeleteOutcome::Deleted(_)))
            .count()
    }

    pub fn deleted_keys(&self) -> Vec<&ObjectKey> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                DeleteOutcome::Deleted(k) => Some(k),
                DeleteOutcome::Failed { .. } => None,
            })
            .collect()
    }
}

/// Deletes remote objects under a prefix that the ledger does not track
pub struct Reconciler {
    store: Arc<dyn IObjectStore>,
    threads: usize,
}

impl Reconciler {
    pub fn new(store: Arc<dyn IObjectStore>, threads: usize) -> Self {
        Self {
            store,
            threads: threads.max(1),
        }
    }

    /// List, verify, then delete extras
    ///
    /// # Errors
    /// - [`SyncError::Listing`] if the store cannot be listed
    /// - [`SyncError::Consistency`] if the ledger disagrees with the store;
    ///   no object is deleted in that case
    #[instrument(skip(self, ledger), fields(prefix = %prefix, entries = ledger.len()))]
    pub async fn reconcile(
        &self,
        ledger: &Ledger,
        prefix: &KeyPrefix,
        ledger_key: &ObjectKey,
        ledger_suffix: &str,
    ) -> Result<ReconcileReport, SyncError> {
        info!("Comparing ledger with remote objects");

        let remote = list_all_objects(self.store.as_ref(), prefix.as_dir())
            .await
            .map_err(|e| {
                error!(error = %e, "Abort delete: failed to list remote objects");
                e
            })?;

        let report = check_consistency(ledger, &remote);
        if !report.is_consistent() {
            report.log();
            return Err(SyncError::Consistency(report));
        }

        let extra = extra_keys(ledger, &remote, ledger_key, ledger_suffix);
        let mut result = ReconcileReport {
            listed: remote.len(),
            outcomes: Vec::new(),
        };
        if extra.is_empty() {
            info!("No extra objects found");
            return Ok(result);
        }

        info!(count = extra.len(), "Found extra objects to delete");
        result.outcomes = self.delete_all(extra).await?;
        info!(deleted = result.deleted(), "Deleted extra objects");
        Ok(result)
    }

    async fn delete_all(&self, keys: Vec<ObjectKey>) -> Result<Vec<DeleteOutcome>, SyncError> {
        let semaphore = Arc::new(Semaphore::new(self.threads));
        let mut workers = JoinSet::new();

        for key in keys {
            let permit = semaphore.clone().acquire_owned().await?;
            let store = Arc::clone(&self.store);
            workers.spawn(async move {
                let _permit = permit;
                match store.delete_object(&key).await {
                    Ok(()) => {
                        debug!(%key, "Deleted");
                        DeleteOutcome::Deleted(key)
                    }
                    Err(e) => {
                        let error = format!("{e:#}");
                        error!(%key, %error, "Failed to delete");
                        DeleteOutcome::Failed { key, error }
                    }
                }
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = workers.join_next().await {
            outcomes.push(joined?);
        }
        outcomes.sort_by(|a, b| outcome_key(a).cmp(outcome_key(b)));
        Ok(outcomes)
    }
}

fn outcome_key(outcome: &DeleteOutcome) -> &ObjectKey {
    match outcome {
        DeleteOutcome::Deleted(k) => k,
        DeleteOutcome::Failed { key, .. } => key,
    }
}
