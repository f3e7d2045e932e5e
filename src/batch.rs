//! Batch Harvesting
//!
//! Processes identities strictly one at a time with a fixed delay
//! between items. Per-identity failures are logged and counted; the run
//! always reaches the end of the list.

use std::path::Path;
use std::time::Duration;

use serde::Serialize;

use crate::error::Result;
use crate::source::ProfileSource;
use crate::store::ProfileStore;

/// Outcome counts for one batch run
#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub total: usize,
    /// Harvested and snapshotted
    pub succeeded: usize,
    /// Harvested, but a snapshot already existed today
    pub skipped: usize,
    pub failed: usize,
    pub failed_identities: Vec<String>,
}

impl BatchReport {
    /// Percentage of identities that produced a new snapshot
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.succeeded as f64 / self.total as f64 * 100.0
    }
}

/// Read identities from a batch file, one per line, blank lines ignored
pub fn load_identities(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)?;

    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

async fn harvest_one(
    source: &mut dyn ProfileSource,
    store: &dyn ProfileStore,
    identity: &str,
) -> Result<bool> {
    let record = source.get_profile_data(identity).await?;
    store.upsert_profile(identity, &record).await?;
    store.insert_snapshot(identity, &record).await
}

/// Harvest every identity in order against an already-started source
pub async fn run_batch(
    source: &mut dyn ProfileSource,
    store: &dyn ProfileStore,
    identities: &[String],
    delay: Duration,
) -> BatchReport {
    let mut report = BatchReport {
        total: identities.len(),
        ..Default::default()
    };

    for (i, identity) in identities.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(delay).await;
        }

        tracing::info!("[{}/{}] Harvesting {}", i + 1, identities.len(), identity);

        match harvest_one(source, store, identity).await {
            Ok(true) => {
                tracing::info!("Snapshot stored for {}", identity);
                report.succeeded += 1;
            }
            Ok(false) => {
                tracing::info!("Snapshot for {} already taken today", identity);
                report.skipped += 1;
            }
            Err(e) => {
                tracing::warn!("Failed to harvest {}: {}", identity, e);
                report.failed += 1;
                report.failed_identities.push(identity.clone());
            }
        }
    }

    tracing::info!(
        "Batch done: {}/{} snapshotted, {} skipped, {} failed",
        report.succeeded,
        report.total,
        report.skipped,
        report.failed
    );

    report
}
