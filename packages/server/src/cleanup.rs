//! Physical removal of soft-deleted submissions.
//!
//! A sweep deletes the blobs of every soft-deleted record and then the
//! record itself. A record whose blobs could not all be removed is kept, so
//! the next sweep retries it.

use std::sync::Arc;
use std::time::Duration;

use common::Submission;
use common::storage::{BlobKey, BlobStore};
use futures::StreamExt;
use futures::future::join_all;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::metadata::{MetadataStore, SubmissionQuery};
use crate::pipeline::PipelineError;

/// Counters for one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Soft-deleted records found.
    pub scanned: usize,
    /// Records whose blobs are gone and which were removed.
    pub removed: usize,
    /// Records kept for the next sweep.
    pub retained: usize,
    pub blobs_deleted: usize,
    pub blobs_already_absent: usize,
    pub blob_failures: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOutcome {
    Deleted,
    AlreadyAbsent,
    Failed,
}

#[derive(Debug, Default)]
struct SubmissionOutcome {
    removed: bool,
    deleted: usize,
    absent: usize,
    failed: usize,
}

/// The cleanup reconciler.
#[derive(Clone)]
pub struct Reconciler {
    blobs: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    concurrency: usize,
}

impl Reconciler {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
        concurrency: usize,
    ) -> Self {
        Self {
            blobs,
            metadata,
            concurrency: concurrency.max(1),
        }
    }

    /// Run one reconciliation pass.
    ///
    /// Only the initial query can fail the sweep; per-submission problems are
    /// logged and counted.
    #[instrument(skip_all)]
    pub async fn sweep(&self) -> Result<SweepReport, PipelineError> {
        let deleted = self.metadata.query(&SubmissionQuery::deleted()).await?;

        let mut report = SweepReport {
            scanned: deleted.len(),
            ..Default::default()
        };

        let outcomes: Vec<SubmissionOutcome> = futures::stream::iter(deleted)
            .map(|submission| self.reconcile(submission))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            if outcome.removed {
                report.removed += 1;
            } else {
                report.retained += 1;
            }
            report.blobs_deleted += outcome.deleted;
            report.blobs_already_absent += outcome.absent;
            report.blob_failures += outcome.failed;
        }

        info!(
            scanned = report.scanned,
            removed = report.removed,
            retained = report.retained,
            blobs_deleted = report.blobs_deleted,
            blobs_already_absent = report.blobs_already_absent,
            blob_failures = report.blob_failures,
            "Cleanup sweep finished"
        );
        Ok(report)
    }

    async fn reconcile(&self, submission: Submission) -> SubmissionOutcome {
        let keys: Vec<BlobKey> = submission
            .files
            .iter()
            .filter_map(|file| match file.key() {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!(
                        submission_id = %submission.id,
                        path = %file.path,
                        error = %e,
                        "Skipping unresolvable file path"
                    );
                    None
                }
            })
            .collect();

        let mut outcome = SubmissionOutcome::default();
        if !keys.is_empty() {
            let results = join_all(keys.iter().map(|key| self.delete_blob(&submission, key))).await;
            for result in results {
                match result {
                    FileOutcome::Deleted => outcome.deleted += 1,
                    FileOutcome::AlreadyAbsent => outcome.absent += 1,
                    FileOutcome::Failed => outcome.failed += 1,
                }
            }
        }

        if outcome.failed > 0 {
            debug!(
                submission_id = %submission.id,
                failed = outcome.failed,
                "Keeping record for retry"
            );
            return outcome;
        }

        match self.metadata.remove(submission.id).await {
            Ok(_) => outcome.removed = true,
            Err(e) => warn!(
                submission_id = %submission.id,
                error = %e,
                "Failed to remove submission record"
            ),
        }
        outcome
    }

    async fn delete_blob(&self, submission: &Submission, key: &BlobKey) -> FileOutcome {
        let result = match self.blobs.exists(key).await {
            Ok(true) => self.blobs.delete(key).await.map(|removed| {
                if removed {
                    FileOutcome::Deleted
                } else {
                    FileOutcome::AlreadyAbsent
                }
            }),
            Ok(false) => Ok(FileOutcome::AlreadyAbsent),
            Err(e) => Err(e),
        };

        result.unwrap_or_else(|e| {
            warn!(
                submission_id = %submission.id,
                path = %key,
                error = %e,
                "Failed to delete blob"
            );
            FileOutcome::Failed
        })
    }
}

/// Run the reconciler on a fixed interval until `shutdown` fires.
///
/// The first sweep starts immediately. Sweeps never overlap.
pub async fn run_cleanup_scheduler(
    reconciler: Reconciler,
    interval: Duration,
    shutdown: CancellationToken,
) {
    info!(interval_secs = interval.as_secs(), "Starting cleanup scheduler");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if let Err(e) = reconciler.sweep().await {
            error!(error = %e, "Cleanup sweep failed");
        }
    }

    info!("Cleanup scheduler stopped");
}
