use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::PipelineError;
use crate::metadata::{MetadataStore, MetadataTxn};

/// Marks submissions deleted, all or nothing.
#[derive(Clone)]
pub struct SoftDelete {
    metadata: Arc<dyn MetadataStore>,
}

impl SoftDelete {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self { metadata }
    }

    /// Set `deleted_at` on every id in one transaction.
    ///
    /// If any id is unknown nothing is changed and `NotFound` is returned.
    /// Records that are already deleted keep their original timestamp.
    #[instrument(skip_all, fields(count = ids.len()))]
    pub async fn soft_delete(&self, ids: &[Uuid]) -> Result<(), PipelineError> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids: BTreeSet<Uuid> = ids.iter().copied().collect();

        let mut txn = self.metadata.begin().await?;
        for &id in &ids {
            let found = txn.get_for_update(id).await;
            match found {
                Ok(Some(_)) => {}
                Ok(None) => return Err(abort(txn, PipelineError::NotFound(id)).await),
                Err(e) => return Err(abort(txn, e.into()).await),
            }
        }

        let now = Utc::now();
        for &id in &ids {
            if let Err(e) = txn.mark_deleted(id, now).await {
                return Err(abort(txn, e.into()).await);
            }
        }
        txn.commit().await?;

        info!(count = ids.len(), "Submissions soft-deleted");
        Ok(())
    }
}

/// Roll back `txn` and return `cause`. A failed rollback is logged; the
/// backend discards the uncommitted work when the connection drops.
async fn abort(txn: Box<dyn MetadataTxn>, cause: PipelineError) -> PipelineError {
    if let Err(e) = txn.rollback().await {
        warn!(error = %e, cause = %cause, "Soft-delete rollback failed");
    }
    cause
}
