use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{NewSubmission, Submission};
use tokio::sync::{Mutex, OwnedMutexGuard, watch};
use uuid::Uuid;

use super::{ChangeFeed, MetadataError, MetadataStore, MetadataTxn, SubmissionQuery};

type Records = BTreeMap<Uuid, Submission>;

/// In-process metadata store.
///
/// Transactions hold the store lock from `begin` until commit or rollback,
/// which serializes them against each other and against plain writes.
#[derive(Clone)]
pub struct MemoryMetadataStore {
    records: Arc<Mutex<Records>>,
    changes: ChangeFeed,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(BTreeMap::new())),
            changes: ChangeFeed::new(),
        }
    }

    /// Insert a record verbatim, keeping its id and timestamps.
    pub async fn insert_raw(&self, submission: Submission) {
        self.records
            .lock()
            .await
            .insert(submission.id, submission);
        self.changes.notify();
    }

    /// Number of stored records, live or deleted.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

impl Default for MemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn create(&self, new: NewSubmission) -> Result<Submission, MetadataError> {
        let submission = Submission {
            id: Uuid::now_v7(),
            uid: new.uid,
            tags: new.tags,
            files: new.files,
            created_at: new.created_at,
            deleted_at: None,
        };
        self.records
            .lock()
            .await
            .insert(submission.id, submission.clone());
        self.changes.notify();
        Ok(submission)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Submission>, MetadataError> {
        Ok(self.records.lock().await.get(&id).cloned())
    }

    async fn query(&self, query: &SubmissionQuery) -> Result<Vec<Submission>, MetadataError> {
        let matching = self
            .records
            .lock()
            .await
            .values()
            .filter(|s| query.matches(s))
            .cloned()
            .collect();
        Ok(query.arrange(matching))
    }

    async fn begin(&self) -> Result<Box<dyn MetadataTxn>, MetadataError> {
        let guard = Arc::clone(&self.records).lock_owned().await;
        Ok(Box::new(MemoryTxn {
            guard,
            staged: BTreeMap::new(),
            changes: self.changes.clone(),
        }))
    }

    async fn remove(&self, id: Uuid) -> Result<bool, MetadataError> {
        let removed = self.records.lock().await.remove(&id).is_some();
        if removed {
            self.changes.notify();
        }
        Ok(removed)
    }

    fn changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}

struct MemoryTxn {
    guard: OwnedMutexGuard<Records>,
    /// Copy-on-write changes, applied on commit.
    staged: Records,
    changes: ChangeFeed,
}

impl MemoryTxn {
    fn current(&self, id: &Uuid) -> Option<&Submission> {
        self.staged.get(id).or_else(|| self.guard.get(id))
    }
}

#[async_trait]
impl MetadataTxn for MemoryTxn {
    async fn get_for_update(&mut self, id: Uuid) -> Result<Option<Submission>, MetadataError> {
        Ok(self.current(&id).cloned())
    }

    async fn mark_deleted(&mut self, id: Uuid, at: DateTime<Utc>) -> Result<(), MetadataError> {
        let mut record = self
            .current(&id)
            .cloned()
            .ok_or(MetadataError::MissingRecord(id))?;
        if record.deleted_at.is_none() {
            record.deleted_at = Some(at);
            self.staged.insert(id, record);
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), MetadataError> {
        let MemoryTxn {
            mut guard,
            staged,
            changes,
        } = *self;
        let dirty = !staged.is_empty();
        guard.extend(staged);
        drop(guard);
        if dirty {
            changes.notify();
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), MetadataError> {
        Ok(())
    }
}
