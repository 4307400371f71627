//! Metadata store client: submission records, transactions and live queries.

mod memory;
mod sql;
mod subscription;

use std::cmp::Reverse;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{NewSubmission, Submission};
use sea_orm::DbErr;
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

pub use memory::MemoryMetadataStore;
pub use sql::SqlMetadataStore;
pub use subscription::{Subscription, SubscriptionHandle};

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Database error: {0}")]
    Db(#[from] DbErr),

    #[error("Failed to encode submission files: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Submission {0} does not exist")]
    MissingRecord(Uuid),

    #[error("Submission {id} is corrupt: {reason}")]
    Corrupt { id: Uuid, reason: String },
}

/// Which records a query selects by deletion state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionFilter {
    /// `deleted_at IS NULL`
    Live,
    /// `deleted_at IS NOT NULL`
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatedOrder {
    NewestFirst,
    OldestFirst,
}

/// Filter and ordering for [`MetadataStore::query`] and subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionQuery {
    pub deletion: DeletionFilter,
    pub uid: Option<String>,
    pub order: CreatedOrder,
    pub limit: Option<u64>,
}

impl SubmissionQuery {
    /// Live submissions, newest first. Backs the submission list.
    pub fn live() -> Self {
        Self {
            deletion: DeletionFilter::Live,
            uid: None,
            order: CreatedOrder::NewestFirst,
            limit: None,
        }
    }

    /// Soft-deleted submissions awaiting reconciliation, oldest first.
    pub fn deleted() -> Self {
        Self {
            deletion: DeletionFilter::Deleted,
            uid: None,
            order: CreatedOrder::OldestFirst,
            limit: None,
        }
    }

    pub fn for_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a record passes the filter part of the query.
    pub fn matches(&self, submission: &Submission) -> bool {
        let deletion_ok = match self.deletion {
            DeletionFilter::Live => submission.deleted_at.is_none(),
            DeletionFilter::Deleted => submission.deleted_at.is_some(),
        };
        deletion_ok
            && self
                .uid
                .as_deref()
                .is_none_or(|uid| submission.uid == uid)
    }

    /// Apply ordering and limit to an already filtered result set.
    pub fn arrange(&self, mut submissions: Vec<Submission>) -> Vec<Submission> {
        match self.order {
            CreatedOrder::NewestFirst => {
                submissions.sort_by_key(|s| (Reverse(s.created_at), Reverse(s.id)))
            }
            CreatedOrder::OldestFirst => submissions.sort_by_key(|s| (s.created_at, s.id)),
        }
        if let Some(limit) = self.limit {
            submissions.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        submissions
    }
}

/// A document store holding submission records.
///
/// Implementations bump the [`changes`](MetadataStore::changes) counter after
/// every committed mutation so that subscriptions can re-query.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Store a new record and return it with its assigned id.
    async fn create(&self, new: NewSubmission) -> Result<Submission, MetadataError>;

    /// Point read by id, regardless of deletion state.
    async fn get(&self, id: Uuid) -> Result<Option<Submission>, MetadataError>;

    /// Filtered, ordered snapshot.
    async fn query(&self, query: &SubmissionQuery) -> Result<Vec<Submission>, MetadataError>;

    /// Start an atomic unit of work. Dropping the transaction without
    /// committing rolls it back.
    async fn begin(&self) -> Result<Box<dyn MetadataTxn>, MetadataError>;

    /// Remove a record. Returns `false` if it was already gone.
    async fn remove(&self, id: Uuid) -> Result<bool, MetadataError>;

    /// Monotonic change counter.
    fn changes(&self) -> watch::Receiver<u64>;
}

/// An open metadata transaction. Reads take row locks where the backend
/// supports them, so concurrent transactions over the same ids serialize.
#[async_trait]
pub trait MetadataTxn: Send {
    async fn get_for_update(&mut self, id: Uuid) -> Result<Option<Submission>, MetadataError>;

    /// Set `deleted_at` unless it is already set.
    async fn mark_deleted(&mut self, id: Uuid, at: DateTime<Utc>) -> Result<(), MetadataError>;

    async fn commit(self: Box<Self>) -> Result<(), MetadataError>;

    async fn rollback(self: Box<Self>) -> Result<(), MetadataError>;
}

/// Shared change counter used by store implementations.
#[derive(Debug, Clone)]
pub(crate) struct ChangeFeed(std::sync::Arc<watch::Sender<u64>>);

impl ChangeFeed {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self(std::sync::Arc::new(tx))
    }

    pub(crate) fn notify(&self) {
        self.0.send_modify(|version| *version += 1);
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<u64> {
        self.0.subscribe()
    }
}
