use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{NewSubmission, Submission, SubmissionFile};
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use tokio::sync::watch;
use tracing::warn;
use uuid::Uuid;

use super::{
    ChangeFeed, CreatedOrder, DeletionFilter, MetadataError, MetadataStore, MetadataTxn,
    SubmissionQuery,
};
use crate::entity::submission;

/// Metadata store backed by the `submission` table.
///
/// Change notifications cover writes made through this instance only.
#[derive(Clone)]
pub struct SqlMetadataStore {
    db: DatabaseConnection,
    changes: ChangeFeed,
}

impl SqlMetadataStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            changes: ChangeFeed::new(),
        }
    }
}

fn to_submission(model: submission::Model) -> Result<Submission, MetadataError> {
    let files: Vec<SubmissionFile> =
        serde_json::from_value(model.files).map_err(|e| MetadataError::Corrupt {
            id: model.id,
            reason: e.to_string(),
        })?;

    Ok(Submission {
        id: model.id,
        uid: model.uid,
        tags: model.tags,
        files,
        created_at: model.created_at,
        deleted_at: model.deleted_at,
    })
}

#[async_trait]
impl MetadataStore for SqlMetadataStore {
    async fn create(&self, new: NewSubmission) -> Result<Submission, MetadataError> {
        let id = Uuid::now_v7();
        let model = submission::ActiveModel {
            id: Set(id),
            uid: Set(new.uid.clone()),
            tags: Set(new.tags.clone()),
            files: Set(serde_json::to_value(&new.files)?),
            created_at: Set(new.created_at),
            deleted_at: Set(None),
        };

        submission::Entity::insert(model)
            .exec_without_returning(&self.db)
            .await?;
        self.changes.notify();

        Ok(Submission {
            id,
            uid: new.uid,
            tags: new.tags,
            files: new.files,
            created_at: new.created_at,
            deleted_at: None,
        })
    }

    async fn get(&self, id: Uuid) -> Result<Option<Submission>, MetadataError> {
        submission::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(to_submission)
            .transpose()
    }

    async fn query(&self, query: &SubmissionQuery) -> Result<Vec<Submission>, MetadataError> {
        let mut select = submission::Entity::find();

        select = match query.deletion {
            DeletionFilter::Live => select.filter(submission::Column::DeletedAt.is_null()),
            DeletionFilter::Deleted => select.filter(submission::Column::DeletedAt.is_not_null()),
        };
        if let Some(uid) = &query.uid {
            select = select.filter(submission::Column::Uid.eq(uid.as_str()));
        }
        select = match query.order {
            CreatedOrder::NewestFirst => select
                .order_by_desc(submission::Column::CreatedAt)
                .order_by_desc(submission::Column::Id),
            CreatedOrder::OldestFirst => select
                .order_by_asc(submission::Column::CreatedAt)
                .order_by_asc(submission::Column::Id),
        };
        if let Some(limit) = query.limit {
            select = select.limit(limit);
        }

        let models = select.all(&self.db).await?;

        // One undecodable row must not hide every other submission.
        Ok(models
            .into_iter()
            .filter_map(|model| match to_submission(model) {
                Ok(submission) => Some(submission),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupt submission record");
                    None
                }
            })
            .collect())
    }

    async fn begin(&self) -> Result<Box<dyn MetadataTxn>, MetadataError> {
        let txn = self.db.begin().await?;
        Ok(Box::new(SqlTxn {
            txn,
            changes: self.changes.clone(),
            dirty: false,
        }))
    }

    async fn remove(&self, id: Uuid) -> Result<bool, MetadataError> {
        let result = submission::Entity::delete_by_id(id).exec(&self.db).await?;
        let removed = result.rows_affected > 0;
        if removed {
            self.changes.notify();
        }
        Ok(removed)
    }

    fn changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}

struct SqlTxn {
    txn: DatabaseTransaction,
    changes: ChangeFeed,
    dirty: bool,
}

#[async_trait]
impl MetadataTxn for SqlTxn {
    async fn get_for_update(&mut self, id: Uuid) -> Result<Option<Submission>, MetadataError> {
        submission::Entity::find_by_id(id)
            .lock(LockType::Update)
            .one(&self.txn)
            .await?
            .map(to_submission)
            .transpose()
    }

    async fn mark_deleted(&mut self, id: Uuid, at: DateTime<Utc>) -> Result<(), MetadataError> {
        let result = submission::Entity::update_many()
            .col_expr(submission::Column::DeletedAt, Expr::value(at))
            .filter(submission::Column::Id.eq(id))
            .filter(submission::Column::DeletedAt.is_null())
            .exec(&self.txn)
            .await?;

        if result.rows_affected > 0 {
            self.dirty = true;
            return Ok(());
        }

        // Nothing updated: either already deleted or missing.
        let exists = submission::Entity::find_by_id(id)
            .one(&self.txn)
            .await?
            .is_some();
        if exists {
            Ok(())
        } else {
            Err(MetadataError::MissingRecord(id))
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), MetadataError> {
        let SqlTxn {
            txn,
            changes,
            dirty,
        } = *self;
        txn.commit().await?;
        if dirty {
            changes.notify();
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), MetadataError> {
        self.txn.rollback().await?;
        Ok(())
    }
}
