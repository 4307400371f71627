use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "submission")]
pub struct Model {
    /// UUIDv7 primary key, assigned on insert.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Identifier of the creating user.
    pub uid: String,

    pub tags: String,

    /// Submission files stored as JSON array of {path, size, type} objects.
    #[sea_orm(column_type = "JsonBinary")]
    pub files: serde_json::Value,

    pub created_at: DateTimeUtc,

    /// NULL while the submission is live.
    pub deleted_at: Option<DateTimeUtc>,
}

impl ActiveModelBehavior for ActiveModel {}
