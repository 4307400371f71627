use std::time::Duration;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr};

/// Index backing both the live listing and the reconciler scan.
const SUBMISSION_INDEX_SQL: &str = "CREATE INDEX IF NOT EXISTS idx_submission_deleted_created \
     ON submission (deleted_at, created_at DESC)";

pub async fn init_db(db_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(db_url.to_owned());

    opt.max_connections(20)
        .min_connections(2)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(300))
        .sqlx_logging(false);

    let db = Database::connect(opt).await?;
    db.get_schema_registry("submission_server::entity::*")
        .sync(&db)
        .await?;

    db.execute_unprepared(SUBMISSION_INDEX_SQL).await?;

    Ok(db)
}
