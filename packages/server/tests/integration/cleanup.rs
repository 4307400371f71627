use async_trait::async_trait;
use ::common::storage::{BlobKey, BlobMetadata, BlobStore, no_progress};
use ::common::{NewSubmission, Submission};
use sea_orm::DbErr;
use submission_server::cleanup::Reconciler;
use submission_server::metadata::{
    MetadataError, MetadataStore, MetadataTxn, SubmissionQuery,
};
use submission_server::pipeline::PipelineError;
use tokio::sync::watch;
use uuid::Uuid;

use crate::common::{FlakyBlobStore, Pipeline, image, video};

async fn soft_deleted_submission(pipeline: &Pipeline) -> Submission {
    let id = pipeline
        .uploads()
        .submit(
            "t",
            vec![image("a.png", 4), video("b.mp4", 4), image("c.png", 4)],
            "u",
            None,
        )
        .await
        .unwrap();
    pipeline.deletes().soft_delete(&[id]).await.unwrap();
    pipeline.metadata.get(id).await.unwrap().unwrap()
}

#[tokio::test]
async fn sweep_deletes_blobs_then_record() {
    let pipeline = Pipeline::new();
    let doomed = soft_deleted_submission(&pipeline).await;
    let survivor = pipeline
        .uploads()
        .submit("keep", vec![image("k.png", 4)], "u", None)
        .await
        .unwrap();

    let report = pipeline.reconciler().sweep().await.unwrap();

    assert_eq!(report.scanned, 1);
    assert_eq!(report.removed, 1);
    assert_eq!(report.blobs_deleted, 3);
    assert!(pipeline.metadata.get(doomed.id).await.unwrap().is_none());
    assert!(pipeline.metadata.get(survivor).await.unwrap().is_some());
    for file in &doomed.files {
        assert!(!pipeline.blobs.contains(&file.path));
    }
    assert_eq!(pipeline.blobs.inner.len(), 1);
}

#[tokio::test]
async fn failed_blob_delete_keeps_record_and_retries_only_that_path() {
    let pipeline = Pipeline::new();
    let doomed = soft_deleted_submission(&pipeline).await;
    let stuck = doomed.files[1].path.clone();
    pipeline.blobs.fail_deletes_containing(&stuck);

    let first = pipeline.reconciler().sweep().await.unwrap();
    assert_eq!(first.retained, 1);
    assert_eq!(first.blob_failures, 1);
    assert_eq!(first.blobs_deleted, 2);
    let kept = pipeline.metadata.get(doomed.id).await.unwrap().unwrap();
    assert_eq!(kept.deleted_at, doomed.deleted_at);
    assert!(pipeline.blobs.contains(&stuck));

    pipeline.blobs.heal();
    let second = pipeline.reconciler().sweep().await.unwrap();
    assert_eq!(second.removed, 1);
    assert_eq!(second.blobs_deleted, 1);
    assert_eq!(second.blobs_already_absent, 2);
    assert!(pipeline.metadata.get(doomed.id).await.unwrap().is_none());

    assert_eq!(pipeline.blobs.delete_calls(&stuck), 2);
    assert_eq!(pipeline.blobs.delete_calls(&doomed.files[0].path), 1);
    assert_eq!(pipeline.blobs.delete_calls(&doomed.files[2].path), 1);
}

#[tokio::test]
async fn one_bad_submission_does_not_block_others() {
    let pipeline = Pipeline::new();
    let bad = soft_deleted_submission(&pipeline).await;
    let good = soft_deleted_submission(&pipeline).await;
    pipeline.blobs.fail_deletes_containing(&bad.files[0].path);

    let report = pipeline.reconciler().sweep().await.unwrap();

    assert_eq!(report.scanned, 2);
    assert_eq!(report.removed, 1);
    assert_eq!(report.retained, 1);
    assert!(pipeline.metadata.get(bad.id).await.unwrap().is_some());
    assert!(pipeline.metadata.get(good.id).await.unwrap().is_none());
}

#[tokio::test]
async fn concurrent_sweeps_converge() {
    let pipeline = Pipeline::new();
    for _ in 0..4 {
        soft_deleted_submission(&pipeline).await;
    }

    let a = pipeline.reconciler();
    let b = pipeline.reconciler();
    let (ra, rb) = tokio::join!(a.sweep(), b.sweep());
    ra.unwrap();
    rb.unwrap();

    assert!(pipeline.metadata.is_empty().await);
    assert!(pipeline.blobs.inner.is_empty());
}

#[tokio::test]
async fn blob_put_directly_is_removed_with_its_record() {
    let pipeline = Pipeline::new();
    let key = BlobKey::parse("submissions/manual.png").unwrap();
    pipeline
        .blobs
        .put(&key, b"x", &BlobMetadata::default(), &no_progress)
        .await
        .unwrap();
    let created = pipeline
        .metadata
        .create(NewSubmission {
            uid: "u".into(),
            tags: "t".into(),
            files: vec![::common::SubmissionFile {
                path: key.to_string(),
                size: 1,
                kind: ::common::FileKind::Image,
            }],
            created_at: chrono::Utc::now(),
        })
        .await
        .unwrap();
    pipeline.deletes().soft_delete(&[created.id]).await.unwrap();

    pipeline.reconciler().sweep().await.unwrap();
    assert!(pipeline.blobs.inner.is_empty());
}

/// Metadata store whose every call fails.
struct UnavailableMetadata {
    changes: watch::Sender<u64>,
}

fn unavailable() -> MetadataError {
    MetadataError::Db(DbErr::Custom("metadata store unavailable".into()))
}

#[async_trait]
impl MetadataStore for UnavailableMetadata {
    async fn create(&self, _new: NewSubmission) -> Result<Submission, MetadataError> {
        Err(unavailable())
    }

    async fn get(&self, _id: Uuid) -> Result<Option<Submission>, MetadataError> {
        Err(unavailable())
    }

    async fn query(&self, _query: &SubmissionQuery) -> Result<Vec<Submission>, MetadataError> {
        Err(unavailable())
    }

    async fn begin(&self) -> Result<Box<dyn MetadataTxn>, MetadataError> {
        Err(unavailable())
    }

    async fn remove(&self, _id: Uuid) -> Result<bool, MetadataError> {
        Err(unavailable())
    }

    fn changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}

#[tokio::test]
async fn failed_initial_query_fails_the_sweep() {
    let reconciler = Reconciler::new(
        std::sync::Arc::new(FlakyBlobStore::new()),
        std::sync::Arc::new(UnavailableMetadata {
            changes: watch::channel(0).0,
        }),
        2,
    );

    let err = reconciler.sweep().await.unwrap_err();
    assert!(matches!(err, PipelineError::Metadata(_)));
}
