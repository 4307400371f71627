use submission_server::metadata::{MetadataStore, SubmissionQuery};
use submission_server::pipeline::PipelineError;
use uuid::Uuid;

use crate::common::{Pipeline, image};

async fn seed(pipeline: &Pipeline, count: usize) -> Vec<Uuid> {
    let mut ids = Vec::new();
    for i in 0..count {
        let id = pipeline
            .uploads()
            .submit(&format!("tag {i}"), vec![image("a.png", 3)], "u", None)
            .await
            .unwrap();
        ids.push(id);
    }
    ids
}

#[tokio::test]
async fn marks_all_records() {
    let pipeline = Pipeline::new();
    let ids = seed(&pipeline, 3).await;

    pipeline.deletes().soft_delete(&ids).await.unwrap();

    let live = pipeline
        .metadata
        .query(&SubmissionQuery::live())
        .await
        .unwrap();
    assert!(live.is_empty());
    let deleted = pipeline
        .metadata
        .query(&SubmissionQuery::deleted())
        .await
        .unwrap();
    assert_eq!(deleted.len(), 3);
    // Blobs are untouched until the reconciler runs.
    assert_eq!(pipeline.blobs.inner.len(), 3);
}

#[tokio::test]
async fn unknown_id_aborts_whole_set() {
    let pipeline = Pipeline::new();
    let mut ids = seed(&pipeline, 2).await;
    ids.push(Uuid::now_v7());

    let err = pipeline.deletes().soft_delete(&ids).await.unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)));

    let live = pipeline
        .metadata
        .query(&SubmissionQuery::live())
        .await
        .unwrap();
    assert_eq!(live.len(), 2);
}

#[tokio::test]
async fn readers_never_observe_partial_deletion() {
    let pipeline = Pipeline::new();
    let ids = seed(&pipeline, 5).await;
    let metadata = pipeline.metadata.clone();

    let reader = tokio::spawn(async move {
        for _ in 0..200 {
            let deleted = metadata
                .query(&SubmissionQuery::deleted())
                .await
                .unwrap()
                .len();
            assert!(deleted == 0 || deleted == 5, "saw {deleted} of 5 deleted");
            tokio::task::yield_now().await;
        }
    });

    pipeline.deletes().soft_delete(&ids).await.unwrap();
    reader.await.unwrap();
}
