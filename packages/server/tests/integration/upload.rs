use std::collections::HashMap;

use ::common::storage::BlobKey;
use submission_server::metadata::{MetadataStore, SubmissionQuery};
use submission_server::pipeline::{PipelineError, UploadEvent, UploadStatus};
use tokio::sync::mpsc;

use crate::common::{MAX_FILE_SIZE, Pipeline, image, video};

fn drain(rx: &mut mpsc::UnboundedReceiver<UploadEvent>) -> HashMap<usize, Vec<UploadEvent>> {
    let mut by_index: HashMap<usize, Vec<UploadEvent>> = HashMap::new();
    while let Ok(event) = rx.try_recv() {
        by_index.entry(event.index).or_default().push(event);
    }
    by_index
}

fn assert_well_formed(events: &[UploadEvent], terminal: UploadStatus) {
    let (last, progress) = events.split_last().expect("at least one event");
    assert_eq!(last.status, terminal);
    assert!(progress.iter().all(|e| e.status == UploadStatus::Uploading));
    assert!(
        events.windows(2).all(|w| w[0].percent <= w[1].percent || w[1].status == UploadStatus::Failed),
        "progress must not go backwards: {events:?}"
    );
}

mod successful_upload {
    use super::*;

    #[tokio::test]
    async fn creates_one_record_with_files_in_order() {
        let pipeline = Pipeline::new();
        let files = vec![
            image("a.png", 10),
            video("b.mp4", 20),
            image("c.jpg", 30),
        ];

        let id = pipeline
            .uploads()
            .submit("Foo Bar", files, "user-1", None)
            .await
            .unwrap();

        let all = pipeline
            .metadata
            .query(&SubmissionQuery::live())
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        let record = &all[0];
        assert_eq!(record.id, id);
        assert_eq!(record.uid, "user-1");
        assert_eq!(record.tags, "Foo Bar");
        assert!(record.deleted_at.is_none());

        let sizes: Vec<u64> = record.files.iter().map(|f| f.size).collect();
        assert_eq!(sizes, vec![10, 20, 30]);
        assert!(record.files[0].path.ends_with("-0-a.png"));
        assert!(record.files[1].path.ends_with("-1-b.mp4"));
        assert!(record.files[2].path.ends_with("-2-c.jpg"));
        for file in &record.files {
            assert!(pipeline.blobs.contains(&file.path));
        }
    }

    #[tokio::test]
    async fn records_uploader_on_each_blob() {
        let pipeline = Pipeline::new();
        let id = pipeline
            .uploads()
            .submit("t", vec![image("a.png", 4)], "user-9", None)
            .await
            .unwrap();

        let record = pipeline.metadata.get(id).await.unwrap().unwrap();
        let key = BlobKey::parse(&record.files[0].path).unwrap();
        let metadata = pipeline.blobs.inner.metadata(&key).unwrap();
        assert_eq!(metadata.owner_uid.as_deref(), Some("user-9"));
        assert_eq!(metadata.content_type.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn each_index_reports_monotonic_progress_then_done() {
        let pipeline = Pipeline::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        pipeline
            .uploads()
            .submit(
                "t",
                vec![image("a.png", 100), video("b.mp4", 200)],
                "u",
                Some(tx),
            )
            .await
            .unwrap();

        let by_index = drain(&mut rx);
        assert_eq!(by_index.len(), 2);
        for events in by_index.values() {
            assert_well_formed(events, UploadStatus::Done);
            assert_eq!(events.last().unwrap().percent, 100.0);
        }
    }
}

mod validation {
    use super::*;

    async fn assert_rejected(files: Vec<submission_server::pipeline::UploadFile>) {
        let pipeline = Pipeline::new();
        let err = pipeline
            .uploads()
            .submit("t", files, "u", None)
            .await
            .unwrap_err();
        assert!(err.is_validation(), "expected validation error, got {err}");
        assert!(pipeline.metadata.is_empty().await);
        assert!(pipeline.blobs.inner.is_empty());
    }

    #[tokio::test]
    async fn rejects_empty_batch() {
        assert_rejected(vec![]).await;
    }

    #[tokio::test]
    async fn rejects_more_than_five_files() {
        assert_rejected((0..6).map(|i| image(&format!("{i}.png"), 1)).collect()).await;
    }

    #[tokio::test]
    async fn rejects_non_media_type() {
        let mut doc = image("a.pdf", 1);
        doc.content_type = "application/pdf".into();
        assert_rejected(vec![image("ok.png", 1), doc]).await;
    }

    #[tokio::test]
    async fn rejects_file_at_size_limit() {
        assert_rejected(vec![image("big.png", MAX_FILE_SIZE as usize)]).await;
    }

    #[tokio::test]
    async fn rejects_missing_uid() {
        assert_rejected_with_uid("").await;
    }

    async fn assert_rejected_with_uid(uid: &str) {
        let pipeline = Pipeline::new();
        let err = pipeline
            .uploads()
            .submit("t", vec![image("a.png", 1)], uid, None)
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }
}

mod partial_failure {
    use super::*;

    #[tokio::test]
    async fn one_failed_upload_writes_no_record() {
        let pipeline = Pipeline::new();
        pipeline.blobs.fail_puts_containing("broken");
        let (tx, mut rx) = mpsc::unbounded_channel();

        let err = pipeline
            .uploads()
            .submit(
                "t",
                vec![image("a.png", 5), image("broken.png", 5), video("c.mp4", 5)],
                "u",
                Some(tx),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::UploadFailed {
                failed: 1,
                total: 3,
                ..
            }
        ));
        assert!(pipeline.metadata.is_empty().await);
        // The other uploads still ran to completion and are left behind.
        assert_eq!(pipeline.blobs.inner.len(), 2);

        let by_index = drain(&mut rx);
        assert_well_formed(&by_index[&0], UploadStatus::Done);
        assert_well_formed(&by_index[&1], UploadStatus::Failed);
        assert_well_formed(&by_index[&2], UploadStatus::Done);
    }
}
