use std::io::{Cursor, Read};

use submission_server::metadata::MetadataStore;
use submission_server::pipeline::{ArchiveBuilder, PipelineError};

use crate::common::{Pipeline, image, video};
use common::storage::BlobStore;

#[tokio::test]
async fn archive_contains_renamed_entries_in_order() {
    let pipeline = Pipeline::new();
    let mut first = image("holiday.PNG", 0);
    first.data = b"first".to_vec();
    let mut second = video("clip.mp4", 0);
    second.data = b"second".to_vec();
    let id = pipeline
        .uploads()
        .submit("Foo Bar", vec![first, second], "u", None)
        .await
        .unwrap();
    let submission = pipeline.metadata.get(id).await.unwrap().unwrap();

    let archive = ArchiveBuilder::new(pipeline.blobs.clone())
        .build_archive(&submission)
        .await
        .unwrap();

    assert_eq!(archive.name, "foo-bar.zip");
    let mut zip = zip::ZipArchive::new(Cursor::new(archive.bytes)).unwrap();
    let mut names: Vec<String> = zip.file_names().map(str::to_string).collect();
    names.sort();
    assert_eq!(names, vec!["foo-bar-1.PNG", "foo-bar-2.mp4"]);

    let mut body = String::new();
    zip.by_name("foo-bar-2.mp4")
        .unwrap()
        .read_to_string(&mut body)
        .unwrap();
    assert_eq!(body, "second");
}

#[tokio::test]
async fn missing_blob_produces_no_archive() {
    let pipeline = Pipeline::new();
    let id = pipeline
        .uploads()
        .submit("t", vec![image("a.png", 3), image("b.png", 3)], "u", None)
        .await
        .unwrap();
    let submission = pipeline.metadata.get(id).await.unwrap().unwrap();

    // Simulate a blob removed out from under the record.
    let key = submission.files[1].key().unwrap();
    pipeline.blobs.inner.delete(&key).await.unwrap();

    let err = ArchiveBuilder::new(pipeline.blobs.clone())
        .build_archive(&submission)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Storage(_)));
}
