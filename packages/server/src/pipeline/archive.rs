use std::io::{Cursor, Write};
use std::sync::Arc;

use common::Submission;
use common::storage::{BlobKey, BlobStore};
use futures::future::join_all;
use tracing::{debug, instrument};
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use super::PipelineError;

/// Name used when a submission's tags sanitize to nothing.
const FALLBACK_ARCHIVE_STEM: &str = "submission";

/// A finished archive ready to be served.
#[derive(Debug, Clone)]
pub struct Archive {
    pub bytes: Vec<u8>,
    /// File name including the `.zip` suffix.
    pub name: String,
}

/// Collapse whitespace runs to `-` and lower-case.
pub fn sanitize_tags(tags: &str) -> String {
    let joined = tags
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase();
    if joined.is_empty() {
        FALLBACK_ARCHIVE_STEM.to_string()
    } else {
        joined
    }
}

/// Packages every blob of a submission into one zip.
#[derive(Clone)]
pub struct ArchiveBuilder {
    blobs: Arc<dyn BlobStore>,
}

impl ArchiveBuilder {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    /// Entry names in submission order: `<tags>-<position>.<extension>`.
    pub fn entry_names(submission: &Submission) -> Result<Vec<(BlobKey, String)>, PipelineError> {
        let stem = sanitize_tags(&submission.tags);
        submission
            .files
            .iter()
            .enumerate()
            .map(|(i, file)| {
                let key = file.key()?;
                let extension = key.extension().ok_or_else(|| {
                    PipelineError::Archive(format!("File '{}' has no extension", file.path))
                })?;
                let name = format!("{stem}-{}.{extension}", i + 1);
                Ok((key, name))
            })
            .collect()
    }

    /// Fetch all blobs concurrently and zip them. Any failure fails the
    /// whole archive.
    #[instrument(skip_all, fields(submission_id = %submission.id, files = submission.files.len()))]
    pub async fn build_archive(&self, submission: &Submission) -> Result<Archive, PipelineError> {
        let entries = Self::entry_names(submission)?;

        let fetched = join_all(entries.iter().map(|(key, _)| self.blobs.get(key))).await;
        let mut contents = Vec::with_capacity(entries.len());
        for ((_, name), data) in entries.into_iter().zip(fetched) {
            contents.push((name, data?));
        }

        let bytes = tokio::task::spawn_blocking(move || write_zip(&contents))
            .await
            .map_err(|e| PipelineError::Archive(format!("Compression task failed: {e}")))??;

        let name = format!("{}.zip", sanitize_tags(&submission.tags));
        debug!(%name, size = bytes.len(), "Archive built");
        Ok(Archive { bytes, name })
    }
}

fn write_zip(entries: &[(String, Vec<u8>)]) -> Result<Vec<u8>, PipelineError> {
    let zip_err = |e: zip::result::ZipError| PipelineError::Archive(e.to_string());

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, data) in entries {
        writer.start_file(name.as_str(), options).map_err(zip_err)?;
        writer
            .write_all(data)
            .map_err(|e| PipelineError::Archive(e.to_string()))?;
    }
    let cursor = writer.finish().map_err(zip_err)?;
    Ok(cursor.into_inner())
}
