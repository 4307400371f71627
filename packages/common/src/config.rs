use serde::Deserialize;

use crate::submission::{DEFAULT_MAX_FILE_SIZE, MAX_FILES_PER_SUBMISSION};

/// Which blob store backend to use.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Filesystem,
    Memory,
    S3,
}

/// Connection settings for an S3-compatible bucket.
#[derive(Debug, Deserialize, Clone)]
pub struct S3Config {
    pub bucket: String,
    /// Region name, e.g. "us-east-1". Default: "us-east-1".
    #[serde(default = "default_s3_region")]
    pub region: String,
    /// Custom endpoint for MinIO and other S3-compatible services.
    pub endpoint: Option<String>,
    pub access_key: String,
    pub secret_key: String,
    /// Use path-style URLs (`http://endpoint/bucket`). Default: true.
    #[serde(default = "default_s3_path_style")]
    pub path_style: bool,
}

fn default_s3_region() -> String {
    "us-east-1".into()
}
fn default_s3_path_style() -> bool {
    true
}

/// Blob storage configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageAppConfig {
    /// Backend selection. Default: filesystem.
    #[serde(default)]
    pub backend: StorageBackend,
    /// Root directory for the filesystem backend. Default: "./data/blobs".
    #[serde(default = "default_storage_path")]
    pub path: String,
    /// Required when `backend = "s3"`.
    pub s3: Option<S3Config>,
}

fn default_storage_path() -> String {
    "./data/blobs".into()
}

impl Default for StorageAppConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_storage_path(),
            s3: None,
        }
    }
}

/// Limits enforced on every new submission.
#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    /// Maximum files per submission, capped at 5. Default: 5.
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    /// Files must be strictly smaller than this many bytes. Default: 100 MiB.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_max_files() -> usize {
    MAX_FILES_PER_SUBMISSION
}
fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

impl UploadConfig {
    /// The file-count limit actually enforced.
    pub fn effective_max_files(&self) -> usize {
        self.max_files.clamp(1, MAX_FILES_PER_SUBMISSION)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            max_file_size: default_max_file_size(),
        }
    }
}

/// Settings for the scheduled reconciliation of soft-deleted submissions.
#[derive(Debug, Deserialize, Clone)]
pub struct CleanupConfig {
    /// Whether the scheduler runs inside the server process. Default: true.
    #[serde(default = "default_cleanup_enabled")]
    pub enabled: bool,
    /// Seconds between sweeps. Default: 3600 (hourly).
    #[serde(default = "default_cleanup_interval_secs")]
    pub interval_secs: u64,
    /// Submissions reconciled concurrently within one sweep. Default: 8.
    #[serde(default = "default_cleanup_concurrency")]
    pub concurrency: usize,
}

fn default_cleanup_enabled() -> bool {
    true
}
fn default_cleanup_interval_secs() -> u64 {
    3600
}
fn default_cleanup_concurrency() -> usize {
    8
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: default_cleanup_enabled(),
            interval_secs: default_cleanup_interval_secs(),
            concurrency: default_cleanup_concurrency(),
        }
    }
}
