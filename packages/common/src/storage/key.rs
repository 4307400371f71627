use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::StorageError;

const MAX_KEY_LEN: usize = 512;

/// A validated, relative blob key such as `submissions/u1-1700000000000-0-cat.png`.
///
/// Keys are interpreted as `/`-separated paths by every backend, so the
/// same rules apply everywhere: no absolute paths, no traversal, no hidden
/// or empty segments, and only `a-zA-Z0-9/-_.` characters.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobKey(String);

impl BlobKey {
    /// Parse and validate a blob key.
    pub fn parse(raw: &str) -> Result<Self, StorageError> {
        let key = raw.trim();

        if key.is_empty() {
            return Err(StorageError::InvalidKey("key cannot be empty".into()));
        }
        if key.len() > MAX_KEY_LEN {
            return Err(StorageError::InvalidKey(format!(
                "key exceeds maximum length of {MAX_KEY_LEN} characters"
            )));
        }
        if key.contains('\0') {
            return Err(StorageError::InvalidKey("key must not contain null bytes".into()));
        }
        if key.contains('\\') {
            return Err(StorageError::InvalidKey("key must not contain backslashes".into()));
        }
        if key.starts_with('/') || key.ends_with('/') {
            return Err(StorageError::InvalidKey(
                "key must not start or end with '/'".into(),
            ));
        }

        for segment in key.split('/') {
            if segment.is_empty() {
                return Err(StorageError::InvalidKey("key must not contain empty segments".into()));
            }
            // Also rejects `.` and `..`.
            if segment.starts_with('.') {
                return Err(StorageError::InvalidKey(
                    "key segments must not start with '.'".into(),
                ));
            }
        }

        if !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.'))
        {
            return Err(StorageError::InvalidKey(
                "key contains invalid characters (allowed: a-zA-Z0-9, /, -, _, .)".into(),
            ));
        }

        Ok(Self(key.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The final path segment.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Extension of the final segment, without the dot.
    ///
    /// Returns `None` when the file name has no dot or the part after the
    /// last dot is empty.
    pub fn extension(&self) -> Option<&str> {
        let (stem, ext) = self.file_name().rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext)
    }

    /// Split into `/`-separated segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

impl fmt::Debug for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobKey({})", self.0)
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for BlobKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for BlobKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
