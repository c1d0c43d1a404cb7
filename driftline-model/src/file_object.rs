use std::path::Path;

use chrono::{DateTime, Utc};
use url::Url;

use crate::error::{ModelError, Result};
use crate::partition_key::PartitionKey;
use crate::status::FileObjectStatus;

/// Immutable description of a discovered file object, as produced by a
/// listing. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileObjectMeta {
    pub uri: Url,
    pub name: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub content_digest: Option<String>,
}

impl FileObjectMeta {
    pub fn new(uri: Url, size: u64, last_modified: DateTime<Utc>) -> Result<Self> {
        let name = name_from_uri(&uri).ok_or_else(|| {
            ModelError::InvalidMetadata(format!("no file name in uri '{uri}'"))
        })?;
        Ok(Self {
            uri,
            name,
            size,
            last_modified,
            content_digest: None,
        })
    }

    /// Builds metadata for a local file. `path` must be absolute.
    pub fn from_local_path(
        path: &Path,
        size: u64,
        last_modified: DateTime<Utc>,
    ) -> Result<Self> {
        let uri = Url::from_file_path(path).map_err(|_| {
            ModelError::InvalidMetadata(format!(
                "path is not absolute: {}",
                path.display()
            ))
        })?;
        Self::new(uri, size, last_modified)
    }

    pub fn with_content_digest(mut self, digest: impl Into<String>) -> Self {
        self.content_digest = Some(digest.into());
        self
    }

    pub fn string_uri(&self) -> &str {
        self.uri.as_str()
    }

    /// Path component of the uri, or the local filesystem path for `file:` uris.
    pub fn path(&self) -> String {
        match self.uri.to_file_path() {
            Ok(path) if self.uri.scheme() == "file" => {
                path.to_string_lossy().into_owned()
            }
            _ => self.uri.path().to_string(),
        }
    }
}

fn name_from_uri(uri: &Url) -> Option<String> {
    if uri.scheme() == "file"
        && let Ok(path) = uri.to_file_path()
    {
        return path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
    }
    uri.path_segments()?
        .filter(|segment| !segment.is_empty())
        .next_back()
        .map(str::to_string)
}

/// Progress position reported by workers while reading a file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileObjectOffset {
    pub position: u64,
    pub rows: u64,
}

/// Persisted record of a file object: metadata snapshot, worker progress and
/// lifecycle status. Owned by the state store; the monitor only reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileObject {
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub key: Option<PartitionKey>,
    pub metadata: FileObjectMeta,
    #[cfg_attr(feature = "serde", serde(default))]
    pub offset: FileObjectOffset,
    pub status: FileObjectStatus,
}

impl FileObject {
    pub fn new(metadata: FileObjectMeta, status: FileObjectStatus) -> Self {
        Self {
            key: None,
            metadata,
            offset: FileObjectOffset::default(),
            status,
        }
    }

    pub fn with_key(mut self, key: PartitionKey) -> Self {
        self.key = Some(key);
        self
    }

    pub fn with_status(mut self, status: FileObjectStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_offset(mut self, offset: FileObjectOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn key(&self) -> Option<&PartitionKey> {
        self.key.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
    }

    #[test]
    fn derives_name_from_file_uri() {
        let meta =
            FileObjectMeta::from_local_path(Path::new("/data/in/orders.csv"), 42, ts())
                .unwrap();
        assert_eq!(meta.name, "orders.csv");
        assert_eq!(meta.string_uri(), "file:///data/in/orders.csv");
        assert_eq!(meta.path(), "/data/in/orders.csv");
    }

    #[test]
    fn derives_name_from_remote_uri() {
        let uri = Url::parse("s3://bucket/landing/2024/events.json").unwrap();
        let meta = FileObjectMeta::new(uri, 1, ts()).unwrap();
        assert_eq!(meta.name, "events.json");
        assert_eq!(meta.path(), "/landing/2024/events.json");
    }

    #[test]
    fn rejects_relative_local_path() {
        let err = FileObjectMeta::from_local_path(Path::new("relative.csv"), 1, ts())
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidMetadata(_)));
    }

    #[test]
    fn builders_return_modified_copies() {
        let meta =
            FileObjectMeta::from_local_path(Path::new("/a.csv"), 1, ts()).unwrap();
        let key = PartitionKey::new("a").unwrap();
        let object = FileObject::new(meta, FileObjectStatus::Started)
            .with_key(key.clone())
            .with_status(FileObjectStatus::Completed);
        assert_eq!(object.key(), Some(&key));
        assert_eq!(object.status, FileObjectStatus::Completed);
        assert_eq!(object.offset, FileObjectOffset::default());
    }
}
