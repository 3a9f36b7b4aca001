//! Attachment persistence
//!
//! Clients hand the engine attachment uris that may point at temporary
//! local files. Before a message or homework is stored, each uri is
//! persisted so the record only ever references durable blobs.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Scheme of uris owned by a blob store
pub const BLOB_SCHEME: &str = "blob://";

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("Invalid attachment uri: {0}")]
    InvalidUri(String),

    #[error("Attachment not readable: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist `uri` under `prefix`, returning the durable uri
    async fn persist(&self, uri: &str, prefix: &str) -> Result<String, BlobError>;

    /// Where a persisted blob can be read from
    fn public_url(&self, uri: &str) -> String;
}

/// True for uris that need no copying
pub fn is_durable(uri: &str) -> bool {
    uri.starts_with(BLOB_SCHEME) || uri.starts_with("https://") || uri.starts_with("http://")
}

/// Blob store backed by a directory on disk
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root_dir: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        LocalBlobStore {
            root_dir: root_dir.into(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn source_path(uri: &str) -> Result<PathBuf, BlobError> {
        let path = uri.strip_prefix("file://").unwrap_or(uri);
        if path.trim().is_empty() {
            return Err(BlobError::InvalidUri(uri.to_string()));
        }
        Ok(PathBuf::from(path))
    }

    fn key_for(prefix: &str, source: &Path) -> String {
        let name = Uuid::new_v4().to_string();
        match source.extension().and_then(|e| e.to_str()) {
            Some(ext) if !ext.is_empty() => format!("{}/{}.{}", prefix, name, ext.to_lowercase()),
            _ => format!("{}/{}", prefix, name),
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn persist(&self, uri: &str, prefix: &str) -> Result<String, BlobError> {
        if is_durable(uri) {
            return Ok(uri.to_string());
        }

        let source = Self::source_path(uri)?;
        let key = Self::key_for(prefix, &source);
        let target = self.root_dir.join(&key);

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&source, &target).await?;

        tracing::debug!(source = %source.display(), key = %key, "Persisted attachment");
        Ok(format!("{}{}", BLOB_SCHEME, key))
    }

    fn public_url(&self, uri: &str) -> String {
        match uri.strip_prefix(BLOB_SCHEME) {
            Some(key) => self.root_dir.join(key).display().to_string(),
            None => uri.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_persist_copies_local_file() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("photo.JPG");
        tokio::fs::write(&source, b"img").await.unwrap();

        let store = LocalBlobStore::new(dir.path().join("blobs"));
        let uri = store
            .persist(&format!("file://{}", source.display()), "messages")
            .await
            .unwrap();

        assert!(uri.starts_with("blob://messages/"));
        assert!(uri.ends_with(".jpg"));
        let stored = tokio::fs::read(store.public_url(&uri)).await.unwrap();
        assert_eq!(stored, b"img");
    }

    #[tokio::test]
    async fn test_durable_uri_unchanged() {
        let dir = tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        let uri = "blob://messages/abc.png";
        assert_eq!(store.persist(uri, "messages").await.unwrap(), uri);
    }

    #[tokio::test]
    async fn test_missing_file_is_error() {
        let dir = tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        let err = store
            .persist("/definitely/not/here.txt", "homework")
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::Io(_)));
    }

    #[tokio::test]
    async fn test_empty_uri_rejected() {
        let store = LocalBlobStore::new("unused");
        let err = store.persist("  ", "messages").await.unwrap_err();
        assert!(matches!(err, BlobError::InvalidUri(_)));
    }
}
