//! In-memory stand-ins for the remote authority and the blob store
//!
//! Both support failure injection so tests can exercise the degraded paths
//! without a network or a filesystem.

use crate::core_sync::{RemoteAuthority, SyncError, SyncResult};
use crate::services::blob::{is_durable, BlobError, BlobStore, BLOB_SCHEME};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Default)]
struct RemoteState {
    snapshot: Option<String>,
    fail_pushes: bool,
    fail_pulls: bool,
    delay: Duration,
    pushes: usize,
}

/// Remote authority holding its snapshot in memory
#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<RemoteState>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        MemoryRemote::default()
    }

    /// Remote that already holds `snapshot`
    pub fn with_snapshot(snapshot: &str) -> Self {
        let remote = MemoryRemote::new();
        remote.lock().snapshot = Some(snapshot.to_string());
        remote
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RemoteState> {
        // a test that panicked while holding the lock already failed
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn fail_pushes(&self, fail: bool) {
        self.lock().fail_pushes = fail;
    }

    pub fn fail_pulls(&self, fail: bool) {
        self.lock().fail_pulls = fail;
    }

    /// Delay every call by `delay` before answering
    pub fn set_delay(&self, delay: Duration) {
        self.lock().delay = delay;
    }

    /// Number of accepted pushes
    pub fn push_count(&self) -> usize {
        self.lock().pushes
    }

    /// Snapshot currently held
    pub fn snapshot(&self) -> Option<String> {
        self.lock().snapshot.clone()
    }

    async fn pause(&self) {
        let delay = self.lock().delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl RemoteAuthority for MemoryRemote {
    async fn pull(&self) -> SyncResult<Option<String>> {
        self.pause().await;
        let state = self.lock();
        if state.fail_pulls {
            return Err(SyncError::Status(503));
        }
        Ok(state.snapshot.clone())
    }

    async fn push(&self, snapshot: &str) -> SyncResult<()> {
        self.pause().await;
        let mut state = self.lock();
        if state.fail_pushes {
            return Err(SyncError::Status(503));
        }
        state.snapshot = Some(snapshot.to_string());
        state.pushes += 1;
        Ok(())
    }
}

/// Blob store that records what it was asked to persist
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    persisted: Mutex<Vec<(String, String)>>,
    fail: Mutex<bool>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        MemoryBlobStore::default()
    }

    pub fn fail(&self, fail: bool) {
        *self.fail.lock().unwrap_or_else(|p| p.into_inner()) = fail;
    }

    /// (source uri, stored uri) pairs, in call order
    pub fn persisted(&self) -> Vec<(String, String)> {
        self.persisted
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn persist(&self, uri: &str, prefix: &str) -> Result<String, BlobError> {
        if is_durable(uri) {
            return Ok(uri.to_string());
        }
        if *self.fail.lock().unwrap_or_else(|p| p.into_inner()) || uri.trim().is_empty() {
            return Err(BlobError::InvalidUri(uri.to_string()));
        }

        let mut persisted = self.persisted.lock().unwrap_or_else(|p| p.into_inner());
        let stored = format!("{}{}/{}", BLOB_SCHEME, prefix, persisted.len() + 1);
        persisted.push((uri.to_string(), stored.clone()));
        Ok(stored)
    }

    fn public_url(&self, uri: &str) -> String {
        uri.replacen(BLOB_SCHEME, "memory://", 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_remote_round_trip() {
        let remote = MemoryRemote::new();
        assert_eq!(remote.pull().await.unwrap(), None);

        remote.push("{}").await.unwrap();
        assert_eq!(remote.pull().await.unwrap().as_deref(), Some("{}"));
        assert_eq!(remote.push_count(), 1);
    }

    #[tokio::test]
    async fn test_memory_remote_failures() {
        let remote = MemoryRemote::with_snapshot("{}");
        remote.fail_pulls(true);
        remote.fail_pushes(true);
        assert!(remote.pull().await.is_err());
        assert!(remote.push("{\"a\":1}").await.is_err());
        assert_eq!(remote.snapshot().as_deref(), Some("{}"));
        assert_eq!(remote.push_count(), 0);
    }

    #[tokio::test]
    async fn test_memory_blob_store() {
        let blobs = MemoryBlobStore::new();
        let stored = blobs.persist("file:///tmp/a.png", "messages").await.unwrap();
        assert_eq!(stored, "blob://messages/1");
        assert_eq!(blobs.public_url(&stored), "memory://messages/1");

        let kept = blobs.persist("https://cdn.example/x.png", "messages").await.unwrap();
        assert_eq!(kept, "https://cdn.example/x.png");
        assert_eq!(blobs.persisted().len(), 1);

        blobs.fail(true);
        assert!(blobs.persist("file:///tmp/b.png", "homework").await.is_err());
    }
}
