//! Remote authority client
//!
//! Protocol:
//! - `GET  <base>/state/snapshot` answers `{ "ok": bool, "snapshot": {...} }`
//! - `PUT  <base>/state/snapshot` with `{ "snapshot": {...} }`, any 2xx is success

use super::error::{SyncError, SyncResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const SNAPSHOT_PATH: &str = "/state/snapshot";

/// Source of truth consulted at startup and updated after every mutation
#[async_trait]
pub trait RemoteAuthority: Send + Sync {
    /// Serialized snapshot held by the remote, `None` when it has none
    async fn pull(&self) -> SyncResult<Option<String>>;

    /// Replace the remote snapshot with `snapshot`
    async fn push(&self, snapshot: &str) -> SyncResult<()>;
}

/// Body of `GET /state/snapshot`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullResponse {
    pub ok: bool,
    #[serde(default)]
    pub snapshot: Option<serde_json::Value>,
}

/// Body of `PUT /state/snapshot`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    pub snapshot: serde_json::Value,
}

/// `RemoteAuthority` over HTTP
#[derive(Debug, Clone)]
pub struct HttpRemoteAuthority {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemoteAuthority {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        HttpRemoteAuthority { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, SNAPSHOT_PATH)
    }
}

#[async_trait]
impl RemoteAuthority for HttpRemoteAuthority {
    async fn pull(&self) -> SyncResult<Option<String>> {
        let response = self.client.get(self.endpoint()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status(status.as_u16()));
        }

        let body: PullResponse = response
            .json()
            .await
            .map_err(|e| SyncError::InvalidPayload(e.to_string()))?;
        match body {
            PullResponse {
                ok: true,
                snapshot: Some(snapshot),
            } if !snapshot.is_null() => Ok(Some(snapshot.to_string())),
            _ => Ok(None),
        }
    }

    async fn push(&self, snapshot: &str) -> SyncResult<()> {
        let snapshot: serde_json::Value = serde_json::from_str(snapshot)
            .map_err(|e| SyncError::InvalidPayload(e.to_string()))?;

        let response = self
            .client
            .put(self.endpoint())
            .json(&PushRequest { snapshot })
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SyncError::Status(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let remote = HttpRemoteAuthority::new("http://localhost:8080/");
        assert_eq!(remote.base_url(), "http://localhost:8080");
        assert_eq!(remote.endpoint(), "http://localhost:8080/state/snapshot");
    }

    #[test]
    fn test_pull_response_without_snapshot() {
        let body: PullResponse = serde_json::from_str("{\"ok\": false}").unwrap();
        assert!(!body.ok);
        assert!(body.snapshot.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_remote_is_http_error() {
        let remote = HttpRemoteAuthority::new("http://127.0.0.1:9");
        let err = remote.push("{}").await.unwrap_err();
        assert!(matches!(err, SyncError::Http(_)));
    }
}
