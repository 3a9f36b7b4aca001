/*
    error.rs - Persistence and remote sync errors

    None of these reach an engine caller: the coordinator logs them and
    reports them through the ticket status.
*/

use crate::core_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Remote call timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Remote answered with status {0}")]
    Status(u16),

    #[error("Invalid remote payload: {0}")]
    InvalidPayload(String),

    #[error("Local cache error: {0}")]
    Store(#[from] StoreError),

    #[error("Sync worker is not running")]
    WorkerStopped,
}

pub type SyncResult<T> = Result<T, SyncError>;

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout
        } else {
            SyncError::Http(err.to_string())
        }
    }
}

impl From<tokio::time::error::Elapsed> for SyncError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        SyncError::Timeout
    }
}
