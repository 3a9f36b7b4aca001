//! Error types surfaced by engine operations
//!
//! Every public operation fails with exactly one of three kinds. Lower layers
//! keep their own error enums and are folded into these at the engine
//! boundary.

use crate::core_store::StoreError;
use thiserror::Error;

/// Result type for engine operations
pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Invalid, expired or unknown session, or missing permission
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Referenced record is absent or inactive
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed input or a workflow precondition that does not hold
    #[error("Validation failed: {0}")]
    Validation(String),
}

impl CoreError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        CoreError::Unauthorized(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        CoreError::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }

    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Unauthorized(_) => "unauthorized",
            CoreError::NotFound(_) => "not_found",
            CoreError::Validation(_) => "validation",
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => CoreError::NotFound(format!("{} {}", kind, id)),
            other => CoreError::Validation(other.to_string()),
        }
    }
}
