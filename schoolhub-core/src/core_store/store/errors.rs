/*
    errors.rs - Error types for the store subsystem

    Defines all error types that can occur in:
    - Structural store primitives
    - Snapshot serialization
    - Structural validation of external payloads
*/

use thiserror::Error;

/// Errors that can occur in the store subsystem
#[derive(Debug, Error)]
pub enum StoreError {
    /// Entity not found
    #[error("Not found: {kind} {id}")]
    NotFound { kind: &'static str, id: String },

    /// Insert of an id that already exists in its collection
    #[error("Duplicate {kind} id: {id}")]
    Duplicate { kind: &'static str, id: String },

    /// Storage I/O error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Payload parsed but violates structural rules
    #[error("Corrupted data: {0}")]
    CorruptedData(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            StoreError::Deserialization(err.to_string())
        } else {
            StoreError::Serialization(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::NotFound {
            kind: "lesson",
            id: "l1".to_string(),
        };
        assert_eq!(err.to_string(), "Not found: lesson l1");
    }

    #[test]
    fn test_duplicate_error_display() {
        let err = StoreError::Duplicate {
            kind: "thread",
            id: "t1".to_string(),
        };
        assert!(err.to_string().contains("Duplicate thread"));
    }

    #[test]
    fn test_json_syntax_error_is_deserialization() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let store_err: StoreError = err.into();
        assert!(matches!(store_err, StoreError::Deserialization(_)));
    }
}
