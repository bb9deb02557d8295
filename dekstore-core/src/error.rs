//! Error types for DEKSTORE operations

use std::time::Duration;
use thiserror::Error;

/// Durable backend errors.
///
/// Every failure reported by a durable store adapter lands here. The caching
/// layer never inspects the variant; it only propagates it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Connection to durable store failed: {reason}")]
    Connection { reason: String },

    #[error("Query failed: {reason}")]
    Query { reason: String },

    #[error("Malformed record for id {id}: {reason}")]
    MalformedRecord { id: String, reason: String },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Input validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for key store operations.
///
/// Absence of a record is not an error: reads return `Ok(None)` instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyStoreError {
    #[error("Key record already exists: {id}")]
    AlreadyExists { id: String },

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl KeyStoreError {
    /// Whether a caller-side retry may succeed.
    ///
    /// Only backend failures qualify. A conflict or a bad input will fail the
    /// same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend(_))
    }

    /// True for the create-once conflict.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// The conflicting id, if this is an `AlreadyExists` error.
    pub fn conflicting_id(&self) -> Option<&str> {
        match self {
            Self::AlreadyExists { id } => Some(id),
            _ => None,
        }
    }
}

/// Result type alias for key store operations.
pub type KeyStoreResult<T> = Result<T, KeyStoreError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_exists_display_carries_id() {
        let err = KeyStoreError::AlreadyExists {
            id: "tenant-42".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("already exists"));
        assert!(msg.contains("tenant-42"));
        assert_eq!(err.conflicting_id(), Some("tenant-42"));
    }

    #[test]
    fn test_backend_error_display_timeout() {
        let err = BackendError::Timeout {
            operation: "get_consistent",
            after: Duration::from_millis(250),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("get_consistent"));
        assert!(msg.contains("250ms"));
    }

    #[test]
    fn test_backend_error_display_malformed() {
        let err = BackendError::MalformedRecord {
            id: "abc".to_string(),
            reason: "keys is not an object".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Malformed record"));
        assert!(msg.contains("abc"));
        assert!(msg.contains("keys is not an object"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "table_name".to_string(),
            value: "drop table".to_string(),
            reason: "must be a plain identifier".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("table_name"));
        assert!(msg.contains("drop table"));
        assert!(msg.contains("plain identifier"));
    }

    #[test]
    fn test_key_store_error_from_variants() {
        let backend = KeyStoreError::from(BackendError::LockPoisoned);
        assert!(matches!(backend, KeyStoreError::Backend(_)));
        assert!(backend.is_retryable());

        let validation = KeyStoreError::from(ValidationError::RequiredFieldMissing {
            field: "id".to_string(),
        });
        assert!(matches!(validation, KeyStoreError::Validation(_)));
        assert!(!validation.is_retryable());

        let config = KeyStoreError::from(ConfigError::MissingRequired {
            field: "host".to_string(),
        });
        assert!(matches!(config, KeyStoreError::Config(_)));
    }

    #[test]
    fn test_already_exists_is_not_retryable() {
        let err = KeyStoreError::AlreadyExists {
            id: "x".to_string(),
        };
        assert!(err.is_already_exists());
        assert!(!err.is_retryable());
        assert_eq!(
            KeyStoreError::from(BackendError::LockPoisoned).conflicting_id(),
            None
        );
    }
}
