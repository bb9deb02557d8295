//! DEKSTORE Core - Record, Error and Configuration Types
//!
//! Pure data structures shared by every other crate in the workspace.
//! Storage adapters and the caching layer live in `dekstore-storage`.

pub mod config;
pub mod error;
pub mod record;

pub use config::{
    CacheConfig, DEFAULT_BACKEND_TIMEOUT, DEFAULT_CACHE_CLEANUP_INTERVAL, DEFAULT_CACHE_TTL,
};
pub use error::{BackendError, ConfigError, KeyStoreError, KeyStoreResult, ValidationError};
pub use record::{validate_keys, EncryptedKeys, KeyRecord, RecordDocument, RecordId};
