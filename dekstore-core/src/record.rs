//! Key record types and the document format exchanged with durable stores.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;

use crate::error::{BackendError, ValidationError};

/// Encrypted key material by key name.
///
/// Values are opaque to this workspace (typically base64 ciphertext produced
/// by a KMS). Ordering carries no meaning.
pub type EncryptedKeys = HashMap<String, String>;

/// Record as persisted by a durable store: `{"id": ..., "keys": {...}}`.
pub type RecordDocument = serde_json::Value;

/// Caller-chosen unique identifier of a [`KeyRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Validate and wrap an identifier.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "id".to_string(),
            });
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for RecordId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// The unit of storage: one identifier and its encrypted data keys.
///
/// Immutable once created. There is no update or delete path anywhere in
/// the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub id: RecordId,
    pub keys: EncryptedKeys,
}

impl KeyRecord {
    /// Build a record for insertion.
    ///
    /// The key set must be non-empty.
    pub fn new(id: RecordId, keys: EncryptedKeys) -> Result<Self, ValidationError> {
        validate_keys(&keys)?;
        Ok(Self { id, keys })
    }

    /// Encode into the document shape durable stores persist.
    pub fn to_document(&self) -> RecordDocument {
        serde_json::json!({
            "id": self.id.as_str(),
            "keys": self.keys,
        })
    }

    /// Decode a document returned for `requested`.
    ///
    /// A document that cannot be decoded, belongs to a different id, or holds
    /// an empty key set is a backend fault. It is never reported as
    /// "not found".
    pub fn from_document(
        requested: &RecordId,
        document: RecordDocument,
    ) -> Result<Self, BackendError> {
        let malformed = |reason: String| BackendError::MalformedRecord {
            id: requested.to_string(),
            reason,
        };

        let record: KeyRecord =
            serde_json::from_value(document).map_err(|e| malformed(e.to_string()))?;

        if record.id != *requested {
            return Err(malformed(format!(
                "document carries id {} instead",
                record.id
            )));
        }
        validate_keys(&record.keys).map_err(|e| malformed(e.to_string()))?;
        Ok(record)
    }
}

/// Check the caller-supplied key set.
pub fn validate_keys(keys: &EncryptedKeys) -> Result<(), ValidationError> {
    if keys.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "keys".to_string(),
        });
    }
    Ok(())
}
