//! Durable store contract and the in-memory adapter.
//!
//! The caching layer reaches the durable backend only through
//! [`DurableStore`]. Adapters own every backend-specific detail, including
//! how an "already exists" condition is recognised; they report it through
//! [`InsertOutcome`] rather than as an error.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use dekstore_core::{BackendError, KeyRecord, RecordDocument, RecordId};

/// Result of an atomic create-if-absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was written.
    Inserted,
    /// A record with the same id already existed; nothing was written.
    AlreadyExists,
}

/// Durable storage capability consumed by the caching key store.
///
/// # Implementation Requirements
///
/// - `get_consistent` must observe every insert that completed before it
///   started (strongly-consistent read).
/// - `insert_if_absent` must be atomic: of any number of concurrent inserts
///   for one id, exactly one returns `Inserted`.
/// - Neither method may retry internally.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Strongly-consistent point read. `Ok(None)` means no record exists.
    async fn get_consistent(&self, id: &RecordId) -> Result<Option<RecordDocument>, BackendError>;

    /// Insert `record` only if no record with its id exists.
    async fn insert_if_absent(&self, record: &KeyRecord) -> Result<InsertOutcome, BackendError>;
}

// ============================================================================
// IN-MEMORY ADAPTER
// ============================================================================

/// In-memory durable store for tests and local runs.
///
/// Strongly consistent by construction. Counts backend calls so tests can
/// observe cache behaviour, and supports injected failures, artificial
/// latency and raw (possibly corrupt) documents.
#[derive(Debug, Default)]
pub struct InMemoryDurableStore {
    documents: RwLock<HashMap<RecordId, RecordDocument>>,
    get_calls: AtomicU64,
    insert_calls: AtomicU64,
    injected_failures: Mutex<VecDeque<BackendError>>,
    latency: RwLock<Option<Duration>>,
}

impl InMemoryDurableStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` before it touches the data.
    pub fn with_latency(self, latency: Duration) -> Self {
        if let Ok(mut slot) = self.latency.write() {
            *slot = Some(latency);
        }
        self
    }

    /// Make the next call (read or insert) fail with `error`.
    ///
    /// Calls queue up: injecting twice fails the next two calls.
    pub fn inject_failure(&self, error: BackendError) {
        if let Ok(mut queue) = self.injected_failures.lock() {
            queue.push_back(error);
        }
    }

    /// Store a raw document under `id`, bypassing encoding.
    ///
    /// Lets tests plant records the decoder must reject.
    pub fn put_raw_document(&self, id: RecordId, document: RecordDocument) -> Result<(), BackendError> {
        let mut documents = self
            .documents
            .write()
            .map_err(|_| BackendError::LockPoisoned)?;
        documents.insert(id, document);
        Ok(())
    }

    /// Number of `get_consistent` calls served so far.
    pub fn get_calls(&self) -> u64 {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Number of `insert_if_absent` calls served so far.
    pub fn insert_calls(&self) -> u64 {
        self.insert_calls.load(Ordering::SeqCst)
    }

    /// Number of stored records.
    pub fn record_count(&self) -> usize {
        self.documents.read().map(|d| d.len()).unwrap_or(0)
    }

    async fn before_call(&self) -> Result<(), BackendError> {
        let latency = *self.latency.read().map_err(|_| BackendError::LockPoisoned)?;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let injected = self
            .injected_failures
            .lock()
            .map_err(|_| BackendError::LockPoisoned)?
            .pop_front();
        match injected {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DurableStore for InMemoryDurableStore {
    async fn get_consistent(&self, id: &RecordId) -> Result<Option<RecordDocument>, BackendError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.before_call().await?;

        let documents = self
            .documents
            .read()
            .map_err(|_| BackendError::LockPoisoned)?;
        Ok(documents.get(id).cloned())
    }

    async fn insert_if_absent(&self, record: &KeyRecord) -> Result<InsertOutcome, BackendError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        self.before_call().await?;

        let mut documents = self
            .documents
            .write()
            .map_err(|_| BackendError::LockPoisoned)?;
        if documents.contains_key(&record.id) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        documents.insert(record.id.clone(), record.to_document());
        Ok(InsertOutcome::Inserted)
    }
}
