//! DEKSTORE Test Utilities
//!
//! Centralized test infrastructure for the DEKSTORE workspace:
//! - Proptest generators for ids and key sets
//! - Fault-injecting durable store wrapper
//! - Test fixtures for common scenarios
//! - Custom assertions for key store results

// Re-export the in-memory adapter from its source crate
pub use dekstore_storage::{CachingKeyStore, DurableStore, InMemoryDurableStore, InsertOutcome};

// Re-export core types for convenience
pub use dekstore_core::{
    BackendError, CacheConfig, EncryptedKeys, KeyRecord, KeyStoreError, KeyStoreResult,
    RecordDocument, RecordId,
};

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// FAULT INJECTION
// ============================================================================

/// When an injected failure strikes relative to the wrapped call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Let the call through.
    Pass,
    /// Fail without reaching the inner store.
    Before,
    /// Run the inner call, then report failure anyway.
    ///
    /// Models a response lost after the backend committed.
    After,
}

/// Durable store wrapper that fails calls according to a script.
///
/// Each call pops the next [`Fault`] from the script; once the script is
/// exhausted every call passes.
#[derive(Debug)]
pub struct FlakyStore<S> {
    inner: S,
    script: Mutex<VecDeque<Fault>>,
    injected: AtomicU64,
}

impl<S: DurableStore> FlakyStore<S> {
    pub fn new(inner: S, script: impl IntoIterator<Item = Fault>) -> Self {
        Self {
            inner,
            script: Mutex::new(script.into_iter().collect()),
            injected: AtomicU64::new(0),
        }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of failures reported so far.
    pub fn injected(&self) -> u64 {
        self.injected.load(Ordering::SeqCst)
    }

    fn next_fault(&self) -> Fault {
        self.script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or(Fault::Pass)
    }

    fn failure(&self, operation: &str) -> BackendError {
        self.injected.fetch_add(1, Ordering::SeqCst);
        BackendError::Connection {
            reason: format!("injected fault in {operation}"),
        }
    }
}

#[async_trait]
impl<S: DurableStore> DurableStore for FlakyStore<S> {
    async fn get_consistent(&self, id: &RecordId) -> Result<Option<RecordDocument>, BackendError> {
        match self.next_fault() {
            Fault::Pass => self.inner.get_consistent(id).await,
            Fault::Before => Err(self.failure("get_consistent")),
            Fault::After => {
                let _ = self.inner.get_consistent(id).await;
                Err(self.failure("get_consistent"))
            }
        }
    }

    async fn insert_if_absent(&self, record: &KeyRecord) -> Result<InsertOutcome, BackendError> {
        match self.next_fault() {
            Fault::Pass => self.inner.insert_if_absent(record).await,
            Fault::Before => Err(self.failure("insert_if_absent")),
            Fault::After => {
                let _ = self.inner.insert_if_absent(record).await;
                Err(self.failure("insert_if_absent"))
            }
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating DEKSTORE values.

    use super::*;
    use proptest::prelude::*;

    /// Generate an arbitrary valid record id.
    pub fn arb_record_id() -> impl Strategy<Value = RecordId> {
        "[a-z][a-z0-9:/_-]{0,47}".prop_map(|raw| {
            RecordId::new(raw).expect("generated ids are non-empty")
        })
    }

    /// Generate a key name such as `dek` or `dek-v2`.
    pub fn arb_key_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_-]{0,15}"
    }

    /// Generate base64-looking ciphertext.
    pub fn arb_ciphertext() -> impl Strategy<Value = String> {
        "[A-Za-z0-9+/]{8,64}={0,2}"
    }

    /// Generate a non-empty key set.
    pub fn arb_encrypted_keys() -> impl Strategy<Value = EncryptedKeys> {
        proptest::collection::hash_map(arb_key_name(), arb_ciphertext(), 1..6)
    }

    /// Generate a valid record.
    pub fn arb_key_record() -> impl Strategy<Value = KeyRecord> {
        (arb_record_id(), arb_encrypted_keys()).prop_map(|(id, keys)| {
            KeyRecord::new(id, keys).expect("generated key sets are valid")
        })
    }

    /// Generate a fault script for [`FlakyStore`].
    pub fn arb_fault_script(max_len: usize) -> impl Strategy<Value = Vec<Fault>> {
        proptest::collection::vec(
            prop_oneof![
                3 => Just(Fault::Pass),
                1 => Just(Fault::Before),
                1 => Just(Fault::After),
            ],
            0..max_len,
        )
    }

    /// One step of a caller workload.
    #[derive(Debug, Clone)]
    pub enum Op {
        Get(RecordId),
        Set(RecordId, EncryptedKeys),
        /// Let cache entries age by this many seconds.
        Wait(u64),
    }

    /// Generate one of three fixed tenant ids.
    pub fn arb_tenant_id() -> impl Strategy<Value = RecordId> {
        prop_oneof![Just("tenant-a"), Just("tenant-b"), Just("tenant-c")]
            .prop_map(|raw| RecordId::new(raw).expect("fixed ids are valid"))
    }

    /// Generate a workload over a small id space so operations collide.
    pub fn arb_workload(max_len: usize) -> impl Strategy<Value = Vec<Op>> {
        let op = prop_oneof![
            3 => arb_tenant_id().prop_map(Op::Get),
            2 => (arb_tenant_id(), arb_encrypted_keys()).prop_map(|(id, keys)| Op::Set(id, keys)),
            1 => (0u64..120).prop_map(Op::Wait),
        ];
        proptest::collection::vec(op, 1..max_len)
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Common test fixtures.

    use super::*;

    /// Build a key set from `(name, ciphertext)` pairs.
    pub fn keys(pairs: &[(&str, &str)]) -> EncryptedKeys {
        pairs
            .iter()
            .map(|(name, ciphertext)| (name.to_string(), ciphertext.to_string()))
            .collect()
    }

    /// Single-DEK key set.
    pub fn dek(ciphertext: &str) -> EncryptedKeys {
        keys(&[("dek", ciphertext)])
    }

    /// Parse a known-good id.
    pub fn record_id(raw: &str) -> RecordId {
        RecordId::new(raw).expect("fixture ids are valid")
    }

    /// Cache config with the janitor off and no backend deadline.
    pub fn cache_config(ttl: Duration) -> CacheConfig {
        CacheConfig::new()
            .with_ttl(ttl)
            .with_cleanup_interval(Duration::ZERO)
            .with_backend_timeout(None)
    }

    /// A caching store over a fresh in-memory backend.
    pub fn in_memory_store(
        ttl: Duration,
    ) -> (Arc<InMemoryDurableStore>, CachingKeyStore<InMemoryDurableStore>) {
        let durable = Arc::new(InMemoryDurableStore::new());
        let store = CachingKeyStore::new(Arc::clone(&durable), cache_config(ttl))
            .expect("fixture config is valid");
        (durable, store)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for key store results.

    use super::*;

    /// Assert that `result` is the create-once conflict for `id`.
    pub fn assert_already_exists<T: std::fmt::Debug>(result: &KeyStoreResult<T>, id: &str) {
        match result {
            Err(KeyStoreError::AlreadyExists { id: actual }) => assert_eq!(
                actual, id,
                "AlreadyExists carries the wrong id"
            ),
            other => panic!("expected AlreadyExists for {id}, got {other:?}"),
        }
    }

    /// Assert that `result` is a backend failure.
    pub fn assert_backend_error<T: std::fmt::Debug>(result: &KeyStoreResult<T>) {
        assert!(
            matches!(result, Err(KeyStoreError::Backend(_))),
            "expected a backend error, got {result:?}"
        );
    }
}
