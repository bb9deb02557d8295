//! Read-through, write-once key store.
//!
//! This module implements the core caching logic: reads consult the cache
//! before the durable store, writes go straight to the durable store's
//! conditional insert and only then populate the cache.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dekstore_core::{
    BackendError, CacheConfig, EncryptedKeys, KeyRecord, KeyStoreError, KeyStoreResult, RecordId,
};

use crate::cache::{CacheStats, Janitor, KeyCache, TtlCache};
use crate::durable::{DurableStore, InsertOutcome};

/// Caching key store over a durable backend.
///
/// # Guarantees
///
/// - Uniqueness is enforced by the durable store's atomic conditional
///   insert alone. The cache is never consulted on the write path.
/// - On success, both `get` and `set_conditionally` have updated the cache
///   before they return. On any failure the cache is left untouched.
/// - No lock is held across a backend call; concurrent writers for the same
///   id race at the durable store and exactly one wins.
///
/// # Type Parameters
///
/// - `D`: The durable store adapter
/// - `C`: The in-process cache, [`TtlCache`] unless injected
///
/// # Example
///
/// ```ignore
/// let store = CachingKeyStore::new(Arc::new(InMemoryDurableStore::new()), CacheConfig::default())?;
///
/// store.set_conditionally("tenant-42", keys).await?;
/// let keys = store.get("tenant-42").await?; // served from cache
/// ```
pub struct CachingKeyStore<D, C = TtlCache>
where
    D: DurableStore,
    C: KeyCache,
{
    /// The durable store adapter.
    durable: Arc<D>,
    /// The in-process cache.
    cache: Arc<C>,
    /// Store configuration.
    config: CacheConfig,
    /// Background sweep; stops when the last clone of the store is dropped.
    janitor: Option<Arc<Janitor>>,
}

impl<D> CachingKeyStore<D, TtlCache>
where
    D: DurableStore,
{
    /// Create a store with a fresh [`TtlCache`] built from `config`.
    ///
    /// Starts the cleanup janitor when `cache_cleanup_interval` is non-zero
    /// and a tokio runtime is available.
    pub fn new(durable: Arc<D>, config: CacheConfig) -> KeyStoreResult<Self> {
        let cache = Arc::new(TtlCache::new(config.cache_ttl));
        Self::with_cache(durable, cache, config)
    }

    /// Create a store with default configuration.
    pub fn with_defaults(durable: Arc<D>) -> KeyStoreResult<Self> {
        Self::new(durable, CacheConfig::default())
    }
}

impl<D, C> CachingKeyStore<D, C>
where
    D: DurableStore,
    C: KeyCache + 'static,
{
    /// Create a store around an injected cache.
    ///
    /// `config.cache_ttl` is not applied to an injected cache; it owns its
    /// own expiry policy.
    pub fn with_cache(durable: Arc<D>, cache: Arc<C>, config: CacheConfig) -> KeyStoreResult<Self> {
        config.validate()?;
        if !config.caching_enabled() {
            tracing::info!("key cache disabled, every read goes to the durable store");
        }
        let janitor = Janitor::spawn(&cache, config.cache_cleanup_interval).map(Arc::new);
        Ok(Self {
            durable,
            cache,
            config,
            janitor,
        })
    }

    /// Get the store configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get a reference to the cache.
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Whether a background janitor is sweeping the cache.
    pub fn has_janitor(&self) -> bool {
        self.janitor.is_some()
    }

    /// Get the encrypted data keys stored for `id`.
    ///
    /// Returns `Ok(None)` when no record exists; an unknown id is not an
    /// error. Uses the configured default backend deadline.
    pub async fn get(&self, id: &str) -> KeyStoreResult<Option<EncryptedKeys>> {
        self.get_within(id, self.config.backend_timeout).await
    }

    /// [`get`](Self::get) with an explicit deadline for the backend read.
    pub async fn get_with_timeout(
        &self,
        id: &str,
        timeout: Duration,
    ) -> KeyStoreResult<Option<EncryptedKeys>> {
        self.get_within(id, Some(timeout)).await
    }

    /// Store `keys` for `id` only if no record exists for `id` yet.
    ///
    /// Fails with [`KeyStoreError::AlreadyExists`] if one does, whatever
    /// its content. Uses the configured default backend deadline.
    pub async fn set_conditionally(&self, id: &str, keys: EncryptedKeys) -> KeyStoreResult<()> {
        self.set_within(id, keys, self.config.backend_timeout).await
    }

    /// [`set_conditionally`](Self::set_conditionally) with an explicit
    /// deadline for the backend write.
    ///
    /// If the deadline fires the write may still have been committed; a
    /// retry then reports `AlreadyExists`.
    pub async fn set_conditionally_with_timeout(
        &self,
        id: &str,
        keys: EncryptedKeys,
        timeout: Duration,
    ) -> KeyStoreResult<()> {
        self.set_within(id, keys, Some(timeout)).await
    }

    /// Get cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Sweep expired cache entries now. Returns how many were removed.
    pub fn purge_expired(&self) -> u64 {
        self.cache.purge_expired()
    }

    async fn get_within(
        &self,
        id: &str,
        deadline: Option<Duration>,
    ) -> KeyStoreResult<Option<EncryptedKeys>> {
        let id = RecordId::new(id)?;

        if let Some(keys) = self.cache.get(&id) {
            tracing::debug!(%id, "key cache hit");
            return Ok(Some(keys));
        }
        tracing::debug!(%id, "key cache miss, reading durable store");

        let document = with_deadline("get_consistent", deadline, self.durable.get_consistent(&id))
            .await
            .inspect_err(|e| tracing::warn!(%id, error = %e, "durable read failed"))?;

        let Some(document) = document else {
            return Ok(None);
        };

        let record = KeyRecord::from_document(&id, document)
            .inspect_err(|e| tracing::warn!(%id, error = %e, "stored record is malformed"))?;

        self.cache.insert(record.id, record.keys.clone());
        Ok(Some(record.keys))
    }

    async fn set_within(
        &self,
        id: &str,
        keys: EncryptedKeys,
        deadline: Option<Duration>,
    ) -> KeyStoreResult<()> {
        let record = KeyRecord::new(RecordId::new(id)?, keys)?;

        let outcome = with_deadline(
            "insert_if_absent",
            deadline,
            self.durable.insert_if_absent(&record),
        )
        .await
        .inspect_err(|e| tracing::warn!(id = %record.id, error = %e, "durable write failed"))?;

        match outcome {
            InsertOutcome::Inserted => {
                tracing::info!(id = %record.id, key_count = record.keys.len(), "key record created");
                self.cache.insert(record.id, record.keys);
                Ok(())
            }
            InsertOutcome::AlreadyExists => {
                tracing::debug!(id = %record.id, "key record already exists");
                Err(KeyStoreError::AlreadyExists {
                    id: record.id.into_inner(),
                })
            }
        }
    }
}

impl<D, C> Clone for CachingKeyStore<D, C>
where
    D: DurableStore,
    C: KeyCache,
{
    fn clone(&self) -> Self {
        Self {
            durable: Arc::clone(&self.durable),
            cache: Arc::clone(&self.cache),
            config: self.config.clone(),
            janitor: self.janitor.clone(),
        }
    }
}

/// Run a backend call under an optional deadline.
async fn with_deadline<T, F>(
    operation: &'static str,
    deadline: Option<Duration>,
    call: F,
) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    match deadline {
        Some(after) => tokio::time::timeout(after, call)
            .await
            .map_err(|_| BackendError::Timeout { operation, after })?,
        None => call.await,
    }
}
