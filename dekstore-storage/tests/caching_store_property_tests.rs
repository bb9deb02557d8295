//! Property tests for the caching key store.

use std::sync::Arc;
use std::time::Duration;

use dekstore_storage::{CachingKeyStore, DurableStore, InMemoryDurableStore, KeyCache};
use dekstore_test_utils::assertions::*;
use dekstore_test_utils::fixtures::*;
use dekstore_test_utils::generators::*;
use dekstore_test_utils::{
    EncryptedKeys, FlakyStore, KeyRecord, KeyStoreError, KeyStoreResult, RecordId,
};
use proptest::prelude::*;

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .expect("runtime builds")
}

/// Observable result of one workload step.
#[derive(Debug, PartialEq)]
enum Observed {
    Got(Option<EncryptedKeys>),
    Set(KeyStoreResult<()>),
    Waited,
}

async fn run_workload<D>(store: &CachingKeyStore<D>, workload: &[Op]) -> Vec<Observed>
where
    D: DurableStore,
{
    let mut observed = Vec::with_capacity(workload.len());
    for op in workload {
        let step = match op {
            Op::Get(id) => {
                let keys = store.get(id.as_str()).await.expect("in-memory reads succeed");
                Observed::Got(keys)
            }
            Op::Set(id, keys) => {
                Observed::Set(store.set_conditionally(id.as_str(), keys.clone()).await)
            }
            Op::Wait(secs) => {
                tokio::time::advance(Duration::from_secs(*secs)).await;
                Observed::Waited
            }
        };
        observed.push(step);
    }
    observed
}

/// Every cached entry must match what the durable store holds.
async fn assert_cache_backed_by_durable(
    cache: &impl KeyCache,
    durable: &InMemoryDurableStore,
    ids: &[RecordId],
) {
    for id in ids {
        if let Some(cached) = cache.get(id) {
            let document = durable
                .get_consistent(id)
                .await
                .expect("in-memory reads succeed")
                .expect("cached id must exist durably");
            let stored = KeyRecord::from_document(id, document).expect("stored record decodes");
            assert_eq!(cached, stored.keys, "cache diverged from durable store for {id}");
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// An id nobody has set reads as absent, not as an error.
    #[test]
    fn prop_unset_id_is_absent(id in arb_record_id()) {
        let rt = paused_runtime();
        rt.block_on(async {
            let (_durable, store) = in_memory_store(Duration::from_secs(60));
            prop_assert_eq!(store.get(id.as_str()).await.unwrap(), None);
            Ok(())
        })?;
    }

    /// Read-your-write, then create-once: the second value never lands.
    #[test]
    fn prop_first_write_wins(
        id in arb_record_id(),
        first in arb_encrypted_keys(),
        second in arb_encrypted_keys(),
    ) {
        let rt = paused_runtime();
        rt.block_on(async {
            let (_durable, store) = in_memory_store(Duration::from_secs(60));

            store.set_conditionally(id.as_str(), first.clone()).await.unwrap();
            prop_assert_eq!(store.get(id.as_str()).await.unwrap(), Some(first.clone()));

            let result = store.set_conditionally(id.as_str(), second).await;
            assert_already_exists(&result, id.as_str());
            prop_assert_eq!(store.get(id.as_str()).await.unwrap(), Some(first));
            Ok(())
        })?;
    }

    /// Disabling the cache changes call counts, never results.
    #[test]
    fn prop_cache_is_transparent(workload in arb_workload(40)) {
        let rt = paused_runtime();
        rt.block_on(async {
            let (cached_durable, cached) = in_memory_store(Duration::from_secs(60));
            let (uncached_durable, uncached) = in_memory_store(Duration::ZERO);

            let with_cache = run_workload(&cached, &workload).await;
            let without_cache = run_workload(&uncached, &workload).await;

            prop_assert_eq!(with_cache, without_cache);
            prop_assert!(cached_durable.get_calls() <= uncached_durable.get_calls());
            prop_assert_eq!(cached_durable.insert_calls(), uncached_durable.insert_calls());
            Ok(())
        })?;
    }

    /// After the TTL elapses the next read goes back to the durable store.
    #[test]
    fn prop_entry_expires_after_ttl(
        record in arb_key_record(),
        ttl_secs in 2u64..600,
    ) {
        let rt = paused_runtime();
        rt.block_on(async {
            let (durable, store) = in_memory_store(Duration::from_secs(ttl_secs));
            let id = record.id.as_str();
            store.set_conditionally(id, record.keys.clone()).await.unwrap();

            tokio::time::advance(Duration::from_secs(ttl_secs - 1)).await;
            prop_assert_eq!(store.get(id).await.unwrap(), Some(record.keys.clone()));
            prop_assert_eq!(durable.get_calls(), 0);

            tokio::time::advance(Duration::from_secs(2)).await;
            prop_assert_eq!(store.get(id).await.unwrap(), Some(record.keys.clone()));
            prop_assert_eq!(durable.get_calls(), 1);
            Ok(())
        })?;
    }

    /// Backend failures surface to the caller and never leave the cache
    /// holding data the durable store does not hold.
    #[test]
    fn prop_failures_never_poison_cache(
        workload in arb_workload(30),
        script in arb_fault_script(30),
    ) {
        let rt = paused_runtime();
        rt.block_on(async {
            let durable = Arc::new(FlakyStore::new(InMemoryDurableStore::new(), script));
            let store = CachingKeyStore::new(Arc::clone(&durable), cache_config(Duration::from_secs(60)))
                .unwrap();
            let ids: Vec<RecordId> = ["tenant-a", "tenant-b", "tenant-c"]
                .into_iter()
                .map(record_id)
                .collect();

            let mut failures = 0u64;
            for op in &workload {
                match op {
                    Op::Get(id) => {
                        if let Err(e) = store.get(id.as_str()).await {
                            prop_assert!(matches!(e, KeyStoreError::Backend(_)));
                            failures += 1;
                        }
                    }
                    Op::Set(id, keys) => match store.set_conditionally(id.as_str(), keys.clone()).await {
                        Ok(()) | Err(KeyStoreError::AlreadyExists { .. }) => {}
                        Err(e) => {
                            prop_assert!(e.is_retryable());
                            failures += 1;
                        }
                    },
                    Op::Wait(secs) => tokio::time::advance(Duration::from_secs(*secs)).await,
                }
                assert_cache_backed_by_durable(store.cache(), durable.inner(), &ids).await;
            }

            prop_assert_eq!(failures, durable.injected());
            Ok(())
        })?;
    }

    /// N racing writers for one id: one success, N-1 conflicts.
    #[test]
    fn prop_concurrent_writers_single_winner(
        id in arb_record_id(),
        writers in 2usize..12,
    ) {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .expect("runtime builds");
        rt.block_on(async {
            let (_durable, store) = in_memory_store(Duration::from_secs(60));

            let handles: Vec<_> = (0..writers)
                .map(|i| {
                    let store = store.clone();
                    let id = id.clone();
                    tokio::spawn(async move {
                        let keys = dek(&format!("ciphertext-{i}"));
                        let result = store.set_conditionally(id.as_str(), keys.clone()).await;
                        (result, keys)
                    })
                })
                .collect();

            let mut committed = Vec::new();
            for handle in handles {
                let (result, keys) = handle.await.unwrap();
                match result {
                    Ok(()) => committed.push(keys),
                    other => assert_already_exists(&other, id.as_str()),
                }
            }

            prop_assert_eq!(committed.len(), 1);
            prop_assert_eq!(store.get(id.as_str()).await.unwrap(), committed.pop());
            Ok(())
        })?;
    }
}

#[test]
fn test_backend_errors_are_reported_as_backend() {
    let rt = paused_runtime();
    rt.block_on(async {
        let durable = Arc::new(InMemoryDurableStore::new());
        durable.inject_failure(dekstore_test_utils::BackendError::LockPoisoned);
        let store = CachingKeyStore::new(durable, cache_config(Duration::from_secs(60))).unwrap();

        assert_backend_error(&store.get("tenant-42").await);
    });
}
