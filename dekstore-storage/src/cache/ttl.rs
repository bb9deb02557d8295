//! Time-expiring in-memory cache.
//!
//! Entries live in a sharded concurrent map and carry a fixed deadline set at
//! insertion. Expired entries are ignored on read and removed either lazily
//! (on the read that finds them) or by [`TtlCache::purge_expired`], which
//! the janitor calls periodically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dekstore_core::{EncryptedKeys, RecordId};
use tokio::time::Instant;

use super::traits::{CacheStats, KeyCache};

#[derive(Debug, Clone)]
struct CacheEntry {
    keys: EncryptedKeys,
    /// `None` when the deadline overflowed the clock; such entries never expire.
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| now < deadline)
    }
}

/// Cache with a single default time-to-live for every entry.
///
/// Reads use `tokio::time::Instant`, so a paused test clock drives expiry
/// deterministically. A zero TTL turns the cache into a no-op: nothing is
/// stored and every lookup misses.
#[derive(Debug)]
pub struct TtlCache {
    entries: DashMap<RecordId, CacheEntry>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl TtlCache {
    /// Create an empty cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Entries currently held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyCache for TtlCache {
    fn get(&self, id: &RecordId) -> Option<EncryptedKeys> {
        let now = Instant::now();

        // The shard guard must be released before `remove_if` below.
        let lookup = self
            .entries
            .get(id)
            .map(|entry| entry.is_live(now).then(|| entry.keys.clone()));

        match lookup {
            Some(Some(keys)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(keys)
            }
            Some(None) => {
                if self
                    .entries
                    .remove_if(id, |_, entry| !entry.is_live(now))
                    .is_some()
                {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn insert(&self, id: RecordId, keys: EncryptedKeys) {
        if self.ttl.is_zero() {
            return;
        }
        let entry = CacheEntry {
            keys,
            expires_at: Instant::now().checked_add(self.ttl),
        };
        self.entries.insert(id, entry);
    }

    fn purge_expired(&self) -> u64 {
        let now = Instant::now();
        let mut removed = 0u64;
        self.entries.retain(|_, entry| {
            let live = entry.is_live(now);
            if !live {
                removed += 1;
            }
            live
        });
        self.evictions.fetch_add(removed, Ordering::Relaxed);
        removed
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.entries.len() as u64,
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
