//! Cache backend trait and usage statistics.
//!
//! This module defines the trait the caching key store uses to talk to its
//! in-process cache, so tests can inject their own instance.

use dekstore_core::{EncryptedKeys, RecordId};

/// In-process cache of key sets by record id.
///
/// Implementations must be safe for concurrent use without caller-side
/// locking and must never block on I/O. Expiry is a fixed countdown from
/// insertion: reading an entry does not extend its lifetime.
pub trait KeyCache: Send + Sync {
    /// Get the keys cached for `id`, if present and unexpired.
    fn get(&self, id: &RecordId) -> Option<EncryptedKeys>;

    /// Cache `keys` under `id` with the cache's default time-to-live.
    ///
    /// Replaces any existing entry and restarts its countdown.
    fn insert(&self, id: RecordId, keys: EncryptedKeys);

    /// Remove every expired entry. Returns how many were removed.
    fn purge_expired(&self) -> u64;

    /// Get cache statistics.
    fn stats(&self) -> CacheStats;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses, expired entries included.
    pub misses: u64,
    /// Number of entries currently held, expired-but-unswept included.
    pub entry_count: u64,
    /// Number of entries dropped because they expired.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }
}
