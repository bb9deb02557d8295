//! DEKSTORE Storage - Durable Store Trait, Cache and Caching Key Store
//!
//! Defines the durable store abstraction, an in-memory adapter, the
//! time-expiring cache and the read-through / write-once key store built on
//! them. The PostgreSQL adapter lives in dekstore-postgres.

pub mod cache;
pub mod caching_store;
pub mod durable;

pub use cache::{CacheStats, Janitor, KeyCache, TtlCache};
pub use caching_store::CachingKeyStore;
pub use durable::{DurableStore, InMemoryDurableStore, InsertOutcome};
