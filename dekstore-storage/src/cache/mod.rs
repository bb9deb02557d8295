//! In-process cache layer.
//!
//! The cache is a derived, disposable view of the durable store: it may hold
//! any subset of existing records, but never a record the durable store did
//! not hold at the moment it was cached. It is never consulted to decide
//! whether a record may be created.
//!
//! [`TtlCache`] expires each entry a fixed time after insertion. The
//! optional [`Janitor`] sweeps expired entries in the background; without
//! it expiry is purely lazy.

pub mod janitor;
pub mod traits;
pub mod ttl;

pub use janitor::Janitor;
pub use traits::{CacheStats, KeyCache};
pub use ttl::TtlCache;
