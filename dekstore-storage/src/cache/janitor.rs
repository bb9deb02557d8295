//! Background sweep of expired cache entries.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::traits::KeyCache;

/// Handle to a periodic purge task.
///
/// The task holds only a weak reference to the cache: it exits on its own
/// once the cache is dropped. Dropping the handle aborts it immediately.
#[derive(Debug)]
pub struct Janitor {
    handle: JoinHandle<()>,
    interval: Duration,
}

impl Janitor {
    /// Start sweeping `cache` every `interval` on the current tokio runtime.
    ///
    /// Returns `None` when `interval` is zero or when called outside a
    /// runtime; expiry then stays lazy, which is still correct.
    pub fn spawn<C>(cache: &Arc<C>, interval: Duration) -> Option<Self>
    where
        C: KeyCache + 'static,
    {
        if interval.is_zero() {
            return None;
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                tracing::warn!(
                    ?interval,
                    "no tokio runtime available, cache janitor not started"
                );
                return None;
            }
        };

        let weak = Arc::downgrade(cache);
        let handle = runtime.spawn(sweep(weak, interval));
        tracing::debug!(?interval, "cache janitor started");
        Some(Self { handle, interval })
    }

    /// Sweep period.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the sweep task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Janitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn sweep<C>(cache: Weak<C>, interval: Duration)
where
    C: KeyCache + 'static,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(cache) = cache.upgrade() else {
            tracing::debug!("cache dropped, janitor exiting");
            return;
        };
        let purged = cache.purge_expired();
        if purged > 0 {
            tracing::debug!(purged, "purged expired cache entries");
        }
    }
}
