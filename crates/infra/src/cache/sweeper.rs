use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;

use super::TtlCache;

/// Handle to a background sweeper task. Dropping it stops the task.
#[derive(Debug)]
pub struct SweeperHandle {
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for the task to finish.
    pub async fn shutdown(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Periodically purge expired entries from `cache`.
///
/// The task holds only a weak reference and exits on its own once the cache
/// is dropped. Must be called from within a tokio runtime.
pub fn spawn_sweeper<K, V>(cache: &Arc<TtlCache<K, V>>, every: Duration) -> SweeperHandle
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    let weak: Weak<TtlCache<K, V>> = Arc::downgrade(cache);
    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            interval.tick().await;
            let Some(cache) = weak.upgrade() else {
                tracing::debug!("cache dropped; sweeper exiting");
                break;
            };
            let purged = cache.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, remaining = cache.len(), "purged expired cache entries");
            }
        }
    });

    SweeperHandle { task: Some(task) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sweeper_purges_expired_entries() {
        let cache = Arc::new(TtlCache::new());
        cache.insert("short", 1, Duration::from_millis(10));
        cache.insert("long", 2, Duration::from_secs(60));

        let handle = spawn_sweeper(&cache, Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(120)).await;

        // Purged without any read touching the key.
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"long"), Some(2));
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn sweeper_exits_when_cache_dropped() {
        let cache: Arc<TtlCache<u8, u8>> = Arc::new(TtlCache::new());
        let handle = spawn_sweeper(&cache, Duration::from_millis(10));
        drop(cache);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished());
    }
}
