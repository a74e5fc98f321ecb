//! Short-lived cache for list queries

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

pub struct ListCache<T: Clone> {
    ttl: Duration,
    entry: Mutex<Option<(Instant, T)>>,
}

impl<T: Clone> ListCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: Mutex::new(None),
        }
    }

    /// Cached value if it is younger than the TTL
    pub fn get(&self) -> Option<T> {
        let entry = self.entry.lock();
        match entry.as_ref() {
            Some((stored, value)) if stored.elapsed() < self.ttl => Some(value.clone()),
            _ => None,
        }
    }

    pub fn put(&self, value: T) {
        *self.entry.lock() = Some((Instant::now(), value));
    }

    pub fn invalidate(&self) {
        if self.entry.lock().take().is_some() {
            tracing::debug!("List cache invalidated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = ListCache::new(Duration::from_secs(5));
        assert_eq!(cache.get(), None);

        cache.put(vec![1, 2]);
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(cache.get(), Some(vec![1, 2]));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(cache.get(), None);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let cache = ListCache::new(Duration::from_secs(60));
        cache.put("list");
        cache.invalidate();
        assert_eq!(cache.get(), None);
    }
}
