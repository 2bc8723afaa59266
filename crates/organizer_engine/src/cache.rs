use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use organizer_core::Category;
use organizer_logging::{organizer_debug, organizer_info};
use tokio::task::JoinHandle;

use crate::store::StateStore;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Every entry is dropped once per interval; there is no per-entry expiry.
    pub clear_interval: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            clear_interval: DAY,
        }
    }
}

/// URL-keyed category cache backed by the shared [`StateStore`].
#[derive(Clone)]
pub struct CategoryCache {
    store: Arc<StateStore>,
}

impl CategoryCache {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self { store }
    }

    pub fn get(&self, url: &str) -> Option<Category> {
        let cached = self.store.cached_category(url);
        if let Some(category) = &cached {
            organizer_debug!("Cache hit for {}: {}", url, category);
        }
        cached
    }

    pub fn put(&self, url: &str, category: Category) {
        organizer_debug!("Caching category for {}: {}", url, category);
        self.store.cache_category(url, category);
    }

    pub fn clear(&self) {
        self.clear_at(Utc::now());
    }

    pub fn clear_at(&self, now: DateTime<Utc>) {
        organizer_info!(
            "Clearing URL category cache ({} entries)",
            self.store.cached_url_count()
        );
        self.store.clear_cache(now);
    }

    pub fn len(&self) -> usize {
        self.store.cached_url_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Time left before the next wholesale clear is due. Zero when overdue.
    ///
    /// A cache that was never cleared starts its clock at `now`.
    pub fn time_until_clear(&self, now: DateTime<Utc>, interval: Duration) -> Duration {
        self.store.start_cache_clock(now);
        let Some(cleared_at) = self.store.cache_cleared_at() else {
            return interval;
        };
        // Clock skew backwards counts as no time elapsed.
        let elapsed = (now - cleared_at).to_std().unwrap_or(Duration::ZERO);
        interval.saturating_sub(elapsed)
    }
}

/// Clears the cache on a fixed interval, resuming the schedule recorded in
/// the store so a restart does not extend an entry's lifetime.
pub fn spawn_cache_cleaner(cache: CategoryCache, settings: CacheSettings) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = settings.clear_interval.max(Duration::from_millis(1));
        loop {
            let wait = cache.time_until_clear(Utc::now(), interval);
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
            cache.clear();
        }
    })
}
