//! Cache storage.
//!
//! TTL-bounded LRU maps for subscription read models plus the write-back
//! pending view counters. All entries are derived from the durable store
//! except the pending counters, which are the authoritative holding area for
//! deltas not yet flushed.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use lru::LruCache;
use metrics::gauge;
use uuid::Uuid;

use crate::domain::entities::{SubscriberEntry, SubscriptionEntry};

use super::config::CacheConfig;
use super::keys::CacheKey;
use super::lock::{mutex_lock, rw_write};

const SOURCE: &str = "cache::store";
const METRIC_PENDING_VIDEOS: &str = "flusso_views_pending_videos";

/// A cached value with an absolute expiry.
struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T: Clone> Expiring<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn live(&self) -> Option<T> {
        (Instant::now() < self.expires_at).then(|| self.value.clone())
    }
}

/// A pending view counter. Monotone between flushes; the TTL is stamped only
/// on the 0→1 transition so an abandoned counter eventually expires.
struct PendingViews {
    count: u64,
    expires_at: Instant,
}

/// In-process cache store.
///
/// LRU families evict under capacity pressure; expiry is enforced lazily on
/// read, and the worker drops entries eagerly through [`remove`].
///
/// [`remove`]: CacheStore::remove
pub struct CacheStore {
    flag_ttl: Duration,
    list_ttl: Duration,
    pending_views_ttl: Duration,

    pair_flags: RwLock<LruCache<(Uuid, Uuid), Expiring<bool>>>,
    subscriber_pages: RwLock<LruCache<(Uuid, u32, u32), Expiring<Vec<SubscriberEntry>>>>,
    subscription_pages: RwLock<LruCache<(Uuid, u32, u32), Expiring<Vec<SubscriptionEntry>>>>,
    latest_subscribers: RwLock<LruCache<Uuid, Expiring<Vec<SubscriberEntry>>>>,
    latest_subscriptions: RwLock<LruCache<Uuid, Expiring<Vec<SubscriptionEntry>>>>,

    pending_views: Mutex<HashMap<Uuid, PendingViews>>,
}

impl CacheStore {
    /// Create a new cache store with the given configuration.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            flag_ttl: config.flag_ttl(),
            list_ttl: config.list_ttl(),
            pending_views_ttl: config.pending_views_ttl(),
            pair_flags: RwLock::new(LruCache::new(config.pair_flag_limit_non_zero())),
            subscriber_pages: RwLock::new(LruCache::new(config.list_page_limit_non_zero())),
            subscription_pages: RwLock::new(LruCache::new(config.list_page_limit_non_zero())),
            latest_subscribers: RwLock::new(LruCache::new(config.latest_list_limit_non_zero())),
            latest_subscriptions: RwLock::new(LruCache::new(config.latest_list_limit_non_zero())),
            pending_views: Mutex::new(HashMap::new()),
        }
    }

    // ========================================================================
    // Pair subscription-state flags
    // ========================================================================

    pub fn get_pair_flag(&self, subscriber_id: Uuid, channel_id: Uuid) -> Option<bool> {
        let key = (subscriber_id, channel_id);
        let mut flags = rw_write(&self.pair_flags, SOURCE, "get_pair_flag");
        match flags.get(&key).and_then(Expiring::live) {
            Some(value) => Some(value),
            None => {
                flags.pop(&key);
                None
            }
        }
    }

    /// Write the pair flag with a fresh TTL.
    pub fn set_pair_flag(&self, subscriber_id: Uuid, channel_id: Uuid, subscribed: bool) {
        rw_write(&self.pair_flags, SOURCE, "set_pair_flag").put(
            (subscriber_id, channel_id),
            Expiring::new(subscribed, self.flag_ttl),
        );
    }

    // ========================================================================
    // Paginated list pages
    // ========================================================================

    pub fn get_subscriber_page(
        &self,
        channel_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Option<Vec<SubscriberEntry>> {
        let key = (channel_id, page, limit);
        let mut pages = rw_write(&self.subscriber_pages, SOURCE, "get_subscriber_page");
        match pages.get(&key).and_then(Expiring::live) {
            Some(value) => Some(value),
            None => {
                pages.pop(&key);
                None
            }
        }
    }

    pub fn set_subscriber_page(
        &self,
        channel_id: Uuid,
        page: u32,
        limit: u32,
        entries: Vec<SubscriberEntry>,
    ) {
        rw_write(&self.subscriber_pages, SOURCE, "set_subscriber_page").put(
            (channel_id, page, limit),
            Expiring::new(entries, self.list_ttl),
        );
    }

    pub fn get_subscription_page(
        &self,
        subscriber_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Option<Vec<SubscriptionEntry>> {
        let key = (subscriber_id, page, limit);
        let mut pages = rw_write(&self.subscription_pages, SOURCE, "get_subscription_page");
        match pages.get(&key).and_then(Expiring::live) {
            Some(value) => Some(value),
            None => {
                pages.pop(&key);
                None
            }
        }
    }

    pub fn set_subscription_page(
        &self,
        subscriber_id: Uuid,
        page: u32,
        limit: u32,
        entries: Vec<SubscriptionEntry>,
    ) {
        rw_write(&self.subscription_pages, SOURCE, "set_subscription_page").put(
            (subscriber_id, page, limit),
            Expiring::new(entries, self.list_ttl),
        );
    }

    // ========================================================================
    // Latest convenience lists
    // ========================================================================

    pub fn get_latest_subscribers(&self, channel_id: Uuid) -> Option<Vec<SubscriberEntry>> {
        let mut latest = rw_write(&self.latest_subscribers, SOURCE, "get_latest_subscribers");
        match latest.get(&channel_id).and_then(Expiring::live) {
            Some(value) => Some(value),
            None => {
                latest.pop(&channel_id);
                None
            }
        }
    }

    pub fn set_latest_subscribers(&self, channel_id: Uuid, entries: Vec<SubscriberEntry>) {
        rw_write(&self.latest_subscribers, SOURCE, "set_latest_subscribers")
            .put(channel_id, Expiring::new(entries, self.list_ttl));
    }

    pub fn get_latest_subscriptions(&self, subscriber_id: Uuid) -> Option<Vec<SubscriptionEntry>> {
        let mut latest = rw_write(
            &self.latest_subscriptions,
            SOURCE,
            "get_latest_subscriptions",
        );
        match latest.get(&subscriber_id).and_then(Expiring::live) {
            Some(value) => Some(value),
            None => {
                latest.pop(&subscriber_id);
                None
            }
        }
    }

    pub fn set_latest_subscriptions(&self, subscriber_id: Uuid, entries: Vec<SubscriptionEntry>) {
        rw_write(
            &self.latest_subscriptions,
            SOURCE,
            "set_latest_subscriptions",
        )
        .put(subscriber_id, Expiring::new(entries, self.list_ttl));
    }

    // ========================================================================
    // Eager invalidation
    // ========================================================================

    /// Drop a single cache entry, whatever family it belongs to.
    pub fn remove(&self, key: &CacheKey) {
        match key {
            CacheKey::PairFlag {
                subscriber_id,
                channel_id,
            } => {
                rw_write(&self.pair_flags, SOURCE, "remove.pair_flag")
                    .pop(&(*subscriber_id, *channel_id));
            }
            CacheKey::SubscriberPage {
                channel_id,
                page,
                limit,
            } => {
                rw_write(&self.subscriber_pages, SOURCE, "remove.subscriber_page")
                    .pop(&(*channel_id, *page, *limit));
            }
            CacheKey::SubscriptionPage {
                subscriber_id,
                page,
                limit,
            } => {
                rw_write(&self.subscription_pages, SOURCE, "remove.subscription_page")
                    .pop(&(*subscriber_id, *page, *limit));
            }
            CacheKey::LatestSubscribers(channel_id) => {
                rw_write(&self.latest_subscribers, SOURCE, "remove.latest_subscribers")
                    .pop(channel_id);
            }
            CacheKey::LatestSubscriptions(subscriber_id) => {
                rw_write(
                    &self.latest_subscriptions,
                    SOURCE,
                    "remove.latest_subscriptions",
                )
                .pop(subscriber_id);
            }
            CacheKey::PendingViews(video_id) => {
                mutex_lock(&self.pending_views, SOURCE, "remove.pending_views").remove(video_id);
            }
        }
    }

    // ========================================================================
    // Pending view counters
    // ========================================================================

    /// Record one view event. Returns the counter value after the increment.
    ///
    /// The TTL is stamped only when the counter is created (0→1); later
    /// increments do not extend it, matching the write-back contract that the
    /// flush job, not the TTL, is the normal drain path.
    pub fn record_view(&self, video_id: Uuid) -> u64 {
        let mut pending = mutex_lock(&self.pending_views, SOURCE, "record_view");
        let now = Instant::now();
        let counter = pending.entry(video_id).or_insert_with(|| PendingViews {
            count: 0,
            expires_at: now + self.pending_views_ttl,
        });
        if counter.expires_at <= now {
            // Expired cold counter; restart it with a fresh TTL.
            counter.count = 0;
            counter.expires_at = now + self.pending_views_ttl;
        }
        counter.count += 1;
        let count = counter.count;
        gauge!(METRIC_PENDING_VIDEOS).set(pending.len() as f64);
        count
    }

    /// Live pending delta for a video; zero when absent or expired.
    pub fn pending_views(&self, video_id: Uuid) -> u64 {
        let pending = mutex_lock(&self.pending_views, SOURCE, "pending_views");
        pending
            .get(&video_id)
            .filter(|counter| counter.expires_at > Instant::now())
            .map(|counter| counter.count)
            .unwrap_or(0)
    }

    /// Atomically take every positive pending counter for flushing.
    ///
    /// Counters are removed as they are read, so increments racing the flush
    /// accrue to a fresh counter instead of being dropped with the old one.
    /// Expired counters are discarded without being returned.
    pub fn take_pending_views(&self) -> Vec<(Uuid, u64)> {
        let mut pending = mutex_lock(&self.pending_views, SOURCE, "take_pending_views");
        let now = Instant::now();
        let taken: Vec<(Uuid, u64)> = std::mem::take(&mut *pending)
            .into_iter()
            .filter(|(_, counter)| counter.expires_at > now && counter.count > 0)
            .map(|(video_id, counter)| (video_id, counter.count))
            .collect();
        gauge!(METRIC_PENDING_VIDEOS).set(pending.len() as f64);
        taken
    }

    /// Return a delta to the counter after a failed flush commit, so the next
    /// pass retries it. Merges with any increments that arrived meanwhile.
    pub fn restore_pending_views(&self, video_id: Uuid, delta: u64) {
        let mut pending = mutex_lock(&self.pending_views, SOURCE, "restore_pending_views");
        let now = Instant::now();
        let counter = pending.entry(video_id).or_insert_with(|| PendingViews {
            count: 0,
            expires_at: now + self.pending_views_ttl,
        });
        counter.count += delta;
        gauge!(METRIC_PENDING_VIDEOS).set(pending.len() as f64);
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use time::OffsetDateTime;

    use super::*;

    fn sample_subscriber(username: &str) -> SubscriberEntry {
        SubscriberEntry {
            subscriber_id: Uuid::new_v4(),
            username: username.to_string(),
            subscribed_at: OffsetDateTime::now_utc(),
        }
    }

    fn short_ttl_config() -> CacheConfig {
        CacheConfig {
            flag_ttl_seconds: 0,
            list_ttl_seconds: 0,
            ..Default::default()
        }
    }

    #[test]
    fn pair_flag_roundtrip() {
        let store = CacheStore::new(&CacheConfig::default());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert!(store.get_pair_flag(a, b).is_none());

        store.set_pair_flag(a, b, true);
        assert_eq!(store.get_pair_flag(a, b), Some(true));

        store.remove(&CacheKey::PairFlag {
            subscriber_id: a,
            channel_id: b,
        });
        assert!(store.get_pair_flag(a, b).is_none());
    }

    #[test]
    fn expired_entries_read_as_absent() {
        let store = CacheStore::new(&short_ttl_config());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        store.set_pair_flag(a, b, true);
        store.set_latest_subscribers(b, vec![sample_subscriber("ada")]);

        // Zero TTL: expired as soon as written.
        assert!(store.get_pair_flag(a, b).is_none());
        assert!(store.get_latest_subscribers(b).is_none());
    }

    #[test]
    fn subscriber_page_roundtrip() {
        let store = CacheStore::new(&CacheConfig::default());
        let channel = Uuid::new_v4();

        assert!(store.get_subscriber_page(channel, 1, 20).is_none());

        store.set_subscriber_page(channel, 1, 20, vec![sample_subscriber("ada")]);
        let cached = store.get_subscriber_page(channel, 1, 20).expect("cached page");
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].username, "ada");

        // Different page key is a different entry.
        assert!(store.get_subscriber_page(channel, 2, 20).is_none());
    }

    #[test]
    fn lru_eviction_under_capacity_pressure() {
        let config = CacheConfig {
            pair_flag_limit: 2,
            ..Default::default()
        };
        let store = CacheStore::new(&config);
        let channel = Uuid::new_v4();

        let s1 = Uuid::new_v4();
        let s2 = Uuid::new_v4();
        let s3 = Uuid::new_v4();

        store.set_pair_flag(s1, channel, true);
        store.set_pair_flag(s2, channel, true);
        store.set_pair_flag(s3, channel, true);

        assert!(store.get_pair_flag(s1, channel).is_none()); // Evicted
        assert_eq!(store.get_pair_flag(s2, channel), Some(true));
        assert_eq!(store.get_pair_flag(s3, channel), Some(true));
    }

    #[test]
    fn pending_views_accumulate_and_drain() {
        let store = CacheStore::new(&CacheConfig::default());
        let video = Uuid::new_v4();

        assert_eq!(store.pending_views(video), 0);

        for _ in 0..5 {
            store.record_view(video);
        }
        assert_eq!(store.pending_views(video), 5);

        let taken = store.take_pending_views();
        assert_eq!(taken, vec![(video, 5)]);

        // Drained: counter is gone.
        assert_eq!(store.pending_views(video), 0);
        assert!(store.take_pending_views().is_empty());
    }

    #[test]
    fn increments_after_take_go_to_a_fresh_counter() {
        let store = CacheStore::new(&CacheConfig::default());
        let video = Uuid::new_v4();

        store.record_view(video);
        store.record_view(video);

        let taken = store.take_pending_views();
        assert_eq!(taken, vec![(video, 2)]);

        store.record_view(video);
        assert_eq!(store.pending_views(video), 1);
    }

    #[test]
    fn restore_merges_with_new_increments() {
        let store = CacheStore::new(&CacheConfig::default());
        let video = Uuid::new_v4();

        store.record_view(video);
        store.record_view(video);
        store.record_view(video);

        let taken = store.take_pending_views();
        assert_eq!(taken, vec![(video, 3)]);

        // A view arrives while the flush is in flight, then the commit fails.
        store.record_view(video);
        store.restore_pending_views(video, 3);

        assert_eq!(store.pending_views(video), 4);
    }

    #[test]
    fn store_recovers_from_poisoned_lock() {
        let store = CacheStore::new(&CacheConfig::default());
        let video = Uuid::new_v4();

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store
                .pending_views
                .lock()
                .expect("pending_views lock should be acquired");
            panic!("poison pending_views lock");
        }));

        store.record_view(video);
        assert_eq!(store.pending_views(video), 1);
    }
}
