//! Subscription toggle producer and cached read paths.
//!
//! The toggle endpoint never mutates the edge itself. It validates the
//! request, computes the inverse of the edge's current state, and publishes
//! a durable message for the worker; the HTTP response is the optimistic
//! post-apply state. Reads go through the cache with the registry tracking
//! every entry written, so the worker can invalidate them later.

use std::sync::Arc;

use metrics::counter;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    application::{
        error::AppError,
        jobs::{SubscriptionTogglePayload, enqueue_subscription_toggle_job},
        repos::{ChannelsRepo, JobsRepo, PageRequest, SubscriptionsRepo},
    },
    cache::{CacheConfig, CacheKey, CacheRegistry, CacheStore},
    domain::entities::{SubscriberEntry, SubscriptionEntry},
    domain::types::SubscriptionAction,
};

const METRIC_PUBLISHED: &str = "flusso_toggle_published_total";

/// Optimistic result of a toggle request: the state the edge will have once
/// the queued message is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub subscribed: bool,
}

pub struct SubscriptionService {
    channels: Arc<dyn ChannelsRepo>,
    subscriptions: Arc<dyn SubscriptionsRepo>,
    jobs: Arc<dyn JobsRepo>,
    cache: Arc<CacheStore>,
    registry: Arc<CacheRegistry>,
    cache_config: CacheConfig,
    toggle_max_attempts: i32,
}

impl SubscriptionService {
    pub fn new(
        channels: Arc<dyn ChannelsRepo>,
        subscriptions: Arc<dyn SubscriptionsRepo>,
        jobs: Arc<dyn JobsRepo>,
        cache: Arc<CacheStore>,
        registry: Arc<CacheRegistry>,
        cache_config: CacheConfig,
        toggle_max_attempts: i32,
    ) -> Self {
        Self {
            channels,
            subscriptions,
            jobs,
            cache,
            registry,
            cache_config,
            toggle_max_attempts,
        }
    }

    /// Publish a toggle for the `(subscriber, target)` pair.
    ///
    /// Self-subscriptions are rejected here, before anything reaches the
    /// queue. The edge state is read from the store, not the cache, so the
    /// computed action is the inverse of what is actually persisted.
    pub async fn toggle(
        &self,
        subscriber_id: Uuid,
        target_id: Uuid,
    ) -> Result<ToggleOutcome, AppError> {
        if subscriber_id == target_id {
            return Err(AppError::validation("cannot subscribe to yourself"));
        }

        let Some(channel) = self.channels.find_channel(target_id).await? else {
            return Err(AppError::NotFound);
        };

        let subscribed = self
            .subscriptions
            .edge_exists(subscriber_id, target_id)
            .await?;
        let action = if subscribed {
            SubscriptionAction::Unsubscribe
        } else {
            SubscriptionAction::Subscribe
        };

        let payload = SubscriptionTogglePayload {
            action,
            user_id: target_id,
            subscriber_id,
            username: channel.username,
            timestamp: OffsetDateTime::now_utc(),
        };

        let job_id =
            enqueue_subscription_toggle_job(&*self.jobs, &payload, self.toggle_max_attempts)
                .await?;
        counter!(METRIC_PUBLISHED).increment(1);

        info!(
            target = "application::subscriptions",
            subscriber_id = %subscriber_id,
            channel_id = %target_id,
            action = action.as_str(),
            job_id,
            "subscription toggle published"
        );

        Ok(ToggleOutcome {
            subscribed: !subscribed,
        })
    }

    /// Whether the pair is subscribed, served from the cache when possible.
    pub async fn subscription_state(
        &self,
        subscriber_id: Uuid,
        channel_id: Uuid,
    ) -> Result<bool, AppError> {
        if let Some(subscribed) = self.cache.get_pair_flag(subscriber_id, channel_id) {
            return Ok(subscribed);
        }

        let subscribed = self
            .subscriptions
            .edge_exists(subscriber_id, channel_id)
            .await?;
        self.cache
            .set_pair_flag(subscriber_id, channel_id, subscribed);
        self.registry.register(CacheKey::PairFlag {
            subscriber_id,
            channel_id,
        });

        Ok(subscribed)
    }

    /// One page of a channel's subscribers, cached per `(page, limit)`.
    pub async fn subscribers_page(
        &self,
        channel_id: Uuid,
        page: PageRequest,
    ) -> Result<Vec<SubscriberEntry>, AppError> {
        if let Some(entries) = self
            .cache
            .get_subscriber_page(channel_id, page.page, page.limit)
        {
            debug!(
                target = "application::subscriptions",
                channel_id = %channel_id,
                page = page.page,
                "subscriber page served from cache"
            );
            return Ok(entries);
        }

        let entries = self.subscriptions.list_subscribers(channel_id, page).await?;
        self.cache
            .set_subscriber_page(channel_id, page.page, page.limit, entries.clone());
        self.registry.register(CacheKey::SubscriberPage {
            channel_id,
            page: page.page,
            limit: page.limit,
        });

        Ok(entries)
    }

    /// One page of a subscriber's subscriptions, cached per `(page, limit)`.
    pub async fn subscriptions_page(
        &self,
        subscriber_id: Uuid,
        page: PageRequest,
    ) -> Result<Vec<SubscriptionEntry>, AppError> {
        if let Some(entries) = self
            .cache
            .get_subscription_page(subscriber_id, page.page, page.limit)
        {
            return Ok(entries);
        }

        let entries = self
            .subscriptions
            .list_subscriptions(subscriber_id, page)
            .await?;
        self.cache
            .set_subscription_page(subscriber_id, page.page, page.limit, entries.clone());
        self.registry.register(CacheKey::SubscriptionPage {
            subscriber_id,
            page: page.page,
            limit: page.limit,
        });

        Ok(entries)
    }

    /// The most recent subscribers of a channel, cached as a single entry.
    pub async fn latest_subscribers(
        &self,
        channel_id: Uuid,
    ) -> Result<Vec<SubscriberEntry>, AppError> {
        if let Some(entries) = self.cache.get_latest_subscribers(channel_id) {
            return Ok(entries);
        }

        let entries = self
            .subscriptions
            .latest_subscribers(channel_id, self.cache_config.latest_list_size)
            .await?;
        self.cache
            .set_latest_subscribers(channel_id, entries.clone());
        self.registry
            .register(CacheKey::LatestSubscribers(channel_id));

        Ok(entries)
    }

    /// The subscriber's most recent subscriptions, cached as a single entry.
    pub async fn latest_subscriptions(
        &self,
        subscriber_id: Uuid,
    ) -> Result<Vec<SubscriptionEntry>, AppError> {
        if let Some(entries) = self.cache.get_latest_subscriptions(subscriber_id) {
            return Ok(entries);
        }

        let entries = self
            .subscriptions
            .latest_subscriptions(subscriber_id, self.cache_config.latest_list_size)
            .await?;
        self.cache
            .set_latest_subscriptions(subscriber_id, entries.clone());
        self.registry
            .register(CacheKey::LatestSubscriptions(subscriber_id));

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use crate::application::testing::{MemoryChannels, MemoryJobs, MemorySubscriptions};
    use crate::domain::types::JobType;

    use super::*;

    struct Harness {
        service: SubscriptionService,
        subscriptions: Arc<MemorySubscriptions>,
        jobs: Arc<MemoryJobs>,
    }

    fn harness(channels: MemoryChannels) -> Harness {
        let subscriptions = Arc::new(MemorySubscriptions::default());
        let jobs = Arc::new(MemoryJobs::default());
        let config = CacheConfig::default();
        let service = SubscriptionService::new(
            Arc::new(channels),
            Arc::clone(&subscriptions) as Arc<dyn SubscriptionsRepo>,
            Arc::clone(&jobs) as Arc<dyn JobsRepo>,
            Arc::new(CacheStore::new(&config)),
            Arc::new(CacheRegistry::new()),
            config,
            10,
        );
        Harness {
            service,
            subscriptions,
            jobs,
        }
    }

    #[tokio::test]
    async fn self_toggle_is_rejected_without_publishing() {
        let id = Uuid::new_v4();
        let h = harness(MemoryChannels::default().with_channel(id, "ada"));

        let err = h.service.toggle(id, id).await.expect_err("self toggle");
        assert!(matches!(err, AppError::Validation(_)));
        assert!(h.jobs.published().is_empty());
    }

    #[tokio::test]
    async fn unknown_target_is_not_found() {
        let h = harness(MemoryChannels::default());

        let err = h
            .service
            .toggle(Uuid::new_v4(), Uuid::new_v4())
            .await
            .expect_err("missing channel");
        assert!(matches!(err, AppError::NotFound));
        assert!(h.jobs.published().is_empty());
    }

    #[tokio::test]
    async fn toggle_publishes_the_inverse_action() {
        let channel = Uuid::new_v4();
        let subscriber = Uuid::new_v4();
        let h = harness(MemoryChannels::default().with_channel(channel, "ada"));

        let outcome = h
            .service
            .toggle(subscriber, channel)
            .await
            .expect("first toggle");
        assert!(outcome.subscribed);

        // Once the edge exists, the next toggle flips the other way.
        h.subscriptions
            .create_edge(subscriber, channel)
            .await
            .expect("seed edge");
        let outcome = h
            .service
            .toggle(subscriber, channel)
            .await
            .expect("second toggle");
        assert!(!outcome.subscribed);

        let published = h.jobs.published();
        assert_eq!(published.len(), 2);
        assert!(
            published
                .iter()
                .all(|job| job.job_type == JobType::SubscriptionToggle)
        );
        assert_eq!(published[0].payload["action"], "SUBSCRIBE");
        assert_eq!(published[0].payload["username"], "ada");
        assert_eq!(published[1].payload["action"], "UNSUBSCRIBE");
    }

    #[tokio::test]
    async fn publish_failure_surfaces_a_retryable_error() {
        let channel = Uuid::new_v4();
        let h = harness(MemoryChannels::default().with_channel(channel, "ada"));
        h.jobs.fail_publish(true);

        let err = h
            .service
            .toggle(Uuid::new_v4(), channel)
            .await
            .expect_err("broker down");
        match err {
            AppError::Repo(repo) => assert!(repo.is_retryable()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn subscription_state_reads_through_and_caches() {
        let channel = Uuid::new_v4();
        let subscriber = Uuid::new_v4();
        let h = harness(MemoryChannels::default().with_channel(channel, "ada"));

        assert!(
            !h.service
                .subscription_state(subscriber, channel)
                .await
                .expect("state")
        );

        // The store changes without a cache sync; the cached flag still
        // answers until the worker invalidates it.
        h.subscriptions
            .create_edge(subscriber, channel)
            .await
            .expect("seed edge");
        assert!(
            !h.service
                .subscription_state(subscriber, channel)
                .await
                .expect("cached state")
        );
    }

    #[tokio::test]
    async fn subscriber_pages_are_cached_per_page_and_limit() {
        let channel = Uuid::new_v4();
        let subscriber = Uuid::new_v4();
        let h = harness(MemoryChannels::default().with_channel(channel, "ada"));
        h.subscriptions
            .create_edge(subscriber, channel)
            .await
            .expect("seed edge");

        let page = PageRequest::new(1, 20);
        let first = h
            .service
            .subscribers_page(channel, page)
            .await
            .expect("first read");
        assert_eq!(first.len(), 1);

        // Different limit is a distinct cache entry, served from the store.
        let narrow = h
            .service
            .subscribers_page(channel, PageRequest::new(1, 5))
            .await
            .expect("narrow read");
        assert_eq!(narrow.len(), 1);
    }
}
