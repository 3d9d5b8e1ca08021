//! Subscription toggle consumer.
//!
//! Applies SUBSCRIBE/UNSUBSCRIBE messages from the durable queue. Delivery is
//! at-least-once, so the apply step is idempotent and the cache sync runs
//! unconditionally, whether or not the store changed. A returned error asks
//! the broker to redeliver; the one exception is the self-edge poison case,
//! which is acknowledged and dropped so it cannot wedge the queue.

use apalis::prelude::{Data, Error as ApalisError};
use metrics::counter;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    application::repos::{JobsRepo, RepoError},
    cache::{CacheKey, EntityKey},
    domain::types::{JobType, SubscriptionAction},
};

use super::{
    context::{ToggleWorkerContext, job_failed},
    queue::enqueue_job,
};

const METRIC_APPLIED: &str = "flusso_toggle_applied_total";
const METRIC_NOOP: &str = "flusso_toggle_noop_total";
const METRIC_POISON: &str = "flusso_toggle_poison_total";

/// Wire payload for a subscription toggle message.
///
/// `user_id` is the target channel, `subscriber_id` the acting user.
/// Field names on the wire are camelCase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionTogglePayload {
    pub action: SubscriptionAction,
    pub user_id: Uuid,
    pub subscriber_id: Uuid,
    pub username: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

pub async fn enqueue_subscription_toggle_job<J: JobsRepo + ?Sized>(
    repo: &J,
    payload: &SubscriptionTogglePayload,
    max_attempts: i32,
) -> Result<String, RepoError> {
    enqueue_job(
        repo,
        JobType::SubscriptionToggle,
        payload,
        None,
        max_attempts,
        10,
    )
    .await
}

pub async fn process_subscription_toggle_job(
    payload: SubscriptionTogglePayload,
    context: Data<ToggleWorkerContext>,
) -> Result<(), ApalisError> {
    let ctx = &*context;

    // A self-edge can never be applied; retrying would only burn attempts.
    // Acknowledge and drop instead of parking it in the dead-letter state.
    if payload.subscriber_id == payload.user_id {
        warn!(
            target = "application::jobs::process_subscription_toggle_job",
            subscriber_id = %payload.subscriber_id,
            action = payload.action.as_str(),
            "dropping self-subscription message"
        );
        counter!(METRIC_POISON).increment(1);
        return Ok(());
    }

    let changed = apply_toggle(ctx, &payload).await.map_err(job_failed)?;

    if changed {
        counter!(METRIC_APPLIED).increment(1);
    } else {
        // Redelivery of an already-applied message, or a stale toggle.
        counter!(METRIC_NOOP).increment(1);
    }

    sync_pair_caches(ctx, payload.subscriber_id, payload.user_id)
        .await
        .map_err(job_failed)?;

    info!(
        target = "application::jobs::process_subscription_toggle_job",
        subscriber_id = %payload.subscriber_id,
        channel_id = %payload.user_id,
        action = payload.action.as_str(),
        changed,
        "subscription toggle applied"
    );

    Ok(())
}

/// Apply the edge mutation. Returns whether the store changed.
///
/// Both directions tolerate the edge already being in the requested state, so
/// a redelivered message converges instead of erroring.
async fn apply_toggle(
    ctx: &ToggleWorkerContext,
    payload: &SubscriptionTogglePayload,
) -> Result<bool, RepoError> {
    match payload.action {
        SubscriptionAction::Subscribe => {
            ctx.subscriptions
                .create_edge(payload.subscriber_id, payload.user_id)
                .await
        }
        SubscriptionAction::Unsubscribe => {
            ctx.subscriptions
                .delete_edge(payload.subscriber_id, payload.user_id)
                .await
        }
    }
}

/// Bring every cache entry touched by this pair back in line with the store.
///
/// Order matters: stale entries are dropped before fresh ones are written,
/// and the fresh values are read from the store after the apply, so a crash
/// between steps leaves at most a cache miss, never a stale hit.
async fn sync_pair_caches(
    ctx: &ToggleWorkerContext,
    subscriber_id: Uuid,
    channel_id: Uuid,
) -> Result<(), RepoError> {
    let flag_key = CacheKey::PairFlag {
        subscriber_id,
        channel_id,
    };
    ctx.cache.remove(&flag_key);
    ctx.registry.unregister(&flag_key);

    // Any page of either endpoint's lists may contain this edge; the registry
    // resolves the set of live entries so nothing is scanned.
    for entity in [
        EntityKey::ChannelSubscribers(channel_id),
        EntityKey::SubscriberSubscriptions(subscriber_id),
    ] {
        for key in ctx.registry.unregister_entity(&entity) {
            ctx.cache.remove(&key);
        }
    }

    let subscribed = ctx
        .subscriptions
        .edge_exists(subscriber_id, channel_id)
        .await?;
    ctx.cache.set_pair_flag(subscriber_id, channel_id, subscribed);
    ctx.registry.register(flag_key);

    let latest_size = ctx.cache_config.latest_list_size;

    let subscribers = ctx
        .subscriptions
        .latest_subscribers(channel_id, latest_size)
        .await?;
    ctx.cache.set_latest_subscribers(channel_id, subscribers);
    ctx.registry.register(CacheKey::LatestSubscribers(channel_id));

    let subscriptions = ctx
        .subscriptions
        .latest_subscriptions(subscriber_id, latest_size)
        .await?;
    ctx.cache
        .set_latest_subscriptions(subscriber_id, subscriptions);
    ctx.registry
        .register(CacheKey::LatestSubscriptions(subscriber_id));

    Ok(())
}
