//! Cache key definitions.
//!
//! Defines `EntityKey` for invalidation targets and `CacheKey` for cache
//! entries. Keys are typed; the colon-delimited string form is only used for
//! logging and mirrors the wire namespaces (`subs:*`, `views:*`).

use std::collections::HashSet;
use std::fmt;

use uuid::Uuid;

/// Identifies an entity (or derived collection) for cache invalidation.
///
/// When an edge changes, every cache entry that depends on one of these must
/// be invalidated. The paginated list classes are deliberately coarse: any
/// change to an edge dirties the whole class for both endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    /// A single subscription pair.
    Pair {
        subscriber_id: Uuid,
        channel_id: Uuid,
    },
    /// Everything derived from a channel's subscriber set.
    ChannelSubscribers(Uuid),
    /// Everything derived from a subscriber's subscription set.
    SubscriberSubscriptions(Uuid),
}

/// A single cache entry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Boolean subscription state for a pair.
    PairFlag {
        subscriber_id: Uuid,
        channel_id: Uuid,
    },
    /// One page of a channel's subscriber list.
    SubscriberPage {
        channel_id: Uuid,
        page: u32,
        limit: u32,
    },
    /// One page of a subscriber's subscription list.
    SubscriptionPage {
        subscriber_id: Uuid,
        page: u32,
        limit: u32,
    },
    /// Unpaginated "latest subscribers" convenience list for a channel.
    LatestSubscribers(Uuid),
    /// Unpaginated "latest subscriptions" convenience list for a subscriber.
    LatestSubscriptions(Uuid),
    /// Write-back pending view counter for a video.
    PendingViews(Uuid),
}

impl CacheKey {
    /// The entities this cache entry depends on, for registry bookkeeping.
    ///
    /// Pending view counters are not registry-managed; they are drained by
    /// the flush job, never invalidated by edge changes.
    pub fn entities(&self) -> HashSet<EntityKey> {
        let mut entities = HashSet::new();
        match self {
            Self::PairFlag {
                subscriber_id,
                channel_id,
            } => {
                entities.insert(EntityKey::Pair {
                    subscriber_id: *subscriber_id,
                    channel_id: *channel_id,
                });
            }
            Self::SubscriberPage { channel_id, .. } | Self::LatestSubscribers(channel_id) => {
                entities.insert(EntityKey::ChannelSubscribers(*channel_id));
            }
            Self::SubscriptionPage { subscriber_id, .. }
            | Self::LatestSubscriptions(subscriber_id) => {
                entities.insert(EntityKey::SubscriberSubscriptions(*subscriber_id));
            }
            Self::PendingViews(_) => {}
        }
        entities
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PairFlag {
                subscriber_id,
                channel_id,
            } => write!(f, "subs:flag:{subscriber_id}:{channel_id}"),
            Self::SubscriberPage {
                channel_id,
                page,
                limit,
            } => write!(f, "subs:subscribers:{channel_id}:{page}:{limit}"),
            Self::SubscriptionPage {
                subscriber_id,
                page,
                limit,
            } => write!(f, "subs:subscriptions:{subscriber_id}:{page}:{limit}"),
            Self::LatestSubscribers(channel_id) => {
                write!(f, "subs:subscribers:{channel_id}:all")
            }
            Self::LatestSubscriptions(subscriber_id) => {
                write!(f, "subs:subscriptions:{subscriber_id}:all")
            }
            Self::PendingViews(video_id) => write!(f, "views:pending:{video_id}"),
        }
    }
}
