//! Persistent records and derived read-model entries.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// A channel is the identity at both ends of a subscription edge.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRecord {
    pub id: Uuid,
    pub username: String,
    pub created_at: OffsetDateTime,
}

/// A directed subscription edge: `subscriber_id` follows `channel_id`.
///
/// At most one edge exists per ordered pair (unique constraint in the store);
/// self-edges are forbidden. Edges are created and destroyed only by the
/// mutation worker, never on the request path.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionRecord {
    pub id: Uuid,
    pub subscriber_id: Uuid,
    pub channel_id: Uuid,
    pub created_at: OffsetDateTime,
}

/// A video owned by a channel. `views` is the durable count; the live total
/// adds the pending cache counter on top.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoRecord {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub title: String,
    pub views: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// One row of a channel's subscriber list (someone who follows the channel).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriberEntry {
    pub subscriber_id: Uuid,
    pub username: String,
    #[serde(with = "time::serde::rfc3339")]
    pub subscribed_at: OffsetDateTime,
}

/// One row of a subscriber's subscription list (a channel they follow).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionEntry {
    pub channel_id: Uuid,
    pub username: String,
    #[serde(with = "time::serde::rfc3339")]
    pub subscribed_at: OffsetDateTime,
}
