//! Small domain enums shared between the producer, the queue, and the worker.

use serde::{Deserialize, Serialize};

/// The effect a queued toggle message asks the worker to apply.
///
/// The producer computes this as the inverse of the edge's current state;
/// the worker applies it idempotently, so redelivery of the same action
/// leaves the store unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionAction {
    Subscribe,
    Unsubscribe,
}

impl SubscriptionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
        }
    }

}

/// Queue namespaces used by the broker backend. The flush job is cron-driven
/// and never enqueued, so it has no namespace here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobType {
    SubscriptionToggle,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SubscriptionToggle => "SubscriptionToggle",
        }
    }
}
