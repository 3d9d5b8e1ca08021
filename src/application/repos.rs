//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::{ChannelRecord, SubscriberEntry, SubscriptionEntry, VideoRecord};
use crate::domain::types::JobType;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    /// Whether a caller that received this error should simply retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Timeout)
    }
}

/// Offset pagination for list reads. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit,
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.limit)
    }
}

/// Channel lookups. Channels are provisioned outside this service, so the
/// repository is read-only.
#[async_trait]
pub trait ChannelsRepo: Send + Sync {
    async fn find_channel(&self, id: Uuid) -> Result<Option<ChannelRecord>, RepoError>;
}

/// Subscription edge persistence.
///
/// `create_edge` and `delete_edge` are the idempotent apply primitives: both
/// report whether they changed anything, and neither errors when the edge is
/// already in the requested state. The unique `(subscriber_id, channel_id)`
/// constraint is the sole mutual-exclusion mechanism under concurrent
/// workers.
#[async_trait]
pub trait SubscriptionsRepo: Send + Sync {
    async fn edge_exists(&self, subscriber_id: Uuid, channel_id: Uuid)
    -> Result<bool, RepoError>;

    /// Create the edge if absent. Returns true when a row was inserted.
    async fn create_edge(&self, subscriber_id: Uuid, channel_id: Uuid)
    -> Result<bool, RepoError>;

    /// Delete the edge if present. Returns true when a row was removed.
    async fn delete_edge(&self, subscriber_id: Uuid, channel_id: Uuid)
    -> Result<bool, RepoError>;

    async fn list_subscribers(
        &self,
        channel_id: Uuid,
        page: PageRequest,
    ) -> Result<Vec<SubscriberEntry>, RepoError>;

    async fn list_subscriptions(
        &self,
        subscriber_id: Uuid,
        page: PageRequest,
    ) -> Result<Vec<SubscriptionEntry>, RepoError>;

    async fn latest_subscribers(
        &self,
        channel_id: Uuid,
        limit: u32,
    ) -> Result<Vec<SubscriberEntry>, RepoError>;

    async fn latest_subscriptions(
        &self,
        subscriber_id: Uuid,
        limit: u32,
    ) -> Result<Vec<SubscriptionEntry>, RepoError>;
}

#[async_trait]
pub trait VideosRepo: Send + Sync {
    async fn find_video(&self, id: Uuid) -> Result<Option<VideoRecord>, RepoError>;

    /// Merge a flushed view delta into the durable count, transactionally.
    async fn add_views(&self, id: Uuid, delta: i64) -> Result<(), RepoError>;
}

#[derive(Debug, Clone)]
pub struct NewJobRecord {
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub run_at: OffsetDateTime,
    pub max_attempts: i32,
    pub priority: i32,
}

#[async_trait]
pub trait JobsRepo: Send + Sync {
    /// Publish a durable message to the broker, returning its assigned id.
    async fn enqueue_job(&self, job: NewJobRecord) -> Result<String, RepoError>;

    /// Number of messages parked in the dead-letter (killed) state for a
    /// queue. Poison messages end up here once their attempts are exhausted.
    async fn count_dead_letter(&self, job_type: JobType) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait HealthRepo: Send + Sync {
    async fn ping(&self) -> Result<(), RepoError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_request_is_one_based() {
        assert_eq!(PageRequest::new(0, 20).page, 1);
        assert_eq!(PageRequest::new(1, 20).offset(), 0);
        assert_eq!(PageRequest::new(3, 20).offset(), 40);
    }

    #[test]
    fn transient_errors_are_retryable() {
        assert!(RepoError::Timeout.is_retryable());
        assert!(RepoError::from_persistence("connection refused").is_retryable());
        assert!(!RepoError::NotFound.is_retryable());
    }
}
