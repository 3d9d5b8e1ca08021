//! In-memory repository fakes for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::{
    ChannelRecord, SubscriberEntry, SubscriptionEntry, SubscriptionRecord, VideoRecord,
};
use crate::domain::types::JobType;

use super::repos::{
    ChannelsRepo, JobsRepo, NewJobRecord, PageRequest, RepoError, SubscriptionsRepo, VideosRepo,
};

fn username_for(store: &HashMap<Uuid, String>, id: Uuid) -> String {
    store
        .get(&id)
        .cloned()
        .unwrap_or_else(|| format!("user-{}", &id.to_string()[..8]))
}

#[derive(Default)]
pub(crate) struct MemoryChannels {
    channels: Mutex<HashMap<Uuid, ChannelRecord>>,
}

impl MemoryChannels {
    pub(crate) fn with_channel(self, id: Uuid, username: &str) -> Self {
        self.channels.lock().unwrap().insert(
            id,
            ChannelRecord {
                id,
                username: username.to_string(),
                created_at: OffsetDateTime::now_utc(),
            },
        );
        self
    }
}

#[async_trait]
impl ChannelsRepo for MemoryChannels {
    async fn find_channel(&self, id: Uuid) -> Result<Option<ChannelRecord>, RepoError> {
        Ok(self.channels.lock().unwrap().get(&id).cloned())
    }
}

#[derive(Default)]
pub(crate) struct MemorySubscriptions {
    edges: Mutex<Vec<SubscriptionRecord>>,
    usernames: Mutex<HashMap<Uuid, String>>,
    fail_mutations: AtomicBool,
    fail_lookups: AtomicBool,
}

impl MemorySubscriptions {
    pub(crate) fn with_username(self, id: Uuid, username: &str) -> Self {
        self.usernames
            .lock()
            .unwrap()
            .insert(id, username.to_string());
        self
    }

    pub(crate) fn edge_count(&self) -> usize {
        self.edges.lock().unwrap().len()
    }

    pub(crate) fn fail_mutations(&self, fail: bool) {
        self.fail_mutations.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    fn mutation_guard(&self) -> Result<(), RepoError> {
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("store unavailable"));
        }
        Ok(())
    }

    fn lookup_guard(&self) -> Result<(), RepoError> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("store unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionsRepo for MemorySubscriptions {
    async fn edge_exists(
        &self,
        subscriber_id: Uuid,
        channel_id: Uuid,
    ) -> Result<bool, RepoError> {
        self.lookup_guard()?;
        Ok(self
            .edges
            .lock()
            .unwrap()
            .iter()
            .any(|edge| edge.subscriber_id == subscriber_id && edge.channel_id == channel_id))
    }

    async fn create_edge(
        &self,
        subscriber_id: Uuid,
        channel_id: Uuid,
    ) -> Result<bool, RepoError> {
        self.mutation_guard()?;
        let mut edges = self.edges.lock().unwrap();
        if edges
            .iter()
            .any(|edge| edge.subscriber_id == subscriber_id && edge.channel_id == channel_id)
        {
            return Ok(false);
        }
        edges.push(SubscriptionRecord {
            id: Uuid::new_v4(),
            subscriber_id,
            channel_id,
            created_at: OffsetDateTime::now_utc(),
        });
        Ok(true)
    }

    async fn delete_edge(
        &self,
        subscriber_id: Uuid,
        channel_id: Uuid,
    ) -> Result<bool, RepoError> {
        self.mutation_guard()?;
        let mut edges = self.edges.lock().unwrap();
        let before = edges.len();
        edges.retain(|edge| {
            !(edge.subscriber_id == subscriber_id && edge.channel_id == channel_id)
        });
        Ok(edges.len() < before)
    }

    async fn list_subscribers(
        &self,
        channel_id: Uuid,
        page: PageRequest,
    ) -> Result<Vec<SubscriberEntry>, RepoError> {
        self.lookup_guard()?;
        let usernames = self.usernames.lock().unwrap();
        let mut rows: Vec<SubscriberEntry> = self
            .edges
            .lock()
            .unwrap()
            .iter()
            .filter(|edge| edge.channel_id == channel_id)
            .map(|edge| SubscriberEntry {
                subscriber_id: edge.subscriber_id,
                username: username_for(&usernames, edge.subscriber_id),
                subscribed_at: edge.created_at,
            })
            .collect();
        rows.sort_by(|a, b| b.subscribed_at.cmp(&a.subscribed_at));
        Ok(rows
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .collect())
    }

    async fn list_subscriptions(
        &self,
        subscriber_id: Uuid,
        page: PageRequest,
    ) -> Result<Vec<SubscriptionEntry>, RepoError> {
        self.lookup_guard()?;
        let usernames = self.usernames.lock().unwrap();
        let mut rows: Vec<SubscriptionEntry> = self
            .edges
            .lock()
            .unwrap()
            .iter()
            .filter(|edge| edge.subscriber_id == subscriber_id)
            .map(|edge| SubscriptionEntry {
                channel_id: edge.channel_id,
                username: username_for(&usernames, edge.channel_id),
                subscribed_at: edge.created_at,
            })
            .collect();
        rows.sort_by(|a, b| b.subscribed_at.cmp(&a.subscribed_at));
        Ok(rows
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .collect())
    }

    async fn latest_subscribers(
        &self,
        channel_id: Uuid,
        limit: u32,
    ) -> Result<Vec<SubscriberEntry>, RepoError> {
        self.list_subscribers(channel_id, PageRequest::new(1, limit))
            .await
    }

    async fn latest_subscriptions(
        &self,
        subscriber_id: Uuid,
        limit: u32,
    ) -> Result<Vec<SubscriptionEntry>, RepoError> {
        self.list_subscriptions(subscriber_id, PageRequest::new(1, limit))
            .await
    }
}

#[derive(Default)]
pub(crate) struct MemoryVideos {
    videos: Mutex<HashMap<Uuid, VideoRecord>>,
    fail_add_views: AtomicBool,
}

impl MemoryVideos {
    pub(crate) fn with_video(self, id: Uuid, views: i64) -> Self {
        self.videos.lock().unwrap().insert(
            id,
            VideoRecord {
                id,
                channel_id: Uuid::new_v4(),
                title: "sample".to_string(),
                views,
                created_at: OffsetDateTime::now_utc(),
            },
        );
        self
    }

    pub(crate) fn fail_next_add_views(&self, fail: bool) {
        self.fail_add_views.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn stored_views(&self, id: Uuid) -> i64 {
        self.videos
            .lock()
            .unwrap()
            .get(&id)
            .map(|video| video.views)
            .unwrap_or(0)
    }
}

#[async_trait]
impl VideosRepo for MemoryVideos {
    async fn find_video(&self, id: Uuid) -> Result<Option<VideoRecord>, RepoError> {
        Ok(self.videos.lock().unwrap().get(&id).cloned())
    }

    async fn add_views(&self, id: Uuid, delta: i64) -> Result<(), RepoError> {
        if self.fail_add_views.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("store unavailable"));
        }
        let mut videos = self.videos.lock().unwrap();
        let video = videos.get_mut(&id).ok_or(RepoError::NotFound)?;
        video.views += delta;
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MemoryJobs {
    published: Mutex<Vec<NewJobRecord>>,
    fail_publish: AtomicBool,
}

impl MemoryJobs {
    pub(crate) fn fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn published(&self) -> Vec<NewJobRecord> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobsRepo for MemoryJobs {
    async fn enqueue_job(&self, job: NewJobRecord) -> Result<String, RepoError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("broker unreachable"));
        }
        let mut published = self.published.lock().unwrap();
        published.push(job);
        Ok(format!("job-{}", published.len()))
    }

    async fn count_dead_letter(&self, _job_type: JobType) -> Result<u64, RepoError> {
        Ok(0)
    }
}
