//! Write-back view counting.
//!
//! A view event only touches the in-process counter; the cron flush job
//! reconciles it into the durable store. Reads present persistent plus
//! pending so callers see views that have not been flushed yet.

use std::sync::Arc;

use metrics::counter;
use tracing::debug;
use uuid::Uuid;

use crate::{
    application::{error::AppError, repos::VideosRepo},
    cache::CacheStore,
    domain::entities::VideoRecord,
};

const METRIC_VIEWS: &str = "flusso_views_recorded_total";

pub struct ViewCountService {
    videos: Arc<dyn VideosRepo>,
    cache: Arc<CacheStore>,
}

impl ViewCountService {
    pub fn new(videos: Arc<dyn VideosRepo>, cache: Arc<CacheStore>) -> Self {
        Self { videos, cache }
    }

    /// Count one view. The durable store is not touched.
    pub async fn record_view(&self, video_id: Uuid) -> Result<(), AppError> {
        let Some(_) = self.videos.find_video(video_id).await? else {
            return Err(AppError::NotFound);
        };

        let pending = self.cache.record_view(video_id);
        counter!(METRIC_VIEWS).increment(1);
        debug!(
            target = "application::views",
            video_id = %video_id,
            pending,
            "view recorded"
        );

        Ok(())
    }

    /// The video with its live view count: persisted views plus the pending
    /// delta still sitting in the cache.
    pub async fn video_with_live_views(&self, video_id: Uuid) -> Result<VideoRecord, AppError> {
        let Some(mut video) = self.videos.find_video(video_id).await? else {
            return Err(AppError::NotFound);
        };

        video.views += self.cache.pending_views(video_id) as i64;
        Ok(video)
    }
}

#[cfg(test)]
mod tests {
    use crate::application::testing::MemoryVideos;
    use crate::cache::CacheConfig;

    use super::*;

    fn service(videos: Arc<MemoryVideos>) -> ViewCountService {
        ViewCountService::new(videos, Arc::new(CacheStore::new(&CacheConfig::default())))
    }

    #[tokio::test]
    async fn views_accumulate_without_touching_the_store() {
        let video = Uuid::new_v4();
        let videos = Arc::new(MemoryVideos::default().with_video(video, 100));
        let svc = service(Arc::clone(&videos));

        for _ in 0..5 {
            svc.record_view(video).await.expect("view recorded");
        }

        assert_eq!(videos.stored_views(video), 100);
        let live = svc
            .video_with_live_views(video)
            .await
            .expect("video found");
        assert_eq!(live.views, 105);
    }

    #[tokio::test]
    async fn view_for_unknown_video_is_not_found() {
        let svc = service(Arc::new(MemoryVideos::default()));

        let err = svc
            .record_view(Uuid::new_v4())
            .await
            .expect_err("missing video");
        assert!(matches!(err, AppError::NotFound));
    }
}
