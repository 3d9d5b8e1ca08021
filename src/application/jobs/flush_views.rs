//! Cron job that flushes pending view counters into the durable store.
//!
//! The counters are taken atomically before any store write, so increments
//! racing the flush accrue to fresh counters. A delta whose commit fails is
//! returned to the cache for the next pass; a delta for a vanished video is
//! dropped. The job itself always acknowledges, partial progress is fine
//! because the remaining deltas are still in the cache.

use std::str::FromStr;

use apalis::prelude::{Data, Error as ApalisError};
use apalis_cron::Schedule;
use metrics::counter;
use tracing::{debug, info, warn};

use crate::application::repos::RepoError;

use super::context::FlushViewsContext;

const METRIC_FLUSHED: &str = "flusso_views_flushed_total";
const METRIC_DROPPED: &str = "flusso_views_dropped_total";
const METRIC_RETRIED: &str = "flusso_views_requeued_total";

/// Marker struct for the cron-triggered flush job.
/// Must implement `From<chrono::DateTime<chrono::Utc>>` for apalis-cron compatibility.
#[derive(Default, Debug, Clone)]
pub struct FlushViewsJob;

impl From<chrono::DateTime<chrono::Utc>> for FlushViewsJob {
    fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
        Self
    }
}

pub async fn process_flush_views_job(
    _job: FlushViewsJob,
    ctx: Data<FlushViewsContext>,
) -> Result<(), ApalisError> {
    let pending = ctx.cache.take_pending_views();
    if pending.is_empty() {
        debug!(
            target = "application::jobs::process_flush_views_job",
            "no pending view counters"
        );
        return Ok(());
    }

    let mut flushed = 0u64;
    let mut dropped = 0u64;
    let mut requeued = 0u64;

    for (video_id, delta) in pending {
        match ctx.videos.add_views(video_id, delta as i64).await {
            Ok(()) => {
                flushed += delta;
            }
            Err(RepoError::NotFound) => {
                // The video is gone; its views have nowhere to go.
                warn!(
                    target = "application::jobs::process_flush_views_job",
                    video_id = %video_id,
                    delta,
                    "dropping views for missing video"
                );
                dropped += delta;
            }
            Err(err) => {
                warn!(
                    target = "application::jobs::process_flush_views_job",
                    video_id = %video_id,
                    delta,
                    error = %err,
                    "flush commit failed, returning delta to cache"
                );
                ctx.cache.restore_pending_views(video_id, delta);
                requeued += delta;
            }
        }
    }

    counter!(METRIC_FLUSHED).increment(flushed);
    counter!(METRIC_DROPPED).increment(dropped);
    counter!(METRIC_RETRIED).increment(requeued);

    info!(
        target = "application::jobs::process_flush_views_job",
        flushed, dropped, requeued, "view counters flushed"
    );

    Ok(())
}

/// Create the cron schedule for the view-count flush.
/// Runs at second 0 of every minute: "0 * * * * *"
pub fn default_flush_schedule() -> Schedule {
    Schedule::from_str("0 * * * * *").expect("Invalid cron expression for flush_views")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use crate::application::testing::MemoryVideos;
    use crate::cache::{CacheConfig, CacheStore};

    use super::*;

    fn context(videos: Arc<MemoryVideos>) -> FlushViewsContext {
        FlushViewsContext {
            videos,
            cache: Arc::new(CacheStore::new(&CacheConfig::default())),
        }
    }

    #[test]
    fn schedule_parses_correctly() {
        let schedule = default_flush_schedule();
        let upcoming: Vec<_> = schedule.upcoming(chrono::Utc).take(3).collect();
        assert_eq!(upcoming.len(), 3);
    }

    #[tokio::test]
    async fn flush_moves_pending_deltas_to_the_store() {
        let video = Uuid::new_v4();
        let videos = Arc::new(MemoryVideos::default().with_video(video, 100));
        let ctx = context(Arc::clone(&videos));

        for _ in 0..5 {
            ctx.cache.record_view(video);
        }

        process_flush_views_job(FlushViewsJob, Data::new(ctx.clone()))
            .await
            .expect("flush completes");

        // Total views conserved: persistent picked up the delta, cache drained.
        assert_eq!(videos.stored_views(video), 105);
        assert_eq!(ctx.cache.pending_views(video), 0);
    }

    #[tokio::test]
    async fn failed_commit_returns_the_delta_to_the_cache() {
        let video = Uuid::new_v4();
        let videos = Arc::new(MemoryVideos::default().with_video(video, 100));
        let ctx = context(Arc::clone(&videos));

        ctx.cache.record_view(video);
        ctx.cache.record_view(video);
        videos.fail_next_add_views(true);

        process_flush_views_job(FlushViewsJob, Data::new(ctx.clone()))
            .await
            .expect("flush acknowledges despite commit failure");

        assert_eq!(videos.stored_views(video), 100);
        assert_eq!(ctx.cache.pending_views(video), 2);

        // The next pass succeeds and drains the restored delta.
        videos.fail_next_add_views(false);
        process_flush_views_job(FlushViewsJob, Data::new(ctx.clone()))
            .await
            .expect("retry flush completes");

        assert_eq!(videos.stored_views(video), 102);
        assert_eq!(ctx.cache.pending_views(video), 0);
    }

    #[tokio::test]
    async fn views_for_a_missing_video_are_dropped() {
        let videos = Arc::new(MemoryVideos::default());
        let ctx = context(Arc::clone(&videos));
        let ghost = Uuid::new_v4();

        ctx.cache.record_view(ghost);

        process_flush_views_job(FlushViewsJob, Data::new(ctx.clone()))
            .await
            .expect("flush completes");

        assert_eq!(ctx.cache.pending_views(ghost), 0);
    }
}
