use std::sync::Arc;

use apalis::prelude::Error as ApalisError;

use crate::{
    application::repos::{SubscriptionsRepo, VideosRepo},
    cache::{CacheConfig, CacheRegistry, CacheStore},
};

/// Shared context for the subscription toggle worker.
///
/// Repositories are trait objects so the worker logic can be exercised
/// against in-memory fakes.
#[derive(Clone)]
pub struct ToggleWorkerContext {
    pub subscriptions: Arc<dyn SubscriptionsRepo>,
    pub cache: Arc<CacheStore>,
    pub registry: Arc<CacheRegistry>,
    pub cache_config: CacheConfig,
}

/// Context for the periodic view-count flush worker.
#[derive(Clone)]
pub struct FlushViewsContext {
    pub videos: Arc<dyn VideosRepo>,
    pub cache: Arc<CacheStore>,
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convert any error into an [`ApalisError::Failed`].
pub fn job_failed<E>(err: E) -> ApalisError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let boxed: BoxError = Box::new(err);
    ApalisError::Failed(Arc::new(boxed))
}
