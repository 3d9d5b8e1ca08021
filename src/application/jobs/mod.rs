mod context;
mod flush_views;
mod queue;
mod toggle;

pub use context::{FlushViewsContext, ToggleWorkerContext, job_failed};
pub use flush_views::{FlushViewsJob, default_flush_schedule, process_flush_views_job};
pub use queue::enqueue_job;
pub use toggle::{
    SubscriptionTogglePayload, enqueue_subscription_toggle_job, process_subscription_toggle_job,
};
