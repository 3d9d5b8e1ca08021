use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "flusso_toggle_published_total",
            Unit::Count,
            "Total number of subscription toggle messages published to the queue."
        );
        describe_counter!(
            "flusso_toggle_applied_total",
            Unit::Count,
            "Total number of toggle messages that changed the subscription store."
        );
        describe_counter!(
            "flusso_toggle_noop_total",
            Unit::Count,
            "Total number of toggle messages that found the store already converged."
        );
        describe_counter!(
            "flusso_toggle_poison_total",
            Unit::Count,
            "Total number of self-edge poison messages acknowledged and dropped."
        );
        describe_counter!(
            "flusso_views_recorded_total",
            Unit::Count,
            "Total number of view events recorded against pending counters."
        );
        describe_counter!(
            "flusso_views_flushed_total",
            Unit::Count,
            "Total number of pending views committed to the durable store."
        );
        describe_counter!(
            "flusso_views_dropped_total",
            Unit::Count,
            "Total number of pending views dropped because their video vanished."
        );
        describe_counter!(
            "flusso_views_requeued_total",
            Unit::Count,
            "Total number of pending views returned to the cache after a failed commit."
        );
        describe_gauge!(
            "flusso_views_pending_videos",
            Unit::Count,
            "Current number of videos with an unflushed pending view counter."
        );
    });
}
