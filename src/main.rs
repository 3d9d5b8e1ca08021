use std::{process, sync::Arc, time::Duration};

use apalis::{
    layers::WorkerBuilderExt,
    prelude::{Monitor, WorkerBuilder, WorkerFactoryFn},
};
use apalis_cron::CronStream;
use apalis_sql::{Config as ApalisSqlConfig, postgres::PostgresStorage};
use flusso::{
    application::{
        error::AppError,
        jobs::{
            FlushViewsContext, ToggleWorkerContext, process_flush_views_job,
            process_subscription_toggle_job,
        },
        repos::{ChannelsRepo, HealthRepo, JobsRepo, SubscriptionsRepo, VideosRepo},
        subscriptions::SubscriptionService,
        views::ViewCountService,
    },
    cache::{CacheRegistry, CacheStore},
    config,
    domain::types::JobType,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

const MONITOR_BACKOFF_INITIAL: Duration = Duration::from_secs(1);
const MONITOR_BACKOFF_CAP: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let (http_repositories, job_repositories) = init_repositories(&settings).await?;

    let dead_letter = http_repositories
        .count_dead_letter(JobType::SubscriptionToggle)
        .await?;
    if dead_letter > 0 {
        warn!(
            dead_letter,
            "toggle queue has poison messages parked in the killed state"
        );
    }

    let app = build_application_context(http_repositories, &settings);

    let monitor_handle = spawn_job_monitor(
        job_repositories,
        app.toggle_context.clone(),
        app.flush_context.clone(),
        &settings.jobs,
    );

    let result = serve_http(&settings, app.http_state).await;

    monitor_handle.abort();
    let _ = monitor_handle.await;

    result
}

struct ApplicationContext {
    http_state: HttpState,
    toggle_context: ToggleWorkerContext,
    flush_context: FlushViewsContext,
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<(Arc<PostgresRepositories>, Arc<PostgresRepositories>), AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let http_pool =
        PostgresRepositories::connect(database_url, settings.database.http_max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&http_pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    let jobs_pool =
        PostgresRepositories::connect(database_url, settings.database.jobs_max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    // The queue schema lives alongside the application tables but is owned
    // by the broker backend.
    PostgresStorage::setup(&jobs_pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok((
        Arc::new(PostgresRepositories::new(http_pool)),
        Arc::new(PostgresRepositories::new(jobs_pool)),
    ))
}

fn build_application_context(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> ApplicationContext {
    let channels_repo: Arc<dyn ChannelsRepo> = repositories.clone();
    let subscriptions_repo: Arc<dyn SubscriptionsRepo> = repositories.clone();
    let videos_repo: Arc<dyn VideosRepo> = repositories.clone();
    let jobs_repo: Arc<dyn JobsRepo> = repositories.clone();
    let health_repo: Arc<dyn HealthRepo> = repositories.clone();

    let cache = Arc::new(CacheStore::new(&settings.cache));
    let registry = Arc::new(CacheRegistry::new());

    let subscriptions = Arc::new(SubscriptionService::new(
        channels_repo,
        subscriptions_repo.clone(),
        jobs_repo,
        cache.clone(),
        registry.clone(),
        settings.cache.clone(),
        settings.jobs.toggle_max_attempts,
    ));
    let views = Arc::new(ViewCountService::new(videos_repo.clone(), cache.clone()));

    let toggle_context = ToggleWorkerContext {
        subscriptions: subscriptions_repo,
        cache: cache.clone(),
        registry,
        cache_config: settings.cache.clone(),
    };
    let flush_context = FlushViewsContext {
        videos: videos_repo,
        cache,
    };

    ApplicationContext {
        http_state: HttpState {
            subscriptions,
            views,
            health: health_repo,
        },
        toggle_context,
        flush_context,
    }
}

fn spawn_job_monitor(
    repositories: Arc<PostgresRepositories>,
    toggle_context: ToggleWorkerContext,
    flush_context: FlushViewsContext,
    jobs: &config::JobsSettings,
) -> tokio::task::JoinHandle<()> {
    let toggle_concurrency = jobs.toggle_concurrency.get() as usize;
    let flush_schedule = jobs.flush_schedule.clone();

    tokio::spawn(async move {
        let mut backoff = MONITOR_BACKOFF_INITIAL;
        loop {
            let toggle_storage = PostgresStorage::new_with_config(
                repositories.pool().clone(),
                ApalisSqlConfig::new(JobType::SubscriptionToggle.as_str()),
            );

            // Concurrency 1 preserves per-pair ordering: one message in
            // flight at a time, acknowledged before the next is fetched.
            let toggle_worker = WorkerBuilder::new("subscription-toggle-worker")
                .concurrency(toggle_concurrency)
                .data(toggle_context.clone())
                .backend(toggle_storage)
                .build_fn(process_subscription_toggle_job);

            let flush_worker = WorkerBuilder::new("flush-views-worker")
                .data(flush_context.clone())
                .backend(CronStream::new(flush_schedule.clone()))
                .build_fn(process_flush_views_job);

            let monitor = Monitor::new()
                .register(toggle_worker)
                .register(flush_worker);

            match monitor.run().await {
                Ok(()) => break,
                Err(err) => {
                    error!(
                        error = %err,
                        backoff_seconds = backoff.as_secs(),
                        "job monitor stopped, reconnecting"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MONITOR_BACKOFF_CAP);
                }
            }
        }
    })
}

async fn serve_http(settings: &config::Settings, http_state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(http_state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(addr = %settings.server.addr, "listening");

    let (drained_tx, drained_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = drained_tx.send(());
        });

    let grace = settings.server.graceful_shutdown;
    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = async {
            let _ = drained_rx.await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(
                grace_seconds = grace.as_secs(),
                "graceful shutdown window elapsed, exiting"
            );
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to install shutdown signal handler");
        return;
    }
    info!("shutdown signal received, draining connections");
}
