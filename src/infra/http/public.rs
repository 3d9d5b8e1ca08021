//! Public HTTP surface.
//!
//! The toggle route publishes to the queue and answers optimistically; it
//! never mutates the subscription store itself. Authentication lives in front
//! of this service, which trusts the `x-subscriber-id` header it forwards.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::{
    error::AppError,
    repos::{HealthRepo, PageRequest},
    subscriptions::SubscriptionService,
    views::ViewCountService,
};

use super::{db_health_response, middleware};

const SUBSCRIBER_HEADER: &str = "x-subscriber-id";
const MAX_PAGE_LIMIT: u32 = 100;
const DEFAULT_PAGE_LIMIT: u32 = 20;

#[derive(Clone)]
pub struct HttpState {
    pub subscriptions: Arc<SubscriptionService>,
    pub views: Arc<ViewCountService>,
    pub health: Arc<dyn HealthRepo>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/subscriptions/c/{target_id}", post(toggle_subscription))
        .route("/subscriptions", get(list_subscriptions))
        .route("/channels/{channel_id}/subscribers", get(list_subscribers))
        .route(
            "/channels/{channel_id}/subscription",
            get(subscription_state),
        )
        .route("/videos/{video_id}/view", post(record_view))
        .route("/videos/{video_id}", get(video_detail))
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<u32>,
    limit: Option<u32>,
}

impl PageQuery {
    /// Explicit pagination when either parameter is present; otherwise the
    /// caller gets the cached "latest" convenience list.
    fn page_request(&self) -> Option<PageRequest> {
        if self.page.is_none() && self.limit.is_none() {
            return None;
        }
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT);
        Some(PageRequest::new(self.page.unwrap_or(1), limit))
    }
}

#[derive(Debug, Serialize)]
struct ToggleResponse {
    subscribed: bool,
}

#[derive(Debug, Serialize)]
struct SubscriptionStateResponse {
    subscribed: bool,
}

fn subscriber_id(headers: &HeaderMap) -> Result<Uuid, AppError> {
    let value = headers
        .get(SUBSCRIBER_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::validation("missing subscriber identity header"))?;

    value
        .parse()
        .map_err(|_| AppError::validation("malformed subscriber identity header"))
}

async fn health(State(state): State<HttpState>) -> Response {
    db_health_response(state.health.ping().await)
}

async fn toggle_subscription(
    State(state): State<HttpState>,
    Path(target_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<ToggleResponse>, AppError> {
    let subscriber = subscriber_id(&headers)?;
    let outcome = state.subscriptions.toggle(subscriber, target_id).await?;

    Ok(Json(ToggleResponse {
        subscribed: outcome.subscribed,
    }))
}

async fn subscription_state(
    State(state): State<HttpState>,
    Path(channel_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<SubscriptionStateResponse>, AppError> {
    let subscriber = subscriber_id(&headers)?;
    let subscribed = state
        .subscriptions
        .subscription_state(subscriber, channel_id)
        .await?;

    Ok(Json(SubscriptionStateResponse { subscribed }))
}

async fn list_subscriptions(
    State(state): State<HttpState>,
    Query(query): Query<PageQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let subscriber = subscriber_id(&headers)?;

    let entries = match query.page_request() {
        Some(page) => {
            state
                .subscriptions
                .subscriptions_page(subscriber, page)
                .await?
        }
        None => state.subscriptions.latest_subscriptions(subscriber).await?,
    };

    Ok(Json(entries).into_response())
}

async fn list_subscribers(
    State(state): State<HttpState>,
    Path(channel_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<Response, AppError> {
    let entries = match query.page_request() {
        Some(page) => {
            state
                .subscriptions
                .subscribers_page(channel_id, page)
                .await?
        }
        None => state.subscriptions.latest_subscribers(channel_id).await?,
    };

    Ok(Json(entries).into_response())
}

async fn record_view(
    State(state): State<HttpState>,
    Path(video_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.views.record_view(video_id).await?;

    // Accepted: the durable count catches up at the next flush.
    Ok(StatusCode::ACCEPTED)
}

async fn video_detail(
    State(state): State<HttpState>,
    Path(video_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let video = state.views.video_with_live_views(video_id).await?;
    Ok(Json(video).into_response())
}
