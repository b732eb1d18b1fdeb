//! REST surface served by the store: paginated creator reads plus the
//! synchronization trigger.
//!
//! `/events` is guarded by a bearer token when one is configured, and open
//! otherwise.

use crate::store::{MaterializedStore, PageCursor, StoreError};
use crate::sync::EventSynchronizer;
use crate::types::{Content, CreatorProfile};
use axum::extract::{Path, Query, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

const DEFAULT_PAGE_LIMIT: usize = 20;
const MAX_PAGE_LIMIT: usize = 100;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MaterializedStore>,
    pub synchronizer: Arc<EventSynchronizer>,
    /// Bearer token required on `/events`; `None` leaves the route open.
    pub sync_token: Option<String>,
}

/// Build the router. The sync trigger gets the auth guard; read routes are
/// public.
pub fn build_router(state: AppState) -> Router {
    let token = Arc::new(state.sync_token.clone());
    let events = Router::new()
        .route("/events", get(trigger_sync))
        .layer(middleware::from_fn_with_state(token, bearer_guard))
        .with_state(state.clone());

    Router::new()
        .route("/creators", get(list_creators))
        .route("/creator/:id", get(creator_detail))
        .with_state(state)
        .merge(events)
}

async fn bearer_guard(
    State(token): State<Arc<Option<String>>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = token.as_ref() else {
        return Ok(next.run(req).await);
    };
    let provided = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match provided {
        Some(value) if value == expected => Ok(next.run(req).await),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<usize>,
    cursor: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatorDto {
    profile_id: String,
    owner: String,
    name: String,
    bio: String,
    avatar_blob_id: Option<String>,
    alias: Option<String>,
    price: u64,
    content_count: u64,
    total_supporters: u64,
    created_at_ms: i64,
}

impl From<CreatorProfile> for CreatorDto {
    fn from(c: CreatorProfile) -> Self {
        Self {
            profile_id: c.profile_id,
            owner: c.owner,
            name: c.name,
            bio: c.bio,
            avatar_blob_id: c.avatar_blob_id,
            alias: c.alias,
            price: c.price,
            content_count: c.content_count,
            total_supporters: c.total_supporters,
            created_at_ms: c.created_at_ms,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentDto {
    content_id: String,
    profile_id: String,
    title: String,
    description: String,
    blob_id: String,
    kind: String,
    created_at_ms: i64,
}

impl From<Content> for ContentDto {
    fn from(c: Content) -> Self {
        Self {
            content_id: c.content_id,
            profile_id: c.profile_id,
            title: c.title,
            description: c.description,
            blob_id: c.blob_id,
            kind: c.kind.as_str().to_string(),
            created_at_ms: c.created_at_ms,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatorsResponse {
    creators: Vec<CreatorDto>,
    next_cursor: Option<String>,
    has_next_page: bool,
}

#[derive(Debug, Serialize)]
struct CreatorDetailResponse {
    creator: CreatorDto,
    content: Vec<ContentDto>,
}

#[derive(Debug, Serialize)]
struct SyncResponse {
    ok: bool,
    processed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

enum ApiError {
    NotFound,
    BadRequest(String),
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => ApiError::NotFound,
            StoreError::InvalidCursor => ApiError::BadRequest("invalid cursor".to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Internal(m) => {
                error!(error = %m, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

async fn list_creators(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<CreatorsResponse>, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .clamp(1, MAX_PAGE_LIMIT);
    let cursor = params
        .cursor
        .as_deref()
        .map(PageCursor::from_token)
        .transpose()?;

    let page = state.store.list_creators(limit, cursor).await?;
    Ok(Json(CreatorsResponse {
        creators: page.items.into_iter().map(CreatorDto::from).collect(),
        next_cursor: page.next_cursor.map(|c| c.to_token()),
        has_next_page: page.has_next_page,
    }))
}

async fn creator_detail(
    State(state): State<AppState>,
    Path(profile_id): Path<String>,
) -> Result<Json<CreatorDetailResponse>, ApiError> {
    let creator = state
        .store
        .get_creator(&profile_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let content = state.store.content_by_profile(&profile_id).await?;
    Ok(Json(CreatorDetailResponse {
        creator: creator.into(),
        content: content.into_iter().map(ContentDto::from).collect(),
    }))
}

async fn trigger_sync(State(state): State<AppState>) -> Json<SyncResponse> {
    let report = state.synchronizer.sync().await;
    Json(SyncResponse {
        ok: report.errors.is_empty(),
        processed: report.processed,
        errors: if report.errors.is_empty() {
            None
        } else {
            Some(report.errors)
        },
    })
}
