//! # HTTP API
//!
//! Routes served to this service's own clients. Handlers only translate
//! between HTTP and the extraction pipeline; cache hints mirror how long the
//! scraped data stays meaningful.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::{CollectError, RpcFailure, WorkflowError, WorkflowStage};
use crate::http::{FetchOptions, SourceClient};
use crate::models::{BoardCatalogThread, Thread, TrackedBoards};
use crate::orchestrator::{ThreadDownloadOrchestrator, ThreadDownloadRequest};
use crate::scrapers::{CatalogExtractor, ThreadParser};

const CATALOG_CACHE: &str = "max-age=120, must-revalidate, private";
const THREAD_CACHE: &str = "max-age=600, must-revalidate, private";
const MEDIA_CACHE: &str = "max-age=13600, must-revalidate, private";
const NO_CACHE: &str = "no-cache";
const DEFAULT_MEDIA_TYPE: &str = "image/jpeg";

/// Components shared by every request; all read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub tracked_boards: Arc<TrackedBoards>,
    pub source_client: SourceClient,
    pub catalog: Arc<CatalogExtractor>,
    pub threads: Arc<ThreadParser>,
    pub orchestrator: ThreadDownloadOrchestrator,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/alive", get(alive))
        .route("/4chan-boards/boards", get(list_boards))
        .route("/4chan-boards/board/catalog", get(board_catalog))
        .route("/4chan-boards/boards/proxy-media", get(proxy_media))
        .route("/4chan-threads/thread", get(thread))
        .route("/4chan-downloads/thread/images", post(download_thread_images))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug)]
pub enum ApiError {
    BadGateway(String),
    NotFound(String),
    Internal(String),
}

impl From<CollectError> for ApiError {
    fn from(err: CollectError) -> Self {
        match &err {
            CollectError::Fetch { .. }
            | CollectError::Transport(_)
            | CollectError::Parse { .. }
            | CollectError::UpstreamRpc { .. } => ApiError::BadGateway(err.to_string()),
            CollectError::Credential(_) | CollectError::Config(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        let message = err.to_string();

        // A reachable categories service that cannot produce the cluster
        // means the caller named a cluster that does not exist.
        let unknown_cluster = err.stage == WorkflowStage::ClusterLookup
            && matches!(
                &err.source,
                CollectError::UpstreamRpc { cause, .. } if !matches!(cause, RpcFailure::Transport(_))
            );
        if unknown_cluster {
            return ApiError::NotFound(message);
        }

        match ApiError::from(err.source) {
            ApiError::BadGateway(_) => ApiError::BadGateway(message),
            ApiError::NotFound(_) => ApiError::NotFound(message),
            ApiError::Internal(_) => ApiError::Internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        error!("Request failed with {status}: {message}");

        (status, Json(json!({ "error": message }))).into_response()
    }
}

fn with_cache(cache_control: &'static str, response: impl IntoResponse) -> Response {
    (
        [(header::CACHE_CONTROL, HeaderValue::from_static(cache_control))],
        response,
    )
        .into_response()
}

async fn alive() -> Json<serde_json::Value> {
    Json(json!({ "alive": true }))
}

/// Board name to description, served exactly as configured.
async fn list_boards(State(state): State<AppState>) -> Json<TrackedBoards> {
    Json(state.tracked_boards.as_ref().clone())
}

#[derive(Debug, Deserialize)]
pub struct CatalogQuery {
    pub board_name: String,
    #[serde(default)]
    pub not_filter: bool,
}

async fn board_catalog(
    State(state): State<AppState>,
    Query(query): Query<CatalogQuery>,
) -> Result<Response, ApiError> {
    let threads = state.catalog.board_catalog(&query.board_name).await?;

    let threads: Vec<BoardCatalogThread> = if query.not_filter {
        threads
    } else {
        threads.into_iter().filter(BoardCatalogThread::is_displayable).collect()
    };

    Ok(with_cache(CATALOG_CACHE, Json(threads)))
}

#[derive(Debug, Deserialize)]
pub struct ThreadQuery {
    pub board_name: String,
    pub thread_id: String,
}

async fn thread(
    State(state): State<AppState>,
    Query(query): Query<ThreadQuery>,
) -> Result<Response, ApiError> {
    let thread: Thread = state
        .threads
        .thread_content(&query.board_name, &query.thread_id)
        .await?;

    Ok(with_cache(THREAD_CACHE, Json(thread)))
}

#[derive(Debug, Deserialize)]
pub struct MediaQuery {
    pub media_url: String,
}

/// Re-emits a remote media file so browser clients avoid cross-origin blocks.
async fn proxy_media(
    State(state): State<AppState>,
    Query(query): Query<MediaQuery>,
) -> Result<Response, ApiError> {
    let media = state
        .source_client
        .fetch(&query.media_url, FetchOptions::default())
        .await?;

    let content_type = media
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_MEDIA_TYPE));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, HeaderValue::from_static(MEDIA_CACHE)),
        ],
        media.body,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct DownloadThreadImagesBody {
    pub board_name: String,
    pub thread_uuid: String,
    pub target_category_name: String,
    pub cluster_uuid: String,
    pub parent_uuid: String,
}

async fn download_thread_images(
    State(state): State<AppState>,
    Json(body): Json<DownloadThreadImagesBody>,
) -> Result<Response, ApiError> {
    info!(
        "Download requested for thread {} on /{}/",
        body.thread_uuid, body.board_name
    );

    let request = ThreadDownloadRequest {
        board_name: body.board_name,
        thread_uuid: body.thread_uuid,
        target_category_name: body.target_category_name,
        parent_category_uuid: body.parent_uuid,
        cluster_uuid: body.cluster_uuid,
    };

    let download_uuid = state
        .orchestrator
        .request_thread_image_download(&request)
        .await?;

    Ok(with_cache(
        NO_CACHE,
        (
            StatusCode::ACCEPTED,
            Json(json!({ "download_uuid": download_uuid })),
        ),
    ))
}
