use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use doc_search_core::{
    IngestError, IngestRequest, IngestSource, RecordSource, RunManager, RunMode, RunStatus,
    SearchError, SearchHit, SearchService,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub manager: RunManager,
    pub search: SearchService,
    /// Record store used by `POST /ingest` when no path is given.
    pub records: Option<Arc<dyn RecordSource>>,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: String,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    query: String,
    hits: Vec<SearchHit>,
}

#[derive(Debug, Default, Deserialize)]
struct IngestBody {
    #[serde(default)]
    path: Option<PathBuf>,
    #[serde(default)]
    rebuild: bool,
}

#[derive(Debug, Serialize)]
struct RunAccepted {
    run_id: Uuid,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(error: IngestError) -> Self {
        let status = match error {
            IngestError::RunInProgress(_) => StatusCode::CONFLICT,
            IngestError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, error.to_string())
    }
}

impl From<SearchError> for ApiError {
    fn from(error: SearchError) -> Self {
        let status = match error {
            SearchError::Request(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(status = %self.status, error = %self.message, "request failed");
        }
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// - `GET /search?query=...` - ids of matching documents
/// - `POST /ingest` - start an ingestion run from a folder or the record store
/// - `POST /clear` - start a clear run
/// - `GET /runs/:id` - status of a run
/// - `GET /health` - liveness
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/search", get(search_handler))
        .route("/ingest", post(ingest_handler))
        .route("/clear", post(clear_handler))
        .route("/runs/:id", get(run_status_handler))
        .route("/health", get(|| async { StatusCode::OK }))
        .with_state(state)
}

pub async fn serve(bind: &str, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(bind, "http api listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                warn!(error = %error, "could not listen for shutdown signal");
            }
        })
        .await?;

    Ok(())
}

async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let hits = state.search.search(&params.query).await?;
    Ok(Json(SearchResponse {
        query: params.query,
        hits,
    }))
}

async fn ingest_handler(
    State(state): State<AppState>,
    Json(body): Json<IngestBody>,
) -> Result<(StatusCode, Json<RunAccepted>), ApiError> {
    let source = match (body.path, &state.records) {
        (Some(path), _) => IngestSource::Directory(path),
        (None, Some(records)) => IngestSource::Records(records.clone()),
        (None, None) => {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "no path given and no record manifest is configured",
            ))
        }
    };
    let mode = if body.rebuild {
        RunMode::Rebuild
    } else {
        RunMode::Append
    };

    let run_id = state.manager.start_ingest(IngestRequest::new(source, mode))?;
    Ok((StatusCode::ACCEPTED, Json(RunAccepted { run_id })))
}

async fn clear_handler(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<RunAccepted>), ApiError> {
    let run_id = state.manager.start_clear()?;
    Ok((StatusCode::ACCEPTED, Json(RunAccepted { run_id })))
}

async fn run_status_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunStatus>, ApiError> {
    state
        .manager
        .status(id)
        .map(Json)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("unknown run {id}")))
}
