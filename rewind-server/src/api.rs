use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
    routing::{delete, get, post},
    Router,
};
use futures::stream::{self, Stream};
use rewind_core::diff::FileDiff;
use rewind_core::{
    Checkpoint, CommitRecord, CommitSource, Error, RollbackEngine, RollbackMethod, RollbackOptions,
    RollbackPreview, RollbackResult, RollbackScope, RollbackTarget,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RollbackEngine>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/commits", get(get_commits))
        .route("/commits", post(record_commit))
        .route("/rollback/preview", post(preview_rollback))
        .route("/rollback/preview/file", post(preview_file))
        .route("/rollback/execute", post(execute_rollback))
        .route("/checkpoints", get(list_checkpoints))
        .route("/checkpoints", post(create_checkpoint))
        .route("/checkpoints/:id", get(get_checkpoint))
        .route("/checkpoints/:id", delete(delete_checkpoint))
        .route("/checkpoints/:id/rollback", post(rollback_to_checkpoint))
        .route("/progress", get(progress_stream))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Engine errors rendered as `{"error", "message", "blocking_reasons"}`.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Validation(_) | Error::NotARepository(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Blocked { .. } | Error::Busy(_) | Error::Conflict { .. } | Error::Cancelled => {
            StatusCode::CONFLICT
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            warn!("request failed: {}", self.0);
        }
        let blocking_reasons = match &self.0 {
            Error::Blocked { reasons } => reasons.clone(),
            _ => Vec::new(),
        };
        let body = serde_json::json!({
            "error": self.0.kind(),
            "message": self.0.to_string(),
            "blocking_reasons": blocking_reasons,
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

#[derive(Deserialize)]
struct CwdQuery {
    cwd: PathBuf,
}

#[derive(Deserialize)]
struct CommitsQuery {
    cwd: PathBuf,
    issue: u64,
    phase: Option<u32>,
}

async fn get_commits(
    State(state): State<AppState>,
    Query(query): Query<CommitsQuery>,
) -> ApiResult<Vec<CommitRecord>> {
    let commits = match query.phase {
        Some(phase) => {
            state
                .engine
                .get_commits_for_phase(&query.cwd, query.issue, phase)
                .await?
        }
        None => state.engine.get_commits_for_issue(&query.cwd, query.issue).await?,
    };
    Ok(Json(commits))
}

#[derive(Deserialize)]
struct RecordCommitRequest {
    cwd: PathBuf,
    /// When absent the current `HEAD` is recorded.
    commit_hash: Option<String>,
    issue_number: u64,
    phase_number: Option<u32>,
    message: Option<String>,
    source: Option<CommitSource>,
    #[serde(default)]
    parent_hashes: Vec<String>,
}

#[derive(Serialize)]
struct RecordCommitResponse {
    recorded: bool,
    commit: CommitRecord,
}

async fn record_commit(
    State(state): State<AppState>,
    Json(req): Json<RecordCommitRequest>,
) -> ApiResult<RecordCommitResponse> {
    let source = req.source.unwrap_or(CommitSource::SelfOriginated);

    let Some(hash) = req.commit_hash else {
        let (commit, recorded) = state
            .engine
            .record_head_commit(&req.cwd, req.issue_number, req.phase_number, source)
            .await?;
        return Ok(Json(RecordCommitResponse { recorded, commit }));
    };

    let mut record = CommitRecord::new(hash, req.issue_number, req.message.unwrap_or_default())
        .with_source(source)
        .with_parents(req.parent_hashes);
    if let Some(phase) = req.phase_number {
        record = record.with_phase(phase);
    }

    let (commit, recorded) = state.engine.record_commit(&req.cwd, record).await?;
    Ok(Json(RecordCommitResponse { recorded, commit }))
}

#[derive(Deserialize)]
struct PreviewRequest {
    cwd: PathBuf,
    scope: RollbackScope,
    #[serde(default)]
    target: RollbackTarget,
    #[serde(default)]
    method: RollbackMethod,
}

#[derive(Serialize)]
struct PreviewResponse {
    #[serde(flatten)]
    preview: RollbackPreview,
    fingerprint: String,
}

async fn preview_rollback(
    State(state): State<AppState>,
    Json(req): Json<PreviewRequest>,
) -> ApiResult<PreviewResponse> {
    let preview = state
        .engine
        .preview_rollback_with_method(req.scope, &req.target, req.method, &req.cwd)
        .await?;
    let fingerprint = preview.fingerprint();
    Ok(Json(PreviewResponse { preview, fingerprint }))
}

#[derive(Deserialize)]
struct FilePreviewRequest {
    cwd: PathBuf,
    scope: RollbackScope,
    #[serde(default)]
    target: RollbackTarget,
    path: String,
}

async fn preview_file(
    State(state): State<AppState>,
    Json(req): Json<FilePreviewRequest>,
) -> ApiResult<FileDiff> {
    let diff = state
        .engine
        .preview_file(req.scope, &req.target, &req.path, &req.cwd)
        .await?;
    Ok(Json(diff))
}

#[derive(Deserialize)]
struct ExecuteRequest {
    cwd: PathBuf,
    scope: RollbackScope,
    #[serde(default)]
    target: RollbackTarget,
    #[serde(default)]
    options: RollbackOptions,
}

async fn execute_rollback(
    State(state): State<AppState>,
    Json(req): Json<ExecuteRequest>,
) -> ApiResult<RollbackResult> {
    let result = state
        .engine
        .execute_rollback(req.scope, &req.target, req.options, &req.cwd)
        .await?;
    Ok(Json(result))
}

async fn list_checkpoints(
    State(state): State<AppState>,
    Query(query): Query<CwdQuery>,
) -> ApiResult<Vec<Checkpoint>> {
    Ok(Json(state.engine.list_checkpoints(&query.cwd).await?))
}

#[derive(Deserialize)]
struct CreateCheckpointRequest {
    cwd: PathBuf,
    name: String,
    issue_number: Option<u64>,
    description: Option<String>,
}

async fn create_checkpoint(
    State(state): State<AppState>,
    Json(req): Json<CreateCheckpointRequest>,
) -> ApiResult<Checkpoint> {
    let checkpoint = state
        .engine
        .create_checkpoint(&req.name, req.issue_number, &req.cwd, req.description)
        .await?;
    Ok(Json(checkpoint))
}

async fn get_checkpoint(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<CwdQuery>,
) -> ApiResult<Checkpoint> {
    Ok(Json(state.engine.get_checkpoint(&id, &query.cwd).await?))
}

async fn delete_checkpoint(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<CwdQuery>,
) -> ApiResult<Checkpoint> {
    Ok(Json(state.engine.delete_checkpoint(&id, &query.cwd).await?))
}

#[derive(Deserialize)]
struct CheckpointRollbackRequest {
    cwd: PathBuf,
    #[serde(default)]
    options: RollbackOptions,
}

async fn rollback_to_checkpoint(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CheckpointRollbackRequest>,
) -> ApiResult<RollbackResult> {
    let result = state
        .engine
        .rollback_to_checkpoint(&id, req.options, &req.cwd)
        .await?;
    Ok(Json(result))
}

/// Server-sent `progress` events for one project path.
async fn progress_stream(
    State(state): State<AppState>,
    Query(query): Query<CwdQuery>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    debug!("progress subscriber for {}", query.cwd.display());
    let rx = state.engine.subscribe_progress(&query.cwd);

    let events = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(progress) => {
                    let event = Event::default().event("progress").json_data(&progress);
                    return Some((event, rx));
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("progress subscriber skipped {} event(s)", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
