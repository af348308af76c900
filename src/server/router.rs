use axum::extract::{Path, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use cartwright_core_types::{ChatId, Job, JobId};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use super::state::ServeState;
use crate::errors::CartError;

pub fn build_router(state: ServeState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/jobs", post(create_job_handler))
        .route("/jobs/:job_id", get(get_job_handler))
        .route("/jobs/:job_id/resume", post(resume_job_handler))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Maps domain errors to status codes.
struct ApiError(CartError);

impl From<CartError> for ApiError {
    fn from(err: CartError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CartError::NoItems(_) => StatusCode::BAD_REQUEST,
            CartError::JobNotFound(_) => StatusCode::NOT_FOUND,
            CartError::NotResumable { .. } => StatusCode::CONFLICT,
            other => {
                error!(target: "server", error = %other, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

fn job_body(job: &Job) -> Value {
    json!({
        "job_id": job.job_id,
        "chat_id": job.chat_id,
        "status": job.status,
        "result_url": job.result_url,
        "error": job.error,
        "screenshot_path": job.screenshot_path,
        "created_at": job.created_at,
        "updated_at": job.updated_at,
    })
}

async fn health_handler(State(state): State<ServeState>) -> Json<Value> {
    let health = state.health.snapshot();
    let metrics = state.scheduler.metrics();
    Json(json!({
        "status": "ok",
        "live": health.live,
        "ready": health.ready,
        "last_error": health.last_error,
        "scheduler": {
            "running": state.scheduler.is_running(),
            "in_flight": state.scheduler.registry().in_flight(),
            "polls": metrics.polls,
            "dispatched": metrics.dispatched,
            "duplicates": metrics.duplicates,
            "finished": metrics.finished,
            "reclaimed": metrics.reclaimed,
        },
    }))
}

#[derive(Debug, Deserialize)]
struct CreateJobRequest {
    chat_id: String,
}

async fn create_job_handler(
    State(state): State<ServeState>,
    Json(request): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let job = state.desk.create_job(&ChatId::new(request.chat_id)).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "job_id": job.job_id, "status": job.status })),
    ))
}

async fn get_job_handler(
    State(state): State<ServeState>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let job = state.desk.job(&JobId::from(job_id.as_str())).await?;
    Ok(Json(job_body(&job)))
}

async fn resume_job_handler(
    State(state): State<ServeState>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let job = state.lifecycle.resume(&JobId::from(job_id.as_str())).await?;
    Ok(Json(json!({ "job_id": job.job_id, "status": job.status })))
}
