mod submission;

use crate::error::{AppError, AppResult};
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use bytes::Bytes;
use joblib::errors::JobError;
use joblib::types::{Args, Artifact, JobId, Timestamp};
use joblib::{JobEngine, JobRecord, JobStatus};
use serde::Serialize;
use serde_json::json;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Shared state of the job routes. Cloning is cheap, the engine is a handle.
#[derive(Clone)]
pub struct JobService {
    engine: JobEngine,
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    id: JobId,
    status_url: String,
    result_url: String,
    log_url: String,
}

#[derive(Debug, Serialize)]
struct JobSummary {
    id: JobId,
    args: Args,
    status: JobStatus,
    result_url: String,
    log_url: String,
    enqueued_at: Timestamp,
}

/// The HTTP surface of the engine.
///
/// ```text
/// GET  /health
/// POST /jobs              -> submit_job
/// GET  /jobs              -> list_jobs
/// GET  /jobs/{id}/status  -> job_status
/// GET  /jobs/{id}/result  -> job_result
/// GET  /jobs/{id}/log     -> job_log
/// PUT  /jobs/{id}/cancel  -> cancel_job
/// ```
pub fn router(engine: JobEngine) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/jobs", get(list_jobs).post(submit_job))
        .route("/jobs/{id}/status", get(job_status))
        .route("/jobs/{id}/result", get(job_result))
        .route("/jobs/{id}/log", get(job_log))
        .route("/jobs/{id}/cancel", put(cancel_job))
        .with_state(JobService { engine })
}

async fn submit_job(State(service): State<JobService>, body: Bytes) -> AppResult<Json<SubmitResponse>> {
    let submission = submission::parse_submission(body)?;
    let record = service.engine.submit(submission).await?;
    let links = service.engine.links();
    Ok(Json(SubmitResponse {
        id: record.id,
        status_url: links.status_url(record.id),
        result_url: links.result_url(record.id),
        log_url: links.log_url(record.id),
    }))
}

async fn list_jobs(State(service): State<JobService>) -> AppResult<Json<Vec<JobSummary>>> {
    let links = service.engine.links();
    let jobs = service
        .engine
        .list()
        .await?
        .into_iter()
        .map(|record| JobSummary {
            id: record.id,
            result_url: links.result_url(record.id),
            log_url: links.log_url(record.id),
            args: record.args,
            status: record.status,
            enqueued_at: record.enqueued_at,
        })
        .collect();
    Ok(Json(jobs))
}

async fn job_status(
    State(service): State<JobService>,
    Path(id): Path<String>,
) -> AppResult<Json<JobRecord>> {
    let id = parse_job_id(&id)?;
    Ok(Json(service.engine.status(id).await?))
}

async fn job_result(
    State(service): State<JobService>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let id = parse_job_id(&id)?;
    let artifact = service.engine.result(id).await?;
    stream_artifact(id, artifact).await
}

async fn job_log(State(service): State<JobService>, Path(id): Path<String>) -> AppResult<Response> {
    let id = parse_job_id(&id)?;
    let artifact = service.engine.log(id).await?;
    stream_artifact(id, artifact).await
}

/// Always 200: canceling a job that is not running is a no-op.
async fn cancel_job(
    State(service): State<JobService>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    if let Ok(id) = parse_job_id(&id) {
        service.engine.cancel(id).await?;
    }
    Ok(StatusCode::OK)
}

async fn health(State(service): State<JobService>) -> AppResult<impl IntoResponse> {
    let running = service.engine.running_count().await?;
    Ok(Json(json!({
        "status": "ok",
        "running_jobs": running,
    })))
}

fn parse_job_id(raw: &str) -> AppResult<JobId> {
    Uuid::parse_str(raw).map_err(|_| AppError::UnknownJob(raw.to_string()))
}

async fn stream_artifact(id: JobId, artifact: Artifact) -> AppResult<Response> {
    let file = match tokio::fs::File::open(&artifact.path).await {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(JobError::NotFound(id).into())
        }
        Err(err) => return Err(JobError::from(err).into()),
    };
    // records written before mime types were checked may hold unusable values
    let content_type = artifact
        .mime_type
        .as_deref()
        .and_then(|mime| HeaderValue::from_str(mime).ok())
        .unwrap_or_else(|| HeaderValue::from_static(TEXT_PLAIN));
    let body = Body::from_stream(ReaderStream::new(file));
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}
