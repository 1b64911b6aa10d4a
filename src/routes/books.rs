//! Coloring book job API
//!
//! - Submit a generation job
//! - Poll its status
//! - List jobs by owner
//! - Cancel a job
//! - Download the finished PDF

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, StatusCode},
    response::Response,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::book::PDF_CONTENT_TYPE;
use crate::error::{AppError, Result};
use crate::jobs::{JobStatusView, JobSummary, SubmitRequest, DEFAULT_OWNER};
use crate::state::AppState;

/// Inline data URIs make request bodies large
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub owner_id: Option<String>,
}

/// Create the books router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_jobs).post(submit_job))
        .route("/:job_id", get(job_status).delete(cancel_job))
        .route("/:job_id/download", get(download_book))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}

async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<JobStatusView>)> {
    let view = state.tracker().submit(request).await?;
    Ok((StatusCode::ACCEPTED, Json(view)))
}

async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<JobSummary>>> {
    let owner_id = query.owner_id.as_deref().unwrap_or(DEFAULT_OWNER);
    Ok(Json(state.tracker().list_jobs(owner_id).await?))
}

async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusView>> {
    Ok(Json(state.tracker().get_status(&job_id).await?))
}

async fn cancel_job(State(state): State<AppState>, Path(job_id): Path<String>) -> Result<StatusCode> {
    state.tracker().cancel(&job_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn download_book(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Response> {
    let download = state.tracker().download(&job_id).await?;
    let size = download.data.len();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, PDF_CONTENT_TYPE)
        .header(header::CONTENT_LENGTH, size)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}.pdf\"", file_stem(&download.title)),
        )
        .body(Body::from(download.data))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}

/// Header-safe file name derived from a book title
fn file_stem(title: &str) -> String {
    let stem: String = title
        .trim()
        .chars()
        .map(|c| match c {
            c if c.is_ascii_alphanumeric() || c == '-' || c == '_' => c,
            _ => '-',
        })
        .collect();

    let stem = stem
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    if stem.is_empty() {
        "coloring-book".to_string()
    } else {
        stem
    }
}
