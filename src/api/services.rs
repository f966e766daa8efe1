use axum::{Json, extract::State, http::HeaderMap, http::StatusCode, response::IntoResponse};
use http_body_util::BodyExt;

use super::{
    models::{
        FileInfo, FileListResponse, HealthResponse, HistoryResponse, JobAcceptedResponse,
        JobListResponse, SubmitRequest,
    },
    state::AppState,
};
use crate::api::error::ApiError;
use crate::humanize::ByteSize;

/// Job submission endpoint (POST /jobs)
///
/// Validates the Content-Type and payload size, parses the submission
/// and hands the locator to the coordinator. Acquisition is
/// asynchronous: the response carries the job id and the initial
/// `queued` status, everything else is observed via `GET /jobs/{id}`.
///
/// ## Flow:
/// 1. Validate Content-Type (application/json, charset allowed)
/// 2. Read the body (decompression handled by middleware), enforce the
///    configured size limit
/// 3. Deserialize the submission; `mode` and `quality` are optional
/// 4. Validate the locator and register the job (coordinator)
/// 5. Return 202 Accepted with the job id
pub async fn submit_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    require_json(&headers)?;

    let max_payload = state.config.server.max_payload_bytes.as_u64() as usize;
    let body_bytes = read_body(body, max_payload).await?;

    let request: SubmitRequest = serde_json::from_slice(&body_bytes)?;
    let job = state
        .coordinator
        .submit(&request.locator, request.mode, request.quality)
        .await?;

    let response = JobAcceptedResponse {
        job_id: job.id,
        status: job.status.to_string(),
    };
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Job status endpoint (GET /jobs/{job_id})
///
/// Returns the current job snapshot: status, progress, title, result
/// path or error detail, and child job ids for collections.
pub async fn get_job(
    State(state): State<AppState>,
    axum::extract::Path(job_id): axum::extract::Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.coordinator.job(&job_id).await?;
    Ok((StatusCode::OK, Json(job)))
}

/// Job listing endpoint (GET /jobs)
pub async fn list_jobs(State(state): State<AppState>) -> impl IntoResponse {
    let jobs = state.coordinator.jobs().await;
    (StatusCode::OK, Json(JobListResponse { jobs }))
}

/// Cancellation endpoint (POST /jobs/{job_id}/cancel)
///
/// Idempotent: canceling an already-terminal job returns the
/// unchanged snapshot with 200.
pub async fn cancel_job(
    State(state): State<AppState>,
    axum::extract::Path(job_id): axum::extract::Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.coordinator.cancel(&job_id).await?;
    Ok((StatusCode::OK, Json(job)))
}

/// Job removal endpoint (DELETE /jobs/{job_id})
///
/// Cancels the job if still running, removes the record (and child
/// records for collections) and best-effort deletes artifacts.
pub async fn delete_job(
    State(state): State<AppState>,
    axum::extract::Path(job_id): axum::extract::Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.coordinator.delete(&job_id).await?;
    Ok((StatusCode::OK, Json(job)))
}

/// History endpoint (GET /history)
///
/// Returns the durable download history, oldest first.
pub async fn get_history(State(state): State<AppState>) -> impl IntoResponse {
    let entries = state.coordinator.history_entries().await;
    (StatusCode::OK, Json(HistoryResponse { entries }))
}

/// History truncation endpoint (DELETE /history)
pub async fn clear_history(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    state.coordinator.clear_history().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Download directory listing (GET /files)
///
/// Lists finished artifacts with humanized sizes. In-progress
/// temporaries (`.part`, `.tmp`, `.ytdl`) are skipped.
pub async fn list_files(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let dir = state.coordinator.download_dir();
    let mut files = Vec::new();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok((StatusCode::OK, Json(FileListResponse { files })));
        }
        Err(err) => return Err(ApiError::Internal(err.to_string())),
    };

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".part") || name.ends_with(".tmp") || name.ends_with(".ytdl") {
            continue;
        }
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let modified_at = metadata
            .modified()
            .ok()
            .map(chrono::DateTime::<chrono::Utc>::from);
        files.push(FileInfo {
            name,
            size: ByteSize(metadata.len()).to_human_readable(),
            size_bytes: metadata.len(),
            modified_at,
        });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));

    Ok((StatusCode::OK, Json(FileListResponse { files })))
}

/// Health check endpoint (GET /health)
///
/// Returns health status of the service components. The history
/// component degrades once an append has failed since startup.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    use std::collections::HashMap;

    let mut components = HashMap::new();
    components.insert("api".to_string(), "healthy".to_string());
    components.insert("coordinator".to_string(), "healthy".to_string());
    components.insert("history".to_string(), "healthy".to_string());

    let snapshot = state.metrics.snapshot();
    if snapshot.history_append_failures > 0 {
        components.insert("history".to_string(), "degraded".to_string());
    }

    let all_healthy = components.values().all(|status| status == "healthy");
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy { "healthy" } else { "degraded" }.to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (status_code, Json(response))
}

/// The submission payload must be JSON. A `charset` parameter is
/// tolerated; other media types (including `text/json` and
/// `+json` suffixes) are rejected before the body is read.
fn require_json(headers: &HeaderMap) -> Result<(), ApiError> {
    let value = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidPayload("missing Content-Type header".into()))?;
    let media_type: mime::Mime = value
        .parse()
        .map_err(|_| ApiError::InvalidPayload(format!("invalid Content-Type: {value}")))?;
    if media_type.type_() != mime::APPLICATION || media_type.subtype() != mime::JSON {
        return Err(ApiError::InvalidPayload(format!(
            "Content-Type must be application/json, got: {}",
            media_type.essence_str()
        )));
    }
    Ok(())
}

/// Reads the request body and enforces the configured size limit.
/// Decompression already happened in the RequestDecompressionLayer,
/// so the limit applies to the decompressed payload.
async fn read_body(body: axum::body::Body, max_size: usize) -> Result<Vec<u8>, ApiError> {
    let data = body
        .collect()
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?
        .to_bytes();

    if data.len() > max_size {
        return Err(ApiError::PayloadTooLarge(data.len()));
    }
    Ok(data.to_vec())
}
