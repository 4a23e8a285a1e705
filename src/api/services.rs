use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::{
    models::{
        CancelResponse, CatalogRequest, CatalogResponse, HealthResponse, JobAcceptedResponse,
        JobDetails, JobRequest,
    },
    state::AppState,
    utils::parse_job_id,
    validation::{JobRequestValidationError, into_job_spec, validate_job_request},
};
use crate::api::error::ApiError;
use crate::credentials::ResolvedCredentials;
use crate::error::MigrationError;

/// Job submission endpoint (POST /jobs)
///
/// ## Flow:
/// 1. Validate Content-Type, read body (gzip already decoded), enforce size limit
/// 2. Deserialize and shape-check the [`JobRequest`]
/// 3. Fill absent credentials from the configured defaults
/// 4. Hand the job to the job service, which validates credentials and the
///    selection synchronously before spawning the run
/// 5. Return 202 Accepted with the job id
///
/// Rejected jobs never touch a backend.
pub async fn submit_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let request: JobRequest = read_json(&state, &headers, body).await?;
    validate_job_request(&request).map_err(map_request_error)?;

    let spec = into_job_spec(request, &state.config.credentials).map_err(map_request_error)?;
    let job_id = state.jobs.start_job(spec)?;
    let summary = state.jobs.summary(job_id)?;

    info!(%job_id, "Job submitted over HTTP");

    let response = JobAcceptedResponse {
        job_id,
        source_project: summary.source_project,
        target_project: summary.target_project,
    };

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Maps request validation errors to API errors
fn map_request_error(err: JobRequestValidationError) -> ApiError {
    match err {
        JobRequestValidationError::MissingTarget => ApiError::InvalidCredentials(err.to_string()),
        other => ApiError::InvalidPayload(other.to_string()),
    }
}

/// Job listing endpoint (GET /jobs)
pub async fn list_jobs(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.jobs.list_jobs())
}

/// Job status endpoint (GET /jobs/{job_id})
///
/// Summary, live progress and, once terminal, the final result.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job_id = parse_job_id(&job_id)?;

    let details = JobDetails {
        summary: state.jobs.summary(job_id)?,
        progress: state.jobs.get_progress(job_id)?,
        result: state.jobs.get_result(job_id).ok(),
    };

    Ok(Json(details))
}

/// Progress endpoint (GET /jobs/{job_id}/progress)
pub async fn get_progress(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job_id = parse_job_id(&job_id)?;
    Ok(Json(state.jobs.get_progress(job_id)?))
}

/// Result endpoint (GET /jobs/{job_id}/result)
///
/// 409 Conflict while the job is still running.
pub async fn get_result(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job_id = parse_job_id(&job_id)?;
    Ok(Json(state.jobs.get_result(job_id)?))
}

/// Cancellation endpoint (POST /jobs/{job_id}/cancel)
///
/// Returns 202; the job reaches `cancelled` once in-flight batches drain.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job_id = parse_job_id(&job_id)?;
    state.jobs.cancel(job_id)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(CancelResponse {
            job_id,
            cancelling: true,
        }),
    ))
}

/// Collection catalog endpoint (POST /catalog/collections)
pub async fn list_collections(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let creds = catalog_credentials(&state, &headers, body).await?;

    let items = state
        .jobs
        .orchestrator()
        .catalog()
        .list_collections(&creds)
        .await?;

    Ok(Json(CatalogResponse {
        project_id: creds.project_id().to_string(),
        items,
    }))
}

/// Blob prefix catalog endpoint (POST /catalog/prefixes)
pub async fn list_prefixes(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let creds = catalog_credentials(&state, &headers, body).await?;

    let items = state
        .jobs
        .orchestrator()
        .catalog()
        .list_blob_prefixes(&creds)
        .await?;

    Ok(Json(CatalogResponse {
        project_id: creds.project_id().to_string(),
        items,
    }))
}

/// Resolve the project to browse: request credentials, then the configured
/// source credentials, then the ambient project. An empty body is allowed.
async fn catalog_credentials(
    state: &AppState,
    headers: &HeaderMap,
    body: axum::body::Body,
) -> Result<ResolvedCredentials, ApiError> {
    let bytes = read_body(state, body).await?;
    let request = if bytes.is_empty() {
        CatalogRequest::default()
    } else {
        check_content_type(headers)?;
        serde_json::from_slice(&bytes)?
    };

    let explicit = request
        .credentials
        .or_else(|| state.config.credentials.source.clone());

    let resolved = state
        .jobs
        .orchestrator()
        .resolver()
        .resolve(explicit.as_ref())
        .map_err(MigrationError::from)?;

    debug!(project_id = resolved.project_id(), "Catalog request resolved");
    Ok(resolved)
}

/// Validates Content-Type, reads the body and deserializes it as JSON
async fn read_json<T: DeserializeOwned>(
    state: &AppState,
    headers: &HeaderMap,
    body: axum::body::Body,
) -> Result<T, ApiError> {
    check_content_type(headers)?;
    let bytes = read_body(state, body).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn check_content_type(headers: &HeaderMap) -> Result<(), ApiError> {
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidPayload("missing Content-Type header".into()))?;

    super::utils::parse_content_type(content_type)?;
    Ok(())
}

/// Reads request body and validates size
///
/// Decompression is handled by `RequestDecompressionLayer`, so the limit
/// applies to the decoded payload.
async fn read_body(state: &AppState, body: axum::body::Body) -> Result<Vec<u8>, ApiError> {
    let data = body
        .collect()
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?
        .to_bytes()
        .to_vec();

    super::utils::validate_body_size(&data, state.config.server.api.max_payload_bytes.as_usize())?;

    Ok(data)
}

/// Health check endpoint (GET /health)
///
/// Reports the service version, the number of known jobs and the job counters.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        jobs: state.jobs.list_jobs().len(),
        metrics: state.metrics.snapshot(),
    };

    (StatusCode::OK, Json(response))
}
