use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;

use super::models::ErrorResponse;
use crate::error::MigrationError;
use crate::jobs::JobServiceError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("payload invalid: {0}")]
    InvalidPayload(String),
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),
    #[error("{0}")]
    InvalidJob(String),
    #[error("{0}")]
    InvalidCredentials(String),
    #[error("{0}")]
    CatalogUnavailable(String),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::InvalidJob(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::InvalidCredentials(_) => StatusCode::BAD_REQUEST,
            ApiError::CatalogUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidPayload(_) => "INVALID_PAYLOAD",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::InvalidJob(_) => "INVALID_JOB",
            ApiError::InvalidCredentials(_) => "INVALID_CREDENTIALS",
            ApiError::CatalogUnavailable(_) => "CATALOG_UNAVAILABLE",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code(),
            message: self.to_string(),
        };

        (status, Json(json!(body))).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(value: serde_json::Error) -> Self {
        ApiError::InvalidPayload(value.to_string())
    }
}

impl From<MigrationError> for ApiError {
    fn from(value: MigrationError) -> Self {
        match value {
            MigrationError::InvalidCredentials(_) => ApiError::InvalidCredentials(value.to_string()),
            MigrationError::InvalidJob(_) => ApiError::InvalidJob(value.to_string()),
            MigrationError::CatalogUnavailable(_) => ApiError::CatalogUnavailable(value.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<JobServiceError> for ApiError {
    fn from(value: JobServiceError) -> Self {
        match value {
            JobServiceError::NotFound(job_id) => ApiError::NotFound(format!("job {job_id}")),
            JobServiceError::NotFinished(_) | JobServiceError::AlreadyFinished(_) => {
                ApiError::Conflict(value.to_string())
            }
            JobServiceError::Rejected(err) => err.into(),
        }
    }
}
