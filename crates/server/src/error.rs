// crates/server/src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use scanwatch_core::{ReportError, SubmissionError};
use serde::Serialize;
use thiserror::Error;
use ts_rs::TS;

/// Structured JSON error response for API errors
#[derive(Debug, Serialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("No job for subject: {0}")]
    NoJob(String),

    #[error("Submission error: {0}")]
    Submission(#[from] SubmissionError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::BadRequest(msg) => {
                tracing::warn!(message = %msg, "Bad request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Bad request", msg.clone()),
                )
            }
            ApiError::NoJob(subject) => {
                tracing::debug!(subject = %subject, "No in-flight job");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("No in-flight job", format!("Subject: {subject}")),
                )
            }
            ApiError::Submission(err) => match err {
                SubmissionError::InvalidSubject(_) => {
                    tracing::warn!(error = %err, "Invalid subject");
                    (
                        StatusCode::BAD_REQUEST,
                        ErrorResponse::with_details("Invalid subject", err.to_string()),
                    )
                }
                _ => {
                    tracing::error!(error = %err, "Submission failed");
                    (
                        StatusCode::BAD_GATEWAY,
                        ErrorResponse::with_details("Submission failed", err.detail()),
                    )
                }
            },
            ApiError::Report(err) => {
                let (status, error_msg) = match err {
                    ReportError::NotFound(what) => {
                        tracing::debug!(what = %what, "Report not found");
                        (StatusCode::NOT_FOUND, "Scan not found")
                    }
                    ReportError::Unreachable(_) => {
                        tracing::error!(error = %err, "Scan backend unreachable");
                        (StatusCode::BAD_GATEWAY, "Scan backend unreachable")
                    }
                    ReportError::Status { status, .. } => {
                        tracing::error!(backend_status = status, error = %err, "Scan backend error");
                        (StatusCode::BAD_GATEWAY, "Scan backend error")
                    }
                    ReportError::Rejected(message) => {
                        tracing::warn!(message = %message, "Backend declined request");
                        (StatusCode::UNPROCESSABLE_ENTITY, "Backend declined request")
                    }
                    ReportError::Malformed(_) => {
                        tracing::error!(error = %err, "Malformed backend response");
                        (StatusCode::BAD_GATEWAY, "Malformed backend response")
                    }
                };
                (status, ErrorResponse::with_details(error_msg, err.to_string()))
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
