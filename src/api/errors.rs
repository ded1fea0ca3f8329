use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::ownership::OwnershipError;
use crate::services::reports::ReportError;
use crate::services::score_store::ScoreError;
use crate::tasks::analysis::{AnalysisError, AnalysisSummary};

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<AnalysisSummary>,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden(String),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    PayloadTooLarge(String),
    /// The run completed but produced nothing usable; the summary is returned as-is.
    Unprocessable(Box<AnalysisSummary>),
    /// The run stopped on a write failure; the partial summary is returned.
    RunAborted(Box<AnalysisSummary>),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }
}

fn error_response(status: StatusCode, detail: String, summary: Option<AnalysisSummary>) -> Response {
    (status, Json(ErrorResponse { status: status.as_u16(), detail, summary })).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(message) => {
                error_response(StatusCode::UNAUTHORIZED, message.to_string(), None)
            }
            ApiError::Forbidden(message) => error_response(StatusCode::FORBIDDEN, message, None),
            ApiError::BadRequest(message) => error_response(StatusCode::BAD_REQUEST, message, None),
            ApiError::NotFound(message) => error_response(StatusCode::NOT_FOUND, message, None),
            ApiError::Conflict(message) => error_response(StatusCode::CONFLICT, message, None),
            ApiError::PayloadTooLarge(message) => {
                error_response(StatusCode::PAYLOAD_TOO_LARGE, message, None)
            }
            ApiError::Unprocessable(summary) => {
                let detail = summary.message.clone();
                error_response(StatusCode::UNPROCESSABLE_ENTITY, detail, Some(*summary))
            }
            ApiError::RunAborted(summary) => {
                let detail = summary.message.clone();
                error_response(StatusCode::INTERNAL_SERVER_ERROR, detail, Some(*summary))
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, message, None)
            }
        }
    }
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::Validation(message) => Self::BadRequest(message),
            AnalysisError::Authorization(message) => Self::Forbidden(message),
            AnalysisError::NotFound(message) => Self::NotFound(message),
            AnalysisError::RunInProgress(message) => Self::Conflict(message),
            AnalysisError::NothingUsable(summary) => Self::Unprocessable(summary),
            AnalysisError::Persistence(message) => Self::internal(message, "Analysis run failed"),
            AnalysisError::WriteFailed { detail, summary } => {
                tracing::error!(exam_id = %summary.exam_id, error = %detail, "Analysis run aborted");
                Self::RunAborted(summary)
            }
        }
    }
}

impl From<OwnershipError> for ApiError {
    fn from(err: OwnershipError) -> Self {
        match err {
            OwnershipError::NotFound(_) => Self::NotFound(err.to_string()),
            OwnershipError::Forbidden(_) => Self::Forbidden(err.to_string()),
            OwnershipError::Store(inner) => Self::internal(format!("{inner:#}"), "Failed to load exam"),
        }
    }
}

impl From<ScoreError> for ApiError {
    fn from(err: ScoreError) -> Self {
        match err {
            ScoreError::Validation(message) => Self::BadRequest(message),
            ScoreError::Authorization(message) => Self::Forbidden(message),
            ScoreError::NotFound(message) => Self::NotFound(message),
            ScoreError::Persistence(err) => Self::internal(format!("{err:#}"), "Score update failed"),
        }
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        match err {
            ReportError::EmptyQuestions(_) | ReportError::EmptyRoster(_) => {
                Self::BadRequest(err.to_string())
            }
            ReportError::Authorization(message) => Self::Forbidden(message),
            ReportError::NotFound(message) => Self::NotFound(message),
            ReportError::Persistence(err) => {
                Self::internal(format!("{err:#}"), "Failed to build exam report")
            }
        }
    }
}
