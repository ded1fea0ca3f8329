use axum::extract::{Path, State};
use axum::http::StatusCode;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentTeacher;
use crate::core::state::AppState;
use crate::services::ownership::owned_exam;

pub(in crate::api::exams) async fn delete_exam(
    Path(exam_id): Path<String>,
    CurrentTeacher(teacher_id): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let exam = owned_exam(state.store(), &exam_id, &teacher_id).await?;

    state
        .store()
        .delete_exam(&exam.id)
        .await
        .map_err(|e| ApiError::internal(format!("{e:#}"), "Failed to delete exam"))?;

    tracing::info!(exam_id = %exam.id, teacher_id = %teacher_id, "Exam deleted with scores, questions and papers");
    Ok(StatusCode::NO_CONTENT)
}
