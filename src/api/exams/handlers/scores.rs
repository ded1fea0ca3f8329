use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::Json;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentTeacher;
use crate::core::state::AppState;
use crate::schemas::score::{BulkDeleteResponse, ScoreUpdateRequest, ScoreUpdateResponse};
use crate::services::score_store::{self, ManualScore};

pub(in crate::api::exams) async fn list_scores(
    Path(exam_id): Path<String>,
    CurrentTeacher(teacher_id): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, f64>>, ApiError> {
    let scores = score_store::exam_scores(state.store(), &teacher_id, &exam_id).await?;
    Ok(Json(scores))
}

pub(in crate::api::exams) async fn update_score(
    Path(exam_id): Path<String>,
    CurrentTeacher(teacher_id): CurrentTeacher,
    State(state): State<AppState>,
    Json(payload): Json<ScoreUpdateRequest>,
) -> Result<Json<ScoreUpdateResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let edit = score_store::set_manual_score(
        state.store(),
        ManualScore {
            teacher_id: &teacher_id,
            exam_id: &exam_id,
            student_id: &payload.student_id,
            question_id: &payload.question_id,
            value: payload.score,
        },
    )
    .await?;

    Ok(Json(ScoreUpdateResponse::new(payload.student_id, payload.question_id, edit)))
}

pub(in crate::api::exams) async fn clear_student_scores(
    Path((exam_id, student_id)): Path<(String, String)>,
    CurrentTeacher(teacher_id): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<Json<BulkDeleteResponse>, ApiError> {
    let removed =
        score_store::delete_student_scores(state.store(), &teacher_id, &exam_id, &student_id)
            .await?;

    Ok(Json(BulkDeleteResponse { student_id, removed }))
}
