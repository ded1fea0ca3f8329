use axum::extract::{Path, State};
use axum::Json;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentTeacher;
use crate::core::state::AppState;
use crate::services::aggregation::AggregationReport;
use crate::services::reports;

pub(in crate::api::exams) async fn exam_report(
    Path(exam_id): Path<String>,
    CurrentTeacher(teacher_id): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<Json<AggregationReport>, ApiError> {
    let report =
        reports::exam_report(state.store(), *state.settings().report(), &teacher_id, &exam_id)
            .await?;
    Ok(Json(report))
}
