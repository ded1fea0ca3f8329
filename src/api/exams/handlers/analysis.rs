use axum::extract::{Path, State};
use axum::Json;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentTeacher;
use crate::core::state::AppState;
use crate::schemas::analysis::AnalysisRunRequest;
use crate::tasks::analysis::{AnalysisRequest, AnalysisSummary};

/// Spawned so the run continues, and releases its lease, even if the client
/// disconnects. The response is the run summary.
pub(in crate::api::exams) async fn run_analysis(
    Path(exam_id): Path<String>,
    CurrentTeacher(teacher_id): CurrentTeacher,
    State(state): State<AppState>,
    Json(payload): Json<AnalysisRunRequest>,
) -> Result<Json<AnalysisSummary>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let request = AnalysisRequest { exam_id, teacher_id, scope: payload.scope() };
    let driver = state.analysis_driver();
    let summary = tokio::spawn(async move { driver.run(request).await })
        .await
        .map_err(|err| ApiError::internal(err, "Analysis run panicked"))??;

    Ok(Json(summary))
}
