use thiserror::Error;

use crate::core::config::ReportSettings;
use crate::services::aggregation::{aggregate, AggregationReport, ReportInput};
use crate::services::ownership::{owned_exam, OwnershipError};
use crate::store::GradingStore;

#[derive(Debug, Error)]
pub(crate) enum ReportError {
    #[error("exam {0} has no questions, so no report can be computed")]
    EmptyQuestions(String),
    #[error("class {0} has no students, so no report can be computed")]
    EmptyRoster(String),
    #[error("{0}")]
    Authorization(String),
    #[error("{0}")]
    NotFound(String),
    #[error("report data could not be loaded: {0:#}")]
    Persistence(anyhow::Error),
}

impl From<OwnershipError> for ReportError {
    fn from(err: OwnershipError) -> Self {
        match err {
            OwnershipError::NotFound(_) => Self::NotFound(err.to_string()),
            OwnershipError::Forbidden(_) => Self::Authorization(err.to_string()),
            OwnershipError::Store(inner) => Self::Persistence(inner),
        }
    }
}

/// Loads everything the aggregation needs for one exam and computes the report.
pub(crate) async fn exam_report(
    store: &dyn GradingStore,
    settings: ReportSettings,
    teacher_id: &str,
    exam_id: &str,
) -> Result<AggregationReport, ReportError> {
    let exam = owned_exam(store, exam_id, teacher_id).await?;

    let questions = store.questions_for_exam(&exam.id).await.map_err(ReportError::Persistence)?;
    let roster = store.students_in_class(&exam.class_id).await.map_err(ReportError::Persistence)?;
    let scores = store.scores_for_exam(&exam.id).await.map_err(ReportError::Persistence)?;

    let report = aggregate(
        ReportInput { exam: &exam, questions: &questions, roster: &roster, scores: &scores },
        settings,
    )?;

    tracing::debug!(
        exam_id = %exam.id,
        participating = report.stats.participating_students,
        registered = report.stats.registered_students,
        "Exam report computed"
    );
    Ok(report)
}
