use thiserror::Error;

use crate::db::models::Exam;
use crate::store::GradingStore;

#[derive(Debug, Error)]
pub(crate) enum OwnershipError {
    #[error("exam {0} not found")]
    NotFound(String),
    #[error("exam {0} belongs to another teacher")]
    Forbidden(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Loads the exam and checks it belongs to `teacher_id`. Runs before any mutation.
pub(crate) async fn owned_exam(
    store: &dyn GradingStore,
    exam_id: &str,
    teacher_id: &str,
) -> Result<Exam, OwnershipError> {
    let exam = store
        .exam(exam_id)
        .await?
        .ok_or_else(|| OwnershipError::NotFound(exam_id.to_string()))?;

    if exam.teacher_id != teacher_id {
        return Err(OwnershipError::Forbidden(exam_id.to_string()));
    }

    Ok(exam)
}
