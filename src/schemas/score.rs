use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::services::score_store::{deserialize_score_value, ManualEdit, ScoreValue};

/// `score: null` removes the cell; `score: 0` stores a zero. The field is required.
#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ScoreUpdateRequest {
    #[serde(alias = "studentId")]
    #[validate(length(min = 1, message = "student_id must not be empty"))]
    pub(crate) student_id: String,
    #[serde(alias = "questionId")]
    #[validate(length(min = 1, message = "question_id must not be empty"))]
    pub(crate) question_id: String,
    #[serde(deserialize_with = "deserialize_score_value")]
    pub(crate) score: ScoreValue,
}

#[derive(Debug, Serialize)]
pub(crate) struct ScoreUpdateResponse {
    pub(crate) student_id: String,
    pub(crate) question_id: String,
    pub(crate) status: &'static str,
    pub(crate) score: Option<f64>,
}

impl ScoreUpdateResponse {
    pub(crate) fn new(student_id: String, question_id: String, edit: ManualEdit) -> Self {
        let (status, score) = match edit {
            ManualEdit::Saved { score } => ("saved", Some(score)),
            ManualEdit::Removed { existed: true } => ("removed", None),
            ManualEdit::Removed { existed: false } => ("absent", None),
        };
        Self { student_id, question_id, status, score }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct BulkDeleteResponse {
    pub(crate) student_id: String,
    pub(crate) removed: u64,
}
