use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::PrimitiveDateTime;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Exam {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) teacher_id: String,
    pub(crate) class_id: String,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) number: i32,
    pub(crate) points: f64,
    pub(crate) outcome: Option<String>,
}

impl Question {
    /// Outcome label with surrounding whitespace removed; blank labels count as none.
    pub(crate) fn outcome_label(&self) -> Option<&str> {
        self.outcome.as_deref().map(str::trim).filter(|label| !label.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Student {
    pub(crate) id: String,
    pub(crate) class_id: String,
    pub(crate) name: String,
    pub(crate) roster_number: String,
}

/// One uploaded page. `image_data` holds the encoded payload,
/// `data:image/<ext>;base64,<...>`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Paper {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) image_data: String,
    pub(crate) uploaded_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ScoreRecord {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) question_id: String,
    pub(crate) teacher_id: String,
    pub(crate) score: f64,
    pub(crate) updated_at: PrimitiveDateTime,
}
