use serde::Serialize;

use crate::core::time::to_rfc3339;
use crate::db::models::Paper;

#[derive(Debug, Serialize)]
pub(crate) struct PaperResponse {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) uploaded_at: String,
}

impl From<Paper> for PaperResponse {
    fn from(paper: Paper) -> Self {
        Self {
            id: paper.id,
            exam_id: paper.exam_id,
            student_id: paper.student_id,
            uploaded_at: to_rfc3339(paper.uploaded_at),
        }
    }
}
