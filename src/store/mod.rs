//! Persistence seam for the grading pipeline.
//!
//! Everything the analysis driver, the score service and the report loader
//! touch goes through [`GradingStore`]. `PgStore` is the production backend;
//! `MemoryStore` backs development runs and the test suite.

mod memory;
mod postgres;

use async_trait::async_trait;

use crate::db::models::{Exam, Paper, Question, ScoreRecord, Student};

pub(crate) use memory::MemoryStore;
pub(crate) use postgres::PgStore;

/// Composite identity of one score cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct ScoreKey {
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) question_id: String,
}

impl ScoreKey {
    pub(crate) fn new(exam_id: &str, student_id: &str, question_id: &str) -> Self {
        Self {
            exam_id: exam_id.to_string(),
            student_id: student_id.to_string(),
            question_id: question_id.to_string(),
        }
    }

    /// Document id of the cell, `"{examId}_{studentId}_{questionId}"`.
    pub(crate) fn document_id(&self) -> String {
        format!("{}_{}_{}", self.exam_id, self.student_id, self.question_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScoreWrite {
    pub(crate) key: ScoreKey,
    pub(crate) teacher_id: String,
    pub(crate) score: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct NewPaper {
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) image_data: String,
}

#[async_trait]
pub(crate) trait GradingStore: Send + Sync {
    async fn exam(&self, exam_id: &str) -> anyhow::Result<Option<Exam>>;

    /// Ordered by question number.
    async fn questions_for_exam(&self, exam_id: &str) -> anyhow::Result<Vec<Question>>;

    /// Ordered by roster number.
    async fn students_in_class(&self, class_id: &str) -> anyhow::Result<Vec<Student>>;

    /// Ordered by upload time, so multi-page papers are read in page order.
    async fn papers_for_student(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> anyhow::Result<Vec<Paper>>;

    async fn insert_paper(&self, paper: NewPaper) -> anyhow::Result<Paper>;

    /// Removes the paper only. Scores read from it stay in place.
    async fn delete_paper(&self, exam_id: &str, paper_id: &str) -> anyhow::Result<bool>;

    async fn scores_for_exam(&self, exam_id: &str) -> anyhow::Result<Vec<ScoreRecord>>;

    /// Merge-writes every cell in one atomic batch. Existing cells keep their
    /// identity and only `score`/`updated_at` change; untouched cells are preserved.
    async fn upsert_scores(&self, writes: &[ScoreWrite]) -> anyhow::Result<()>;

    async fn delete_score(&self, key: &ScoreKey) -> anyhow::Result<bool>;

    /// Removes every score of one student for one exam atomically.
    async fn delete_scores_for_student(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> anyhow::Result<u64>;

    /// Deletes the exam together with its scores, questions and papers.
    async fn delete_exam(&self, exam_id: &str) -> anyhow::Result<()>;

    async fn ping(&self) -> anyhow::Result<()>;
}
