//! Idempotent score-cell writes shared by the analysis pipeline and manual edits.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::services::ownership::{owned_exam, OwnershipError};
use crate::services::reconciliation::ValidatedScore;
use crate::store::{GradingStore, ScoreKey, ScoreWrite};

/// Tri-state cell value: a legitimate number (including 0) or the explicit
/// marker that the cell should not exist.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ScoreValue {
    Present(f64),
    Absent,
}

impl From<Option<f64>> for ScoreValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Self::Absent, Self::Present)
    }
}

/// `null` maps to [`ScoreValue::Absent`]. Use with `deserialize_with` so that a
/// missing field stays an error instead of silently meaning "absent".
pub(crate) fn deserialize_score_value<'de, D>(deserializer: D) -> Result<ScoreValue, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<f64>::deserialize(deserializer).map(ScoreValue::from)
}

#[derive(Debug, Error)]
pub(crate) enum ScoreError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Authorization(String),
    #[error("{0}")]
    NotFound(String),
    #[error("score persistence failed: {0:#}")]
    Persistence(anyhow::Error),
}

impl From<OwnershipError> for ScoreError {
    fn from(err: OwnershipError) -> Self {
        match err {
            OwnershipError::NotFound(_) => Self::NotFound(err.to_string()),
            OwnershipError::Forbidden(_) => Self::Authorization(err.to_string()),
            OwnershipError::Store(inner) => Self::Persistence(inner),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ManualEdit {
    Saved { score: f64 },
    Removed { existed: bool },
}

pub(crate) struct ManualScore<'a> {
    pub(crate) teacher_id: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) question_id: &'a str,
    pub(crate) value: ScoreValue,
}

/// Manual edit entry point. Range is re-checked here even though the pipeline
/// validates its own writes.
pub(crate) async fn set_manual_score(
    store: &dyn GradingStore,
    edit: ManualScore<'_>,
) -> Result<ManualEdit, ScoreError> {
    let exam = owned_exam(store, edit.exam_id, edit.teacher_id).await?;

    let questions = store.questions_for_exam(&exam.id).await.map_err(ScoreError::Persistence)?;
    let question = questions
        .iter()
        .find(|question| question.id == edit.question_id)
        .ok_or_else(|| {
            ScoreError::NotFound(format!(
                "question {} does not belong to exam {}",
                edit.question_id, exam.id
            ))
        })?;

    let roster = store.students_in_class(&exam.class_id).await.map_err(ScoreError::Persistence)?;
    if !roster.iter().any(|student| student.id == edit.student_id) {
        return Err(ScoreError::NotFound(format!(
            "student {} is not on the roster of exam {}",
            edit.student_id, exam.id
        )));
    }

    let key = ScoreKey::new(&exam.id, edit.student_id, &question.id);

    match edit.value {
        ScoreValue::Absent => {
            let existed = store.delete_score(&key).await.map_err(ScoreError::Persistence)?;
            tracing::info!(
                exam_id = %exam.id,
                student_id = edit.student_id,
                question_id = %question.id,
                existed,
                "Manual score removed"
            );
            Ok(ManualEdit::Removed { existed })
        }
        ScoreValue::Present(score) => {
            if !score.is_finite() || score < 0.0 || score > question.points {
                return Err(ScoreError::Validation(format!(
                    "score {score} is outside 0..={} for question {}",
                    question.points, question.number
                )));
            }

            let write = ScoreWrite { key, teacher_id: edit.teacher_id.to_string(), score };
            store.upsert_scores(std::slice::from_ref(&write)).await.map_err(ScoreError::Persistence)?;
            tracing::info!(
                exam_id = %exam.id,
                student_id = edit.student_id,
                question_id = %question.id,
                score,
                "Manual score saved"
            );
            Ok(ManualEdit::Saved { score })
        }
    }
}

/// Clears one student's cells for a clean re-grade.
pub(crate) async fn delete_student_scores(
    store: &dyn GradingStore,
    teacher_id: &str,
    exam_id: &str,
    student_id: &str,
) -> Result<u64, ScoreError> {
    let exam = owned_exam(store, exam_id, teacher_id).await?;
    let removed = store
        .delete_scores_for_student(&exam.id, student_id)
        .await
        .map_err(ScoreError::Persistence)?;

    tracing::info!(exam_id = %exam.id, student_id, removed, "Student scores cleared");
    Ok(removed)
}

/// Every persisted cell of one exam keyed `"{studentId}_{questionId}"`.
pub(crate) async fn exam_scores(
    store: &dyn GradingStore,
    teacher_id: &str,
    exam_id: &str,
) -> Result<BTreeMap<String, f64>, ScoreError> {
    let exam = owned_exam(store, exam_id, teacher_id).await?;
    let scores = store.scores_for_exam(&exam.id).await.map_err(ScoreError::Persistence)?;

    Ok(scores
        .into_iter()
        .map(|record| (format!("{}_{}", record.student_id, record.question_id), record.score))
        .collect())
}

/// Writes one paper's validated scores as a single batch.
pub(crate) async fn persist_validated(
    store: &dyn GradingStore,
    exam_id: &str,
    teacher_id: &str,
    scores: &[ValidatedScore],
) -> anyhow::Result<usize> {
    let writes: Vec<ScoreWrite> = scores
        .iter()
        .map(|score| ScoreWrite {
            key: ScoreKey::new(exam_id, &score.student_id, &score.question_id),
            teacher_id: teacher_id.to_string(),
            score: score.score,
        })
        .collect();

    store.upsert_scores(&writes).await?;
    Ok(writes.len())
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::test_support::{seeded_store, TEACHER_ID};

    #[derive(Deserialize)]
    struct Body {
        #[serde(deserialize_with = "deserialize_score_value")]
        score: ScoreValue,
    }

    fn edit(student_id: &'static str, question_id: &'static str, value: ScoreValue) -> ManualScore<'static> {
        ManualScore { teacher_id: TEACHER_ID, exam_id: "exam-1", student_id, question_id, value }
    }

    #[test]
    fn null_zero_and_missing_are_distinct() {
        let absent: Body = serde_json::from_str(r#"{"score": null}"#).expect("null parses");
        let zero: Body = serde_json::from_str(r#"{"score": 0}"#).expect("zero parses");

        assert_eq!(absent.score, ScoreValue::Absent);
        assert_eq!(zero.score, ScoreValue::Present(0.0));
        assert!(serde_json::from_str::<Body>("{}").is_err());
    }

    #[tokio::test]
    async fn zero_is_saved_and_absent_removes() {
        let store = seeded_store().await;

        let saved = set_manual_score(&store, edit("stu-1", "q1", ScoreValue::Present(0.0)))
            .await
            .expect("zero is a legitimate score");
        assert_eq!(saved, ManualEdit::Saved { score: 0.0 });
        assert_eq!(
            exam_scores(&store, TEACHER_ID, "exam-1").await.expect("listed").get("stu-1_q1"),
            Some(&0.0)
        );

        let removed = set_manual_score(&store, edit("stu-1", "q1", ScoreValue::Absent))
            .await
            .expect("absent removes");
        assert_eq!(removed, ManualEdit::Removed { existed: true });
        assert!(exam_scores(&store, TEACHER_ID, "exam-1").await.expect("listed").is_empty());
    }

    #[tokio::test]
    async fn manual_edits_are_range_checked() {
        let store = seeded_store().await;

        for value in [-1.0, 5.5, f64::NAN] {
            let result = set_manual_score(&store, edit("stu-1", "q1", ScoreValue::Present(value))).await;
            assert!(matches!(result, Err(ScoreError::Validation(_))), "value {value} accepted");
        }
        assert!(exam_scores(&store, TEACHER_ID, "exam-1").await.expect("listed").is_empty());
    }

    #[tokio::test]
    async fn manual_edit_checks_ownership_and_membership() {
        let store = seeded_store().await;

        let foreign = ManualScore { teacher_id: "someone-else", ..edit("stu-1", "q1", ScoreValue::Present(1.0)) };
        assert!(matches!(set_manual_score(&store, foreign).await, Err(ScoreError::Authorization(_))));

        let stranger = edit("stu-404", "q1", ScoreValue::Present(1.0));
        assert!(matches!(set_manual_score(&store, stranger).await, Err(ScoreError::NotFound(_))));

        let wrong_question = edit("stu-1", "q-other", ScoreValue::Present(1.0));
        assert!(matches!(set_manual_score(&store, wrong_question).await, Err(ScoreError::NotFound(_))));
    }
}
