use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::core::time::now_utc;
use crate::db::models::{Exam, Paper, Question, ScoreRecord, Student};
use crate::repositories;

use super::{GradingStore, NewPaper, ScoreKey, ScoreWrite};

#[derive(Clone)]
pub(crate) struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GradingStore for PgStore {
    async fn exam(&self, exam_id: &str) -> anyhow::Result<Option<Exam>> {
        repositories::exams::find_by_id(&self.pool, exam_id)
            .await
            .with_context(|| format!("failed to fetch exam {exam_id}"))
    }

    async fn questions_for_exam(&self, exam_id: &str) -> anyhow::Result<Vec<Question>> {
        repositories::questions::list_by_exam(&self.pool, exam_id)
            .await
            .with_context(|| format!("failed to list questions for exam {exam_id}"))
    }

    async fn students_in_class(&self, class_id: &str) -> anyhow::Result<Vec<Student>> {
        repositories::students::list_by_class(&self.pool, class_id)
            .await
            .with_context(|| format!("failed to list students for class {class_id}"))
    }

    async fn papers_for_student(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> anyhow::Result<Vec<Paper>> {
        repositories::papers::list_by_student(&self.pool, exam_id, student_id)
            .await
            .with_context(|| format!("failed to list papers for student {student_id}"))
    }

    async fn insert_paper(&self, paper: NewPaper) -> anyhow::Result<Paper> {
        let id = Uuid::new_v4().to_string();
        repositories::papers::create(
            &self.pool,
            repositories::papers::CreatePaper {
                id: &id,
                exam_id: &paper.exam_id,
                student_id: &paper.student_id,
                image_data: &paper.image_data,
                uploaded_at: now_utc(),
            },
        )
        .await
        .context("failed to store paper")
    }

    async fn delete_paper(&self, exam_id: &str, paper_id: &str) -> anyhow::Result<bool> {
        repositories::papers::delete(&self.pool, exam_id, paper_id)
            .await
            .with_context(|| format!("failed to delete paper {paper_id}"))
    }

    async fn scores_for_exam(&self, exam_id: &str) -> anyhow::Result<Vec<ScoreRecord>> {
        repositories::scores::list_by_exam(&self.pool, exam_id)
            .await
            .with_context(|| format!("failed to list scores for exam {exam_id}"))
    }

    async fn upsert_scores(&self, writes: &[ScoreWrite]) -> anyhow::Result<()> {
        if writes.is_empty() {
            return Ok(());
        }

        let now = now_utc();
        let mut tx = self.pool.begin().await.context("failed to open score transaction")?;

        for write in writes {
            let id = write.key.document_id();
            repositories::scores::upsert(
                &mut tx,
                repositories::scores::UpsertScore {
                    id: &id,
                    exam_id: &write.key.exam_id,
                    student_id: &write.key.student_id,
                    question_id: &write.key.question_id,
                    teacher_id: &write.teacher_id,
                    score: write.score,
                    updated_at: now,
                },
            )
            .await
            .with_context(|| format!("failed to upsert score {id}"))?;
        }

        tx.commit().await.context("failed to commit score batch")
    }

    async fn delete_score(&self, key: &ScoreKey) -> anyhow::Result<bool> {
        repositories::scores::delete_by_id(&self.pool, &key.document_id())
            .await
            .context("failed to delete score")
    }

    async fn delete_scores_for_student(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> anyhow::Result<u64> {
        repositories::scores::delete_for_student(&self.pool, exam_id, student_id)
            .await
            .with_context(|| format!("failed to delete scores for student {student_id}"))
    }

    async fn delete_exam(&self, exam_id: &str) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await.context("failed to open exam transaction")?;
        repositories::exams::delete_cascade(&mut tx, exam_id)
            .await
            .with_context(|| format!("failed to delete exam {exam_id}"))?;
        tx.commit().await.context("failed to commit exam deletion")
    }

    async fn ping(&self) -> anyhow::Result<()> {
        repositories::health::ping(&self.pool).await.context("database ping failed")
    }
}
