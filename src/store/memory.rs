use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::time::now_utc;
use crate::db::models::{Exam, Paper, Question, ScoreRecord, Student};

use super::{GradingStore, NewPaper, ScoreKey, ScoreWrite};

#[derive(Default)]
struct Collections {
    exams: BTreeMap<String, Exam>,
    questions: BTreeMap<String, Question>,
    students: BTreeMap<String, Student>,
    papers: BTreeMap<String, Paper>,
    scores: BTreeMap<String, ScoreRecord>,
}

/// Process-local store. Each trait call takes the lock once, which makes every
/// batch write atomic with respect to concurrent readers.
#[derive(Default)]
pub(crate) struct MemoryStore {
    inner: RwLock<Collections>,
    reject_writes: AtomicBool,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) async fn put_exam(&self, exam: Exam) {
        self.inner.write().await.exams.insert(exam.id.clone(), exam);
    }

    #[cfg(test)]
    pub(crate) async fn put_question(&self, question: Question) {
        self.inner.write().await.questions.insert(question.id.clone(), question);
    }

    #[cfg(test)]
    pub(crate) async fn put_student(&self, student: Student) {
        self.inner.write().await.students.insert(student.id.clone(), student);
    }

    /// Makes score writes fail, to exercise persistence error paths.
    #[cfg(test)]
    pub(crate) fn reject_score_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    fn check_writable(&self) -> anyhow::Result<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            anyhow::bail!("score store is rejecting writes");
        }
        Ok(())
    }
}

#[async_trait]
impl GradingStore for MemoryStore {
    async fn exam(&self, exam_id: &str) -> anyhow::Result<Option<Exam>> {
        Ok(self.inner.read().await.exams.get(exam_id).cloned())
    }

    async fn questions_for_exam(&self, exam_id: &str) -> anyhow::Result<Vec<Question>> {
        let guard = self.inner.read().await;
        let mut questions: Vec<Question> =
            guard.questions.values().filter(|q| q.exam_id == exam_id).cloned().collect();
        questions.sort_by(|a, b| a.number.cmp(&b.number).then_with(|| a.id.cmp(&b.id)));
        Ok(questions)
    }

    async fn students_in_class(&self, class_id: &str) -> anyhow::Result<Vec<Student>> {
        let guard = self.inner.read().await;
        let mut students: Vec<Student> =
            guard.students.values().filter(|s| s.class_id == class_id).cloned().collect();
        students.sort_by(|a, b| {
            a.roster_number.cmp(&b.roster_number).then_with(|| a.name.cmp(&b.name))
        });
        Ok(students)
    }

    async fn papers_for_student(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> anyhow::Result<Vec<Paper>> {
        let guard = self.inner.read().await;
        let mut papers: Vec<Paper> = guard
            .papers
            .values()
            .filter(|p| p.exam_id == exam_id && p.student_id == student_id)
            .cloned()
            .collect();
        papers.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at).then_with(|| a.id.cmp(&b.id)));
        Ok(papers)
    }

    async fn insert_paper(&self, paper: NewPaper) -> anyhow::Result<Paper> {
        let paper = Paper {
            id: Uuid::new_v4().to_string(),
            exam_id: paper.exam_id,
            student_id: paper.student_id,
            image_data: paper.image_data,
            uploaded_at: now_utc(),
        };
        self.inner.write().await.papers.insert(paper.id.clone(), paper.clone());
        Ok(paper)
    }

    async fn delete_paper(&self, exam_id: &str, paper_id: &str) -> anyhow::Result<bool> {
        let mut guard = self.inner.write().await;
        let owned = guard.papers.get(paper_id).is_some_and(|paper| paper.exam_id == exam_id);
        if owned {
            guard.papers.remove(paper_id);
        }
        Ok(owned)
    }

    async fn scores_for_exam(&self, exam_id: &str) -> anyhow::Result<Vec<ScoreRecord>> {
        let guard = self.inner.read().await;
        Ok(guard.scores.values().filter(|s| s.exam_id == exam_id).cloned().collect())
    }

    async fn upsert_scores(&self, writes: &[ScoreWrite]) -> anyhow::Result<()> {
        self.check_writable()?;
        let now = now_utc();
        let mut guard = self.inner.write().await;
        for write in writes {
            let id = write.key.document_id();
            guard
                .scores
                .entry(id.clone())
                .and_modify(|record| {
                    record.score = write.score;
                    record.updated_at = now;
                })
                .or_insert_with(|| ScoreRecord {
                    id,
                    exam_id: write.key.exam_id.clone(),
                    student_id: write.key.student_id.clone(),
                    question_id: write.key.question_id.clone(),
                    teacher_id: write.teacher_id.clone(),
                    score: write.score,
                    updated_at: now,
                });
        }
        Ok(())
    }

    async fn delete_score(&self, key: &ScoreKey) -> anyhow::Result<bool> {
        self.check_writable()?;
        Ok(self.inner.write().await.scores.remove(&key.document_id()).is_some())
    }

    async fn delete_scores_for_student(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> anyhow::Result<u64> {
        self.check_writable()?;
        let mut guard = self.inner.write().await;
        let before = guard.scores.len();
        guard.scores.retain(|_, s| !(s.exam_id == exam_id && s.student_id == student_id));
        Ok((before - guard.scores.len()) as u64)
    }

    async fn delete_exam(&self, exam_id: &str) -> anyhow::Result<()> {
        let mut guard = self.inner.write().await;
        guard.scores.retain(|_, s| s.exam_id != exam_id);
        guard.questions.retain(|_, q| q.exam_id != exam_id);
        guard.papers.retain(|_, p| p.exam_id != exam_id);
        guard.exams.remove(exam_id);
        Ok(())
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
