//! Sequential, rate-limited analysis of an exam's uploaded papers.
//!
//! Students are walked in roster order and each student's papers in upload
//! order, one recognition call at a time. Every `cooldown_every` papers the
//! run pauses for `cooldown`. Per-paper problems become diagnostics; only
//! precondition violations and score write failures end a run early.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::core::config::AnalysisSettings;
use crate::db::models::{Exam, Paper, Question, Student};
use crate::services::ownership::{owned_exam, OwnershipError};
use crate::services::recognition::{RecognitionRequest, Recognizer};
use crate::services::reconciliation::{reconcile, ReconcileNote, Reconciled};
use crate::services::run_lease::RunLease;
use crate::services::scratch::{decode_payload, ScratchImage};
use crate::services::score_store::persist_validated;
use crate::store::GradingStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AnalysisScope {
    AllStudents,
    Selected(Vec<String>),
}

#[derive(Debug, Clone)]
pub(crate) struct AnalysisRequest {
    pub(crate) exam_id: String,
    pub(crate) teacher_id: String,
    pub(crate) scope: AnalysisScope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum DiagnosticKind {
    NoPapers,
    PapersUnavailable,
    UnreadableImage,
    RecognitionFailed,
    IdentityMismatch,
    UnknownQuestion,
    ScoreClipped,
    DuplicateQuestion,
    NoScores,
}

impl DiagnosticKind {
    fn describe(self) -> &'static str {
        match self {
            Self::NoPapers => "students without papers",
            Self::PapersUnavailable => "students whose papers could not be loaded",
            Self::UnreadableImage => "unreadable images",
            Self::RecognitionFailed => "recognition failures",
            Self::IdentityMismatch => "identity mismatches",
            Self::UnknownQuestion => "unknown question numbers",
            Self::ScoreClipped => "clipped scores",
            Self::DuplicateQuestion => "questions read more than once",
            Self::NoScores => "papers without readable scores",
        }
    }

    /// Whether the diagnostic explains a paper or student contributing nothing.
    fn is_blocking(self) -> bool {
        !matches!(self, Self::UnknownQuestion | Self::ScoreClipped | Self::DuplicateQuestion)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct Diagnostic {
    pub(crate) student_id: String,
    pub(crate) paper_id: Option<String>,
    pub(crate) kind: DiagnosticKind,
    pub(crate) detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct AnalysisSummary {
    pub(crate) exam_id: String,
    pub(crate) students_inspected: usize,
    pub(crate) papers_inspected: usize,
    pub(crate) papers_accepted: usize,
    pub(crate) papers_discarded: usize,
    pub(crate) scores_saved: usize,
    pub(crate) cooldowns: usize,
    pub(crate) diagnostics: Vec<Diagnostic>,
    pub(crate) message: String,
}

#[derive(Debug, Error)]
pub(crate) enum AnalysisError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Authorization(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    RunInProgress(String),
    #[error("{}", .0.message)]
    NothingUsable(Box<AnalysisSummary>),
    #[error("{0}")]
    Persistence(String),
    /// A score write failed mid-run. Batches saved before it stay in place.
    #[error("{}", .summary.message)]
    WriteFailed { detail: String, summary: Box<AnalysisSummary> },
}

impl From<OwnershipError> for AnalysisError {
    fn from(err: OwnershipError) -> Self {
        match err {
            OwnershipError::NotFound(_) => Self::NotFound(err.to_string()),
            OwnershipError::Forbidden(_) => Self::Authorization(err.to_string()),
            OwnershipError::Store(inner) => Self::Persistence(format!("{inner:#}")),
        }
    }
}

impl AnalysisError {
    fn label(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::Authorization(_) | Self::NotFound(_) => "rejected",
            Self::RunInProgress(_) => "conflict",
            Self::NothingUsable(_) => "nothing_usable",
            Self::Persistence(_) | Self::WriteFailed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Pacing {
    every: usize,
    pause: Duration,
}

impl Pacing {
    fn due(&self, processed: usize) -> bool {
        processed > 0 && processed % self.every == 0
    }
}

#[derive(Default)]
struct RunTally {
    students: usize,
    papers: usize,
    accepted: usize,
    discarded: usize,
    saved: usize,
    cooldowns: usize,
    diagnostics: Vec<Diagnostic>,
}

impl RunTally {
    fn note(&mut self, student: &Student, paper: Option<&Paper>, kind: DiagnosticKind, detail: String) {
        self.diagnostics.push(Diagnostic {
            student_id: student.id.clone(),
            paper_id: paper.map(|paper| paper.id.clone()),
            kind,
            detail,
        });
    }

    fn discard(&mut self, student: &Student, paper: &Paper, kind: DiagnosticKind, detail: String) {
        self.discarded += 1;
        metrics::counter!("analysis_papers_discarded_total").increment(1);
        self.note(student, Some(paper), kind, detail);
    }

    fn headline(&self) -> String {
        format!(
            "Inspected {} students and {} papers; saved {} scores from {} papers, {} papers discarded.",
            self.students, self.papers, self.saved, self.accepted, self.discarded
        )
    }

    fn failure_message(&self) -> String {
        let mut counts: BTreeMap<DiagnosticKind, usize> = BTreeMap::new();
        for diagnostic in self.diagnostics.iter().filter(|d| d.kind.is_blocking()) {
            *counts.entry(diagnostic.kind).or_default() += 1;
        }

        let reasons: Vec<String> =
            counts.iter().map(|(kind, count)| format!("{count} {}", kind.describe())).collect();
        let reasons = if reasons.is_empty() {
            "no readable scores were returned".to_string()
        } else {
            reasons.join(", ")
        };

        format!(
            "No usable scores: inspected {} students and {} papers ({reasons}).",
            self.students, self.papers
        )
    }

    fn aborted_message(&self) -> String {
        format!(
            "Run stopped by a score write failure: inspected {} students and {} papers; saved {} scores from {} papers before the failure.",
            self.students, self.papers, self.saved, self.accepted
        )
    }

    fn into_summary(self, exam_id: &str, message: String) -> AnalysisSummary {
        AnalysisSummary {
            exam_id: exam_id.to_string(),
            students_inspected: self.students,
            papers_inspected: self.papers,
            papers_accepted: self.accepted,
            papers_discarded: self.discarded,
            scores_saved: self.saved,
            cooldowns: self.cooldowns,
            diagnostics: self.diagnostics,
            message,
        }
    }
}

/// A run cut short by a write failure, with everything tallied up to it.
struct Aborted {
    tally: RunTally,
    detail: String,
}

struct RunContext<'a> {
    exam: &'a Exam,
    teacher_id: &'a str,
    questions: &'a [Question],
}

#[derive(Clone)]
pub(crate) struct AnalysisDriver {
    store: Arc<dyn GradingStore>,
    recognizer: Arc<dyn Recognizer>,
    lease: Arc<dyn RunLease>,
    pacing: Pacing,
    scratch_dir: PathBuf,
}

impl AnalysisDriver {
    pub(crate) fn new(
        store: Arc<dyn GradingStore>,
        recognizer: Arc<dyn Recognizer>,
        lease: Arc<dyn RunLease>,
        settings: &AnalysisSettings,
    ) -> Self {
        Self {
            store,
            recognizer,
            lease,
            pacing: Pacing {
                every: settings.cooldown_every.max(1) as usize,
                pause: Duration::from_secs(settings.cooldown_seconds),
            },
            scratch_dir: settings.scratch_dir.clone(),
        }
    }

    pub(crate) async fn run(&self, request: AnalysisRequest) -> Result<AnalysisSummary, AnalysisError> {
        let result = self.run_checked(&request).await;

        let status = match &result {
            Ok(_) => "ok",
            Err(err) => err.label(),
        };
        metrics::counter!("analysis_runs_total", "status" => status).increment(1);

        match &result {
            Ok(summary) => tracing::info!(
                exam_id = %request.exam_id,
                students = summary.students_inspected,
                papers = summary.papers_inspected,
                saved = summary.scores_saved,
                discarded = summary.papers_discarded,
                "Analysis run finished"
            ),
            Err(err) => tracing::warn!(exam_id = %request.exam_id, error = %err, "Analysis run failed"),
        }

        result
    }

    async fn run_checked(&self, request: &AnalysisRequest) -> Result<AnalysisSummary, AnalysisError> {
        let store = self.store.as_ref();
        let exam = owned_exam(store, &request.exam_id, &request.teacher_id).await?;

        let questions = store
            .questions_for_exam(&exam.id)
            .await
            .map_err(|err| AnalysisError::Persistence(format!("{err:#}")))?;
        if questions.is_empty() {
            return Err(AnalysisError::Validation(format!(
                "Exam {} has no questions; add at least one question before running analysis",
                exam.id
            )));
        }

        let roster = store
            .students_in_class(&exam.class_id)
            .await
            .map_err(|err| AnalysisError::Persistence(format!("{err:#}")))?;
        let targets = select_targets(&roster, &request.scope)?;

        let token = self
            .lease
            .acquire(&exam.id)
            .await
            .map_err(|err| AnalysisError::Persistence(format!("analysis lease unavailable: {err:#}")))?
            .ok_or_else(|| {
                AnalysisError::RunInProgress(format!("An analysis of exam {} is already running", exam.id))
            })?;

        tracing::info!(
            exam_id = %exam.id,
            students = targets.len(),
            questions = questions.len(),
            "Analysis run started"
        );

        let context = RunContext { exam: &exam, teacher_id: &request.teacher_id, questions: &questions };
        let outcome = self.process(&context, &targets).await;
        token.release().await;

        let tally = match outcome {
            Ok(tally) => tally,
            Err(Aborted { tally, detail }) => {
                let message = tally.aborted_message();
                return Err(AnalysisError::WriteFailed {
                    detail,
                    summary: Box::new(tally.into_summary(&exam.id, message)),
                });
            }
        };
        if tally.saved == 0 {
            let message = tally.failure_message();
            return Err(AnalysisError::NothingUsable(Box::new(tally.into_summary(&exam.id, message))));
        }

        let message = tally.headline();
        Ok(tally.into_summary(&exam.id, message))
    }

    async fn process(
        &self,
        context: &RunContext<'_>,
        targets: &[&Student],
    ) -> Result<RunTally, Aborted> {
        let mut tally = RunTally::default();

        for student in targets {
            tally.students += 1;

            let papers = match self.store.papers_for_student(&context.exam.id, &student.id).await {
                Ok(papers) => papers,
                Err(err) => {
                    tracing::error!(
                        exam_id = %context.exam.id,
                        student_id = %student.id,
                        error = %err,
                        "Failed to load papers"
                    );
                    tally.note(student, None, DiagnosticKind::PapersUnavailable, format!("{err:#}"));
                    continue;
                }
            };

            if papers.is_empty() {
                tally.note(student, None, DiagnosticKind::NoPapers, "no uploaded papers".to_string());
                continue;
            }

            for paper in &papers {
                if self.pacing.due(tally.papers) {
                    tracing::debug!(
                        exam_id = %context.exam.id,
                        processed = tally.papers,
                        pause_seconds = self.pacing.pause.as_secs(),
                        "Cooling down before next recognition call"
                    );
                    tokio::time::sleep(self.pacing.pause).await;
                    tally.cooldowns += 1;
                }
                tally.papers += 1;

                if let Err(detail) = self.process_paper(context, student, paper, &mut tally).await {
                    return Err(Aborted { tally, detail });
                }
            }
        }

        Ok(tally)
    }

    async fn process_paper(
        &self,
        context: &RunContext<'_>,
        student: &Student,
        paper: &Paper,
        tally: &mut RunTally,
    ) -> Result<(), String> {
        let image = match decode_payload(&paper.image_data) {
            Ok(image) => image,
            Err(err) => {
                tally.discard(student, paper, DiagnosticKind::UnreadableImage, err.to_string());
                return Ok(());
            }
        };

        let recognition = {
            // Dropped at the end of this block, removing the scratch file on every path.
            let scratch = match ScratchImage::materialize(&self.scratch_dir, image).await {
                Ok(scratch) => scratch,
                Err(err) => {
                    tally.discard(student, paper, DiagnosticKind::UnreadableImage, format!("{err:#}"));
                    return Ok(());
                }
            };
            let bytes = match scratch.read().await {
                Ok(bytes) => bytes,
                Err(err) => {
                    tally.discard(student, paper, DiagnosticKind::UnreadableImage, format!("{err:#}"));
                    return Ok(());
                }
            };

            self.recognizer
                .analyze(RecognitionRequest {
                    image: &bytes,
                    mime_type: scratch.mime_type(),
                    expected_identity: &student.roster_number,
                    paper_id: &paper.id,
                })
                .await
        };

        let recognition = match recognition {
            Ok(recognition) => recognition,
            Err(failure) => {
                tally.discard(student, paper, DiagnosticKind::RecognitionFailed, failure.to_string());
                return Ok(());
            }
        };

        let (scores, notes) =
            match reconcile(&recognition, &student.id, &student.roster_number, context.questions) {
                Reconciled::Accepted { scores, notes } => (scores, notes),
                Reconciled::IdentityMismatch { expected, returned } => {
                    tracing::warn!(
                        security = true,
                        exam_id = %context.exam.id,
                        student_id = %student.id,
                        paper_id = %paper.id,
                        expected = %expected,
                        returned = %returned,
                        "Recognized identity does not match the paper owner; discarding all scores"
                    );
                    tally.discard(
                        student,
                        paper,
                        DiagnosticKind::IdentityMismatch,
                        format!("expected identity {expected}, paper reads {returned}"),
                    );
                    return Ok(());
                }
            };

        for note in notes {
            match note {
                ReconcileNote::UnknownQuestion { key } => {
                    tracing::warn!(paper_id = %paper.id, question = %key, "Ignoring unknown question");
                    tally.note(
                        student,
                        Some(paper),
                        DiagnosticKind::UnknownQuestion,
                        format!("question {key} is not part of the exam"),
                    );
                }
                ReconcileNote::Clipped { question_number, raw, kept } => {
                    tally.note(
                        student,
                        Some(paper),
                        DiagnosticKind::ScoreClipped,
                        format!("question {question_number}: {raw} clipped to {kept}"),
                    );
                }
                ReconcileNote::DuplicateQuestion { question_number, dropped, kept } => {
                    tracing::warn!(
                        paper_id = %paper.id,
                        question = question_number,
                        "Question read under more than one key"
                    );
                    tally.note(
                        student,
                        Some(paper),
                        DiagnosticKind::DuplicateQuestion,
                        format!("question {question_number}: kept key {kept}, dropped key {dropped}"),
                    );
                }
            }
        }

        if scores.is_empty() {
            tally.discard(student, paper, DiagnosticKind::NoScores, recognition.note.clone());
            return Ok(());
        }

        let saved =
            persist_validated(self.store.as_ref(), &context.exam.id, context.teacher_id, &scores)
                .await
                .map_err(|err| {
                    tracing::error!(
                        exam_id = %context.exam.id,
                        paper_id = %paper.id,
                        error = %err,
                        "Failed to persist scores"
                    );
                    format!("Failed to save scores for paper {}: {err:#}", paper.id)
                })?;

        tally.accepted += 1;
        tally.saved += saved;
        metrics::counter!("analysis_scores_saved_total").increment(saved as u64);
        Ok(())
    }
}

fn select_targets<'a>(
    roster: &'a [Student],
    scope: &AnalysisScope,
) -> Result<Vec<&'a Student>, AnalysisError> {
    let targets: Vec<&Student> = match scope {
        AnalysisScope::AllStudents => roster.iter().collect(),
        AnalysisScope::Selected(ids) => {
            if ids.is_empty() {
                return Err(AnalysisError::Validation(
                    "Select at least one student to analyze".to_string(),
                ));
            }

            let unknown: Vec<&str> = ids
                .iter()
                .filter(|id| !roster.iter().any(|student| &student.id == *id))
                .map(String::as_str)
                .collect();
            if !unknown.is_empty() {
                return Err(AnalysisError::Validation(format!(
                    "Students not on the exam roster: {}",
                    unknown.join(", ")
                )));
            }

            roster.iter().filter(|student| ids.contains(&student.id)).collect()
        }
    };

    if targets.is_empty() {
        return Err(AnalysisError::Validation("The exam's class has no students".to_string()));
    }

    Ok(targets)
}
