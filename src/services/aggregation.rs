//! Pure statistics over persisted scores.
//!
//! Only roster students and questions of the exam count. A student is
//! participating once at least one such score exists; missing cells of a
//! participant count as zero. Non-participants appear in roster counts only.
//! Percentages use a 0-100 scale and are `None` when their denominator is zero.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::core::config::ReportSettings;
use crate::db::models::{Exam, Question, ScoreRecord, Student};
use crate::services::reports::ReportError;

const EPSILON: f64 = 1e-9;

pub(crate) struct ReportInput<'a> {
    pub(crate) exam: &'a Exam,
    pub(crate) questions: &'a [Question],
    pub(crate) roster: &'a [Student],
    pub(crate) scores: &'a [ScoreRecord],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum StudentStatus {
    NotTaken,
    Pass,
    Fail,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReportExam {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) class_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReportStudent {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) roster_number: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReportQuestion {
    pub(crate) id: String,
    pub(crate) number: i32,
    pub(crate) points: f64,
    pub(crate) outcome: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StudentResult {
    pub(crate) student_id: String,
    pub(crate) name: String,
    pub(crate) roster_number: String,
    /// Keyed by question id. Only recorded cells appear.
    pub(crate) scores: BTreeMap<String, f64>,
    pub(crate) total: Option<f64>,
    pub(crate) percentage: Option<f64>,
    pub(crate) status: StudentStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuestionResult {
    pub(crate) question_id: String,
    pub(crate) number: i32,
    pub(crate) points: f64,
    pub(crate) average_score: Option<f64>,
    pub(crate) success_percentage: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OutcomeResult {
    pub(crate) outcome: String,
    pub(crate) question_numbers: Vec<i32>,
    pub(crate) achieved: f64,
    pub(crate) possible: f64,
    pub(crate) success_percentage: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReportStats {
    pub(crate) registered_students: usize,
    pub(crate) participating_students: usize,
    pub(crate) passed_students: usize,
    pub(crate) failed_students: usize,
    pub(crate) not_taken_students: usize,
    /// Share of participants who passed.
    pub(crate) pass_rate: Option<f64>,
    pub(crate) average_total: Option<f64>,
    pub(crate) max_total: f64,
    pub(crate) pass_mark: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AggregationReport {
    pub(crate) exam: ReportExam,
    pub(crate) students: Vec<ReportStudent>,
    pub(crate) questions: Vec<ReportQuestion>,
    pub(crate) per_student: Vec<StudentResult>,
    pub(crate) per_question: Vec<QuestionResult>,
    pub(crate) per_outcome: Vec<OutcomeResult>,
    pub(crate) stats: ReportStats,
    pub(crate) narrative: String,
}

fn percentage(part: f64, whole: f64) -> Option<f64> {
    (whole > 0.0).then(|| part / whole * 100.0)
}

pub(crate) fn aggregate(
    input: ReportInput<'_>,
    settings: ReportSettings,
) -> Result<AggregationReport, ReportError> {
    if input.questions.is_empty() {
        return Err(ReportError::EmptyQuestions(input.exam.id.clone()));
    }
    if input.roster.is_empty() {
        return Err(ReportError::EmptyRoster(input.exam.class_id.clone()));
    }

    let mut questions: Vec<&Question> = input.questions.iter().collect();
    questions.sort_by(|a, b| a.number.cmp(&b.number).then_with(|| a.id.cmp(&b.id)));

    let max_total: f64 = questions.iter().map(|question| question.points).sum();
    let pass_mark = max_total * settings.pass_threshold;

    // (student, question) -> score, restricted to the roster and the exam's questions.
    let mut cells: HashMap<&str, HashMap<&str, f64>> = HashMap::new();
    for record in input.scores {
        let on_roster = input.roster.iter().any(|student| student.id == record.student_id);
        let known = questions.iter().any(|question| question.id == record.question_id);
        if on_roster && known {
            cells
                .entry(record.student_id.as_str())
                .or_default()
                .insert(record.question_id.as_str(), record.score);
        }
    }

    let cell = |student_id: &str, question_id: &str| {
        cells.get(student_id).and_then(|row| row.get(question_id)).copied()
    };

    let participants: Vec<&Student> = input
        .roster
        .iter()
        .filter(|student| questions.iter().any(|q| cell(&student.id, &q.id).is_some()))
        .collect();
    let participant_count = participants.len();

    let per_student: Vec<StudentResult> = input
        .roster
        .iter()
        .map(|student| {
            let scores: BTreeMap<String, f64> = questions
                .iter()
                .filter_map(|q| cell(&student.id, &q.id).map(|score| (q.id.clone(), score)))
                .collect();

            let (total, status) = if scores.is_empty() {
                (None, StudentStatus::NotTaken)
            } else {
                let total: f64 = scores.values().sum();
                let status = if total + EPSILON >= pass_mark {
                    StudentStatus::Pass
                } else {
                    StudentStatus::Fail
                };
                (Some(total), status)
            };

            StudentResult {
                student_id: student.id.clone(),
                name: student.name.clone(),
                roster_number: student.roster_number.clone(),
                scores,
                total,
                percentage: total.and_then(|total| percentage(total, max_total)),
                status,
            }
        })
        .collect();

    let achieved_on = |question: &Question| -> f64 {
        participants.iter().map(|student| cell(&student.id, &question.id).unwrap_or(0.0)).sum()
    };

    let per_question: Vec<QuestionResult> = questions
        .iter()
        .map(|question| {
            let achieved = achieved_on(*question);
            let count = participant_count as f64;
            QuestionResult {
                question_id: question.id.clone(),
                number: question.number,
                points: question.points,
                average_score: (participant_count > 0).then(|| achieved / count),
                success_percentage: percentage(achieved, question.points * count),
            }
        })
        .collect();

    let mut per_outcome: Vec<OutcomeResult> = Vec::new();
    for question in &questions {
        let Some(label) = question.outcome_label() else {
            continue;
        };
        let achieved = achieved_on(*question);
        let possible = question.points * participant_count as f64;

        match per_outcome.iter().position(|outcome| outcome.outcome == label) {
            Some(index) => {
                let outcome = &mut per_outcome[index];
                outcome.question_numbers.push(question.number);
                outcome.achieved += achieved;
                outcome.possible += possible;
            }
            None => per_outcome.push(OutcomeResult {
                outcome: label.to_string(),
                question_numbers: vec![question.number],
                achieved,
                possible,
                success_percentage: None,
            }),
        }
    }
    for outcome in &mut per_outcome {
        outcome.success_percentage = percentage(outcome.achieved, outcome.possible);
    }

    let passed = per_student.iter().filter(|s| s.status == StudentStatus::Pass).count();
    let failed = per_student.iter().filter(|s| s.status == StudentStatus::Fail).count();
    let totals: f64 = per_student.iter().filter_map(|s| s.total).sum();

    let stats = ReportStats {
        registered_students: input.roster.len(),
        participating_students: participant_count,
        passed_students: passed,
        failed_students: failed,
        not_taken_students: input.roster.len() - participant_count,
        pass_rate: percentage(passed as f64, participant_count as f64),
        average_total: (participant_count > 0).then(|| totals / participant_count as f64),
        max_total,
        pass_mark,
    };

    let narrative = narrative(&input.exam.title, &stats, &per_outcome, settings.outcome_threshold);

    Ok(AggregationReport {
        exam: ReportExam {
            id: input.exam.id.clone(),
            title: input.exam.title.clone(),
            class_id: input.exam.class_id.clone(),
        },
        students: input
            .roster
            .iter()
            .map(|student| ReportStudent {
                id: student.id.clone(),
                name: student.name.clone(),
                roster_number: student.roster_number.clone(),
            })
            .collect(),
        questions: questions
            .iter()
            .map(|question| ReportQuestion {
                id: question.id.clone(),
                number: question.number,
                points: question.points,
                outcome: question.outcome_label().map(str::to_string),
            })
            .collect(),
        per_student,
        per_question,
        per_outcome,
        stats,
        narrative,
    })
}

/// The weakest outcomes, ties included, when they fall below `threshold` (0..1).
fn weakest_outcomes(outcomes: &[OutcomeResult], threshold: f64) -> Option<(f64, Vec<&str>)> {
    let worst = outcomes.iter().filter_map(|o| o.success_percentage).reduce(f64::min)?;
    if worst >= threshold * 100.0 {
        return None;
    }

    let labels = outcomes
        .iter()
        .filter(|o| o.success_percentage.is_some_and(|pct| (pct - worst).abs() <= EPSILON))
        .map(|o| o.outcome.as_str())
        .collect();
    Some((worst, labels))
}

fn narrative(title: &str, stats: &ReportStats, outcomes: &[OutcomeResult], threshold: f64) -> String {
    let mut text = format!(
        "{} of {} registered students took \"{}\".",
        stats.participating_students, stats.registered_students, title
    );

    let Some(pass_rate) = stats.pass_rate else {
        text.push_str(" No scores have been recorded yet, so no statistics are available.");
        return text;
    };

    text.push_str(&format!(
        " {} passed and {} failed, a pass rate of {:.1}%.",
        stats.passed_students, stats.failed_students, pass_rate
    ));

    let with_data = outcomes.iter().any(|o| o.success_percentage.is_some());
    if !with_data {
        text.push_str(" No learning outcomes are attached to the questions.");
        return text;
    }

    match weakest_outcomes(outcomes, threshold) {
        Some((worst, labels)) => {
            let quoted: Vec<String> = labels.iter().map(|label| format!("\"{label}\"")).collect();
            let noun = if quoted.len() == 1 { "outcome" } else { "outcomes" };
            text.push_str(&format!(
                " The weakest {noun} {} {} at {:.1}% success and should be revisited.",
                if quoted.len() == 1 { "is" } else { "are" },
                quoted.join(", "),
                worst
            ));
        }
        None => text.push_str(" All learning outcomes were achieved at a satisfactory level."),
    }

    text
}
