//! Cross-checks a recognition result against the exam before anything is persisted.

use crate::db::models::Question;
use crate::services::recognition::Recognition;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ValidatedScore {
    pub(crate) student_id: String,
    pub(crate) question_id: String,
    pub(crate) question_number: i32,
    pub(crate) score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ReconcileNote {
    UnknownQuestion { key: String },
    Clipped { question_number: i32, raw: f64, kept: f64 },
    /// Two keys named the same question, such as `"1"` and `"01"`. `kept` wins.
    DuplicateQuestion { question_number: i32, dropped: String, kept: String },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Reconciled {
    Accepted { scores: Vec<ValidatedScore>, notes: Vec<ReconcileNote> },
    IdentityMismatch { expected: String, returned: String },
}

/// Exact match apart from surrounding whitespace. Case differences count as a mismatch.
pub(crate) fn identities_match(expected: &str, returned: &str) -> bool {
    expected.trim() == returned.trim()
}

/// Clamps into `[0, max]`. NaN collapses to 0.
pub(crate) fn clip_score(raw: f64, max: f64) -> f64 {
    let max = max.max(0.0);
    if raw.is_nan() {
        return 0.0;
    }
    raw.clamp(0.0, max)
}

pub(crate) fn reconcile(
    recognition: &Recognition,
    student_id: &str,
    expected_identity: &str,
    questions: &[Question],
) -> Reconciled {
    if !identities_match(expected_identity, &recognition.identity) {
        return Reconciled::IdentityMismatch {
            expected: expected_identity.to_string(),
            returned: recognition.identity.clone(),
        };
    }

    let mut scores: Vec<ValidatedScore> = Vec::with_capacity(recognition.scores.len());
    let mut sources: Vec<&str> = Vec::with_capacity(recognition.scores.len());
    let mut notes = Vec::new();

    for (key, &raw) in &recognition.scores {
        let question = key
            .trim()
            .parse::<i32>()
            .ok()
            .and_then(|number| questions.iter().find(|question| question.number == number));

        let Some(question) = question else {
            notes.push(ReconcileNote::UnknownQuestion { key: key.clone() });
            continue;
        };

        let kept = clip_score(raw, question.points);
        if kept != raw {
            notes.push(ReconcileNote::Clipped { question_number: question.number, raw, kept });
        }

        let validated = ValidatedScore {
            student_id: student_id.to_string(),
            question_id: question.id.clone(),
            question_number: question.number,
            score: kept,
        };

        // Keys iterate in order, so the last spelling of a question wins.
        match scores.iter().position(|existing| existing.question_id == question.id) {
            Some(index) => {
                notes.push(ReconcileNote::DuplicateQuestion {
                    question_number: question.number,
                    dropped: sources[index].to_string(),
                    kept: key.clone(),
                });
                scores[index] = validated;
                sources[index] = key.as_str();
            }
            None => {
                scores.push(validated);
                sources.push(key.as_str());
            }
        }
    }

    Reconciled::Accepted { scores, notes }
}
