mod analysis;
mod manage;
mod papers;
mod report;
mod scores;

pub(super) use analysis::run_analysis;
pub(super) use manage::delete_exam;
pub(super) use papers::{delete_paper, upload_paper};
pub(super) use report::exam_report;
pub(super) use scores::{clear_student_scores, list_scores, update_score};
