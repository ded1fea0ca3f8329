mod handlers;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:exam_id", delete(handlers::delete_exam))
        .route("/:exam_id/analysis", post(handlers::run_analysis))
        .route("/:exam_id/scores", get(handlers::list_scores).put(handlers::update_score))
        .route("/:exam_id/students/:student_id/scores", delete(handlers::clear_student_scores))
        .route("/:exam_id/students/:student_id/papers", post(handlers::upload_paper))
        .route("/:exam_id/papers/:paper_id", delete(handlers::delete_paper))
        .route("/:exam_id/report", get(handlers::exam_report))
}

#[cfg(test)]
mod tests;
