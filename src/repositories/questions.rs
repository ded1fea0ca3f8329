use sqlx::PgPool;

use crate::db::models::Question;

pub(crate) const COLUMNS: &str = "id, exam_id, number, points, outcome";

pub(crate) async fn list_by_exam(pool: &PgPool, exam_id: &str) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {COLUMNS}
         FROM questions
         WHERE exam_id = $1
         ORDER BY number, id"
    ))
    .bind(exam_id)
    .fetch_all(pool)
    .await
}
