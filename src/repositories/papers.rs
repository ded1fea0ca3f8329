use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Paper;

pub(crate) const COLUMNS: &str = "id, exam_id, student_id, image_data, uploaded_at";

pub(crate) struct CreatePaper<'a> {
    pub(crate) id: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) image_data: &'a str,
    pub(crate) uploaded_at: PrimitiveDateTime,
}

pub(crate) async fn list_by_student(
    pool: &PgPool,
    exam_id: &str,
    student_id: &str,
) -> Result<Vec<Paper>, sqlx::Error> {
    sqlx::query_as::<_, Paper>(&format!(
        "SELECT {COLUMNS}
         FROM papers
         WHERE exam_id = $1 AND student_id = $2
         ORDER BY uploaded_at, id"
    ))
    .bind(exam_id)
    .bind(student_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn create(pool: &PgPool, params: CreatePaper<'_>) -> Result<Paper, sqlx::Error> {
    sqlx::query_as::<_, Paper>(&format!(
        "INSERT INTO papers ({COLUMNS})
         VALUES ($1, $2, $3, $4, $5)
         RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.exam_id)
    .bind(params.student_id)
    .bind(params.image_data)
    .bind(params.uploaded_at)
    .fetch_one(pool)
    .await
}

pub(crate) async fn delete(pool: &PgPool, exam_id: &str, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM papers WHERE id = $1 AND exam_id = $2")
        .bind(id)
        .bind(exam_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
