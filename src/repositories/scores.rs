use sqlx::{PgConnection, PgPool};
use time::PrimitiveDateTime;

use crate::db::models::ScoreRecord;

pub(crate) const COLUMNS: &str =
    "id, exam_id, student_id, question_id, teacher_id, score, updated_at";

pub(crate) struct UpsertScore<'a> {
    pub(crate) id: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) question_id: &'a str,
    pub(crate) teacher_id: &'a str,
    pub(crate) score: f64,
    pub(crate) updated_at: PrimitiveDateTime,
}

pub(crate) async fn list_by_exam(
    pool: &PgPool,
    exam_id: &str,
) -> Result<Vec<ScoreRecord>, sqlx::Error> {
    sqlx::query_as::<_, ScoreRecord>(&format!(
        "SELECT {COLUMNS}
         FROM scores
         WHERE exam_id = $1"
    ))
    .bind(exam_id)
    .fetch_all(pool)
    .await
}

/// Merge-write: a conflicting cell keeps its row and only `score`/`updated_at` change.
pub(crate) async fn upsert(
    conn: &mut PgConnection,
    params: UpsertScore<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "INSERT INTO scores ({COLUMNS})
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (id) DO UPDATE
         SET score = EXCLUDED.score,
             updated_at = EXCLUDED.updated_at"
    ))
    .bind(params.id)
    .bind(params.exam_id)
    .bind(params.student_id)
    .bind(params.question_id)
    .bind(params.teacher_id)
    .bind(params.score)
    .bind(params.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn delete_by_id(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM scores WHERE id = $1").bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn delete_for_student(
    pool: &PgPool,
    exam_id: &str,
    student_id: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM scores WHERE exam_id = $1 AND student_id = $2")
        .bind(exam_id)
        .bind(student_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
