use sqlx::{PgConnection, PgPool};

use crate::db::models::Exam;

pub(crate) const COLUMNS: &str = "id, title, teacher_id, class_id, created_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Every exam-owned row goes in the same transaction as the exam itself.
pub(crate) async fn delete_cascade(conn: &mut PgConnection, id: &str) -> Result<(), sqlx::Error> {
    for table in ["scores", "questions", "papers"] {
        sqlx::query(&format!("DELETE FROM {table} WHERE exam_id = $1"))
            .bind(id)
            .execute(&mut *conn)
            .await?;
    }

    sqlx::query("DELETE FROM exams WHERE id = $1").bind(id).execute(&mut *conn).await?;
    Ok(())
}
