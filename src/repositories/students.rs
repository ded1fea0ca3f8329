use sqlx::PgPool;

use crate::db::models::Student;

pub(crate) const COLUMNS: &str = "id, class_id, name, roster_number";

pub(crate) async fn list_by_class(pool: &PgPool, class_id: &str) -> Result<Vec<Student>, sqlx::Error> {
    sqlx::query_as::<_, Student>(&format!(
        "SELECT {COLUMNS}
         FROM students
         WHERE class_id = $1
         ORDER BY roster_number, name"
    ))
    .bind(class_id)
    .fetch_all(pool)
    .await
}
