//! SQLite-backed campus records.

use std::sync::Arc;

use serde_json::{Value, json};
use sqlx::{Row, SqlitePool};
use tracing::instrument;
use uuid::Uuid;

use crate::clients::{CampusStore, LeaveRecord, StoreError};

/// Campus store over a SQLite pool, typically shared with the checkpointer.
pub struct SqliteCampusStore {
    pool: Arc<SqlitePool>,
}

impl std::fmt::Debug for SqliteCampusStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCampusStore").finish()
    }
}

fn backend(context: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend {
        message: format!("{context}: {err}"),
    }
}

impl SqliteCampusStore {
    #[must_use]
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CampusStore for SqliteCampusStore {
    #[instrument(skip(self), err)]
    async fn grades_for(&self, student_id: i64) -> Result<Value, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT course_name, score, term
            FROM grades
            WHERE student_id = ?1
            ORDER BY term, course_name
            "#,
        )
        .bind(student_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| backend("select grades", e))?;

        if rows.is_empty() {
            return Err(StoreError::NotFound { student_id });
        }
        let grades: Vec<Value> = rows
            .iter()
            .map(|row| {
                json!({
                    "course_name": row.get::<String, _>("course_name"),
                    "score": row.get::<f64, _>("score"),
                    "term": row.get::<String, _>("term"),
                })
            })
            .collect();
        Ok(Value::Array(grades))
    }

    #[instrument(skip(self), err)]
    async fn schedule_for(&self, student_id: i64) -> Result<Value, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT course_name, weekday, start_time, end_time, location
            FROM course_schedule
            WHERE student_id = ?1
            ORDER BY weekday, start_time
            "#,
        )
        .bind(student_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| backend("select schedule", e))?;

        if rows.is_empty() {
            return Err(StoreError::NotFound { student_id });
        }
        let schedule: Vec<Value> = rows
            .iter()
            .map(|row| {
                json!({
                    "course_name": row.get::<String, _>("course_name"),
                    "weekday": row.get::<i64, _>("weekday"),
                    "start_time": row.get::<String, _>("start_time"),
                    "end_time": row.get::<String, _>("end_time"),
                    "location": row.get::<String, _>("location"),
                })
            })
            .collect();
        Ok(Value::Array(schedule))
    }

    #[instrument(skip(self, record), fields(student_id = record.student_id), err)]
    async fn insert_leave(&self, record: &LeaveRecord) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO leave_requests (id, student_id, leave_type, start_date, end_date, reason)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&id)
        .bind(record.student_id)
        .bind(record.leave_type.as_str())
        .bind(record.start_date.to_string())
        .bind(record.end_date.to_string())
        .bind(&record.reason)
        .execute(&*self.pool)
        .await
        .map_err(|e| backend("insert leave", e))?;
        Ok(id)
    }
}
