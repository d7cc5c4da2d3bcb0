use async_trait::async_trait;
use chrono::{DateTime, Utc};
use progress_core::model::{CompletionRecord, CourseId, ItemId, UserId};
use sqlx::Row;
use tracing::warn;

use super::SqliteRepository;
use crate::repository::{RemoteCompletionRow, RemoteProgressLedger, StorageError};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

#[async_trait]
impl RemoteProgressLedger for SqliteRepository {
    async fn upsert_completion(&self, row: &RemoteCompletionRow) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO course_progress (user_id, course_slug, lesson_id, completed_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id, course_slug, lesson_id) DO UPDATE SET
                completed_at = excluded.completed_at
            ",
        )
        .bind(row.user_id.as_str())
        .bind(row.course_id.as_str())
        .bind(row.item_id.as_str())
        .bind(row.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn completions(
        &self,
        user: &UserId,
        course: &CourseId,
    ) -> Result<Vec<CompletionRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT lesson_id, completed_at FROM course_progress
            WHERE user_id = ?1 AND course_slug = ?2
            ORDER BY lesson_id ASC
            ",
        )
        .bind(user.as_str())
        .bind(course.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let raw_id: String = row.try_get("lesson_id").map_err(ser)?;
            let completed_at: DateTime<Utc> = row.try_get("completed_at").map_err(ser)?;
            match ItemId::new(&raw_id) {
                Ok(item_id) => records.push(CompletionRecord::new(item_id, completed_at)),
                Err(err) => warn!(item = %raw_id, error = %err, "skipping remote row with invalid item id"),
            }
        }
        Ok(records)
    }
}
