use async_trait::async_trait;
use chrono::{DateTime, Utc};
use progress_core::model::{ItemId, LessonBook, LessonState, LessonStatus, UserId};
use sqlx::Row;
use tracing::warn;

use super::SqliteRepository;
use crate::repository::{RemoteLessonLedger, RemoteLessonRow, StorageError};

#[async_trait]
impl RemoteLessonLedger for SqliteRepository {
    async fn upsert_lesson(&self, row: &RemoteLessonRow) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO lesson_progress (user_id, lesson_id, percent, status, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(user_id, lesson_id) DO UPDATE SET
                percent = excluded.percent,
                status = excluded.status,
                updated_at = excluded.updated_at
            ",
        )
        .bind(row.user_id.as_str())
        .bind(row.lesson_id.as_str())
        .bind(i64::from(row.state.percent))
        .bind(row.state.status.as_str())
        .bind(row.state.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn lessons(&self, user: &UserId) -> Result<LessonBook, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT lesson_id, percent, status, updated_at FROM lesson_progress
            WHERE user_id = ?1
            ",
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut book = LessonBook::new();
        for row in rows {
            let raw_id: String = row
                .try_get("lesson_id")
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            let percent: i64 = row
                .try_get("percent")
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            let raw_status: String = row
                .try_get("status")
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            let updated_at: DateTime<Utc> = row
                .try_get("updated_at")
                .map_err(|e| StorageError::Serialization(e.to_string()))?;

            let (Ok(lesson), Some(status)) = (ItemId::new(&raw_id), LessonStatus::parse(&raw_status))
            else {
                warn!(lesson = %raw_id, status = %raw_status, "skipping unreadable lesson row");
                continue;
            };
            let percent = u8::try_from(percent.clamp(0, 100)).unwrap_or(100);
            book.set(lesson, LessonState::new(percent, status, updated_at));
        }
        Ok(book)
    }
}
