//! REST client for the hosted `course_progress` and `progress` tables
//! (PostgREST dialect).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use progress_core::model::{
    CompletionRecord, CourseId, ItemId, LessonBook, LessonState, LessonStatus, UserId,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use storage::repository::{
    RemoteCompletionRow, RemoteLessonLedger, RemoteLessonRow, RemoteProgressLedger, StorageError,
};
use tracing::warn;

const TABLE_PATH: &str = "rest/v1/course_progress";
const CONFLICT_COLUMNS: &str = "user_id,course_slug,lesson_id";
const LESSON_TABLE_PATH: &str = "rest/v1/progress";
const LESSON_CONFLICT_COLUMNS: &str = "user_id,lesson_id";
const UPSERT_PREFERENCE: &str = "resolution=merge-duplicates,return=minimal";

#[derive(Clone, Debug)]
pub struct RemoteConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

/// Remote progress ledger reached over HTTP.
#[derive(Clone)]
pub struct RestRemoteLedger {
    client: Client,
    config: RemoteConfig,
}

impl RestRemoteLedger {
    /// # Errors
    ///
    /// Returns `reqwest::Error` if the HTTP client cannot be built.
    pub fn new(config: RemoteConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn table_url(&self) -> String {
        self.url_for(TABLE_PATH)
    }

    fn lesson_table_url(&self) -> String {
        self.url_for(LESSON_TABLE_PATH)
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
    }
}

#[derive(Debug, Serialize)]
struct UpsertBody<'a> {
    user_id: &'a str,
    course_slug: &'a str,
    lesson_id: &'a str,
    completed_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ProgressRow {
    lesson_id: String,
    completed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct LessonBody<'a> {
    user_id: &'a str,
    lesson_id: &'a str,
    percent: u8,
    status: LessonStatus,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct LessonRow {
    lesson_id: String,
    percent: u8,
    status: LessonStatus,
    updated_at: DateTime<Utc>,
}

fn connection(err: reqwest::Error) -> StorageError {
    StorageError::Connection(err.to_string())
}

#[async_trait]
impl RemoteProgressLedger for RestRemoteLedger {
    async fn upsert_completion(&self, row: &RemoteCompletionRow) -> Result<(), StorageError> {
        let body = [UpsertBody {
            user_id: row.user_id.as_str(),
            course_slug: row.course_id.as_str(),
            lesson_id: row.item_id.as_str(),
            completed_at: row.completed_at,
        }];
        let response = self
            .authorized(self.client.post(self.table_url()))
            .query(&[("on_conflict", CONFLICT_COLUMNS)])
            .header("Prefer", UPSERT_PREFERENCE)
            .json(&body)
            .send()
            .await
            .map_err(connection)?;

        let status = response.status();
        if status == reqwest::StatusCode::CONFLICT {
            return Err(StorageError::Conflict);
        }
        if !status.is_success() {
            return Err(StorageError::Connection(format!("upsert returned {status}")));
        }
        Ok(())
    }

    async fn completions(
        &self,
        user: &UserId,
        course: &CourseId,
    ) -> Result<Vec<CompletionRecord>, StorageError> {
        let user_filter = format!("eq.{user}");
        let course_filter = format!("eq.{course}");
        let response = self
            .authorized(self.client.get(self.table_url()))
            .query(&[
                ("select", "lesson_id,completed_at"),
                ("user_id", user_filter.as_str()),
                ("course_slug", course_filter.as_str()),
            ])
            .send()
            .await
            .map_err(connection)?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Connection(format!("select returned {status}")));
        }
        let rows: Vec<ProgressRow> = response
            .json()
            .await
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        Ok(rows
            .into_iter()
            .filter_map(|row| match ItemId::new(&row.lesson_id) {
                Ok(id) => Some(CompletionRecord::new(id, row.completed_at)),
                Err(err) => {
                    warn!(course = %course, raw = %row.lesson_id, error = %err, "skipping remote row");
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl RemoteLessonLedger for RestRemoteLedger {
    async fn upsert_lesson(&self, row: &RemoteLessonRow) -> Result<(), StorageError> {
        let body = [LessonBody {
            user_id: row.user_id.as_str(),
            lesson_id: row.lesson_id.as_str(),
            percent: row.state.percent,
            status: row.state.status,
            updated_at: row.state.updated_at,
        }];
        let response = self
            .authorized(self.client.post(self.lesson_table_url()))
            .query(&[("on_conflict", LESSON_CONFLICT_COLUMNS)])
            .header("Prefer", UPSERT_PREFERENCE)
            .json(&body)
            .send()
            .await
            .map_err(connection)?;

        let status = response.status();
        if status == reqwest::StatusCode::CONFLICT {
            return Err(StorageError::Conflict);
        }
        if !status.is_success() {
            return Err(StorageError::Connection(format!("lesson upsert returned {status}")));
        }
        Ok(())
    }

    async fn lessons(&self, user: &UserId) -> Result<LessonBook, StorageError> {
        let user_filter = format!("eq.{user}");
        let response = self
            .authorized(self.client.get(self.lesson_table_url()))
            .query(&[
                ("select", "lesson_id,percent,status,updated_at"),
                ("user_id", user_filter.as_str()),
            ])
            .send()
            .await
            .map_err(connection)?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Connection(format!("lesson select returned {status}")));
        }
        let rows: Vec<LessonRow> = response
            .json()
            .await
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let mut book = LessonBook::new();
        for row in rows {
            match ItemId::new(&row.lesson_id) {
                Ok(lesson) => book.set(lesson, LessonState::new(row.percent, row.status, row.updated_at)),
                Err(err) => warn!(raw = %row.lesson_id, error = %err, "skipping remote lesson row"),
            }
        }
        Ok(book)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_url_ignores_trailing_slash() {
        let ledger = RestRemoteLedger::new(RemoteConfig {
            base_url: "https://db.example.test/".into(),
            api_key: "k".into(),
            timeout: Duration::from_secs(1),
        })
        .unwrap();
        assert_eq!(
            ledger.table_url(),
            "https://db.example.test/rest/v1/course_progress"
        );
        assert_eq!(ledger.lesson_table_url(), "https://db.example.test/rest/v1/progress");
    }

    #[test]
    fn lesson_body_uses_wire_status_names() {
        let body = LessonBody {
            user_id: "u-1",
            lesson_id: "html-1",
            percent: 10,
            status: LessonStatus::InProgress,
            updated_at: progress_core::time::fixed_now(),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["status"], "in_progress");
        assert_eq!(value["percent"], 10);

        let rows: Vec<LessonRow> = serde_json::from_str(
            r#"[{"lesson_id":"html-1","percent":100,"status":"completed","updated_at":"2024-01-02T03:04:05Z"}]"#,
        )
        .unwrap();
        assert_eq!(rows[0].status, LessonStatus::Completed);
    }

    #[test]
    fn rows_decode_from_json() {
        let rows: Vec<ProgressRow> = serde_json::from_str(
            r#"[{"lesson_id":"l1","completed_at":"2024-01-02T03:04:05Z"}]"#,
        )
        .unwrap();
        assert_eq!(rows[0].lesson_id, "l1");
    }

    #[tokio::test]
    async fn unreachable_host_is_a_connection_error() {
        let ledger = RestRemoteLedger::new(RemoteConfig {
            base_url: "http://127.0.0.1:9".into(),
            api_key: "k".into(),
            timeout: Duration::from_millis(500),
        })
        .unwrap();
        let err = ledger
            .completions(&UserId::new("u-1").unwrap(), &CourseId::new("c").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Connection(_)));
    }
}
