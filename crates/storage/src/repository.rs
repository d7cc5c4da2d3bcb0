use async_trait::async_trait;
use chrono::{DateTime, Utc};
use progress_core::model::{CompletionRecord, CourseId, ItemId, LessonBook, LessonState, UserId};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// One row of the remote ledger, unique on (user, course, item).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCompletionRow {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub item_id: ItemId,
    pub completed_at: DateTime<Utc>,
}

impl RemoteCompletionRow {
    #[must_use]
    pub fn new(user_id: UserId, course_id: CourseId, record: &CompletionRecord) -> Self {
        Self {
            user_id,
            course_id,
            item_id: record.item_id.clone(),
            completed_at: record.completed_at,
        }
    }
}

/// One row of the remote lesson table, unique on (user, lesson).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLessonRow {
    pub user_id: UserId,
    pub lesson_id: ItemId,
    pub state: LessonState,
}

/// Device-local key-value cache holding serialized ledgers and pointers.
#[async_trait]
pub trait LocalCache: Send + Sync {
    /// Read the raw value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the cache cannot be read.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be written.
    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the cache cannot be written.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// List keys starting with `prefix`, sorted.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the cache cannot be read.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// Authoritative store of completions keyed by (user, course, item).
#[async_trait]
pub trait RemoteProgressLedger: Send + Sync {
    /// Insert the row, or update `completed_at` if the key triple exists.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing store is unreachable or rejects the row.
    async fn upsert_completion(&self, row: &RemoteCompletionRow) -> Result<(), StorageError>;

    /// Fetch every completion of `user` in `course`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing store is unreachable.
    async fn completions(
        &self,
        user: &UserId,
        course: &CourseId,
    ) -> Result<Vec<CompletionRecord>, StorageError>;
}

/// Remote per-lesson reading state keyed by (user, lesson).
#[async_trait]
pub trait RemoteLessonLedger: Send + Sync {
    /// Insert the row, or overwrite the stored state if the pair exists.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing store is unreachable or rejects the row.
    async fn upsert_lesson(&self, row: &RemoteLessonRow) -> Result<(), StorageError>;

    /// Fetch every lesson state of `user`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing store is unreachable.
    async fn lessons(&self, user: &UserId) -> Result<LessonBook, StorageError>;
}

type RemoteKey = (UserId, CourseId, ItemId);

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    cache: Arc<Mutex<BTreeMap<String, String>>>,
    remote: Arc<Mutex<HashMap<RemoteKey, DateTime<Utc>>>>,
    remote_lessons: Arc<Mutex<HashMap<(UserId, ItemId), LessonState>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in the remote ledger.
    #[must_use]
    pub fn remote_row_count(&self) -> usize {
        self.remote.lock().map(|guard| guard.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LocalCache for InMemoryRepository {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let guard = self
            .cache
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut guard = self
            .cache
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut guard = self
            .cache
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(key);
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let guard = self
            .cache
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RemoteProgressLedger for InMemoryRepository {
    async fn upsert_completion(&self, row: &RemoteCompletionRow) -> Result<(), StorageError> {
        let mut guard = self
            .remote
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(
            (
                row.user_id.clone(),
                row.course_id.clone(),
                row.item_id.clone(),
            ),
            row.completed_at,
        );
        Ok(())
    }

    async fn completions(
        &self,
        user: &UserId,
        course: &CourseId,
    ) -> Result<Vec<CompletionRecord>, StorageError> {
        let guard = self
            .remote
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut found: Vec<CompletionRecord> = guard
            .iter()
            .filter(|((u, c, _), _)| u == user && c == course)
            .map(|((_, _, item), at)| CompletionRecord::new(item.clone(), *at))
            .collect();
        found.sort_by(|a, b| a.item_id.cmp(&b.item_id));
        Ok(found)
    }
}

#[async_trait]
impl RemoteLessonLedger for InMemoryRepository {
    async fn upsert_lesson(&self, row: &RemoteLessonRow) -> Result<(), StorageError> {
        let mut guard = self
            .remote_lessons
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert((row.user_id.clone(), row.lesson_id.clone()), row.state);
        Ok(())
    }

    async fn lessons(&self, user: &UserId) -> Result<LessonBook, StorageError> {
        let guard = self
            .remote_lessons
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut book = LessonBook::new();
        for ((owner, lesson), state) in guard.iter() {
            if owner == user {
                book.set(lesson.clone(), *state);
            }
        }
        Ok(book)
    }
}

/// Aggregates the local cache and remote ledger behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub cache: Arc<dyn LocalCache>,
    pub remote: Arc<dyn RemoteProgressLedger>,
    pub lessons: Arc<dyn RemoteLessonLedger>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let cache: Arc<dyn LocalCache> = Arc::new(repo.clone());
        let remote: Arc<dyn RemoteProgressLedger> = Arc::new(repo.clone());
        let lessons: Arc<dyn RemoteLessonLedger> = Arc::new(repo);
        Self {
            cache,
            remote,
            lessons,
        }
    }

    /// Replace the remote ledger, keeping the local cache.
    #[must_use]
    pub fn with_remote(mut self, remote: Arc<dyn RemoteProgressLedger>) -> Self {
        self.remote = remote;
        self
    }

    /// Replace the remote lesson ledger, keeping everything else.
    #[must_use]
    pub fn with_lessons(mut self, lessons: Arc<dyn RemoteLessonLedger>) -> Self {
        self.lessons = lessons;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::LessonStatus;
    use progress_core::time::fixed_now;

    fn row(user: &str, item: &str) -> RemoteCompletionRow {
        RemoteCompletionRow {
            user_id: UserId::new(user).unwrap(),
            course_id: CourseId::new("html-fundamentals").unwrap(),
            item_id: ItemId::new(item).unwrap(),
            completed_at: fixed_now(),
        }
    }

    #[tokio::test]
    async fn cache_lists_keys_by_prefix() {
        let repo = InMemoryRepository::new();
        repo.put("progress:a", "{}").await.unwrap();
        repo.put("progress:b:u1", "{}").await.unwrap();
        repo.put("last_lesson", "/x").await.unwrap();

        let keys = repo.keys_with_prefix("progress:").await.unwrap();
        assert_eq!(keys, ["progress:a", "progress:b:u1"]);

        repo.remove("progress:a").await.unwrap();
        repo.remove("progress:missing").await.unwrap();
        assert_eq!(repo.get("progress:a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn remote_upsert_never_duplicates() {
        let repo = InMemoryRepository::new();
        repo.upsert_completion(&row("u1", "l1")).await.unwrap();
        repo.upsert_completion(&row("u1", "l1")).await.unwrap();
        repo.upsert_completion(&row("u2", "l1")).await.unwrap();

        assert_eq!(repo.remote_row_count(), 2);
        let user = UserId::new("u1").unwrap();
        let course = CourseId::new("html-fundamentals").unwrap();
        assert_eq!(repo.completions(&user, &course).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn lesson_rows_are_unique_per_user_and_lesson() {
        let repo = InMemoryRepository::new();
        let user = UserId::new("u1").unwrap();
        let lesson = ItemId::new("html-1").unwrap();
        for state in [LessonState::opened(fixed_now()), LessonState::finished(fixed_now())] {
            repo.upsert_lesson(&RemoteLessonRow {
                user_id: user.clone(),
                lesson_id: lesson.clone(),
                state,
            })
            .await
            .unwrap();
        }

        let book = repo.lessons(&user).await.unwrap();
        assert_eq!(book.len(), 1);
        assert_eq!(book.get(&lesson).unwrap().status, LessonStatus::Completed);
        assert!(repo.lessons(&UserId::new("u2").unwrap()).await.unwrap().is_empty());
    }
}
