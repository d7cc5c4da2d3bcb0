use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use progress_core::model::{
    CompletionRecord, CourseId, ItemId, LessonBook, LessonState, ProgressLedger, Scope,
};
use storage::keys;
use storage::{ledger_codec, lesson_codec};
use storage::repository::{LocalCache, StorageError};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::error::ProgressError;
use crate::sinks::{CompletionFact, CompletionSink};

/// Typed view over the local cache: ledgers, lesson books, last-visited
/// pointers and raw keys.
///
/// Clones share one write lock so read-modify-write cycles on a ledger never
/// interleave within a process.
#[derive(Clone)]
pub struct LocalLedgerStore {
    cache: Arc<dyn LocalCache>,
    write_lock: Arc<Mutex<()>>,
}

impl LocalLedgerStore {
    #[must_use]
    pub fn new(cache: Arc<dyn LocalCache>) -> Self {
        Self {
            cache,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    /// Load a ledger. Missing or unreadable ledgers load as empty.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` only when the cache itself cannot be read.
    pub async fn load(&self, course: &CourseId, scope: &Scope) -> Result<ProgressLedger, StorageError> {
        let key = keys::progress_key(course, scope);
        let Some(raw) = self.cache.get(&key).await? else {
            return Ok(ProgressLedger::new());
        };
        match ledger_codec::decode(&raw) {
            Ok(ledger) => Ok(ledger),
            Err(err) => {
                warn!(key = %key, error = %err, "discarding unreadable progress ledger");
                Ok(ProgressLedger::new())
            }
        }
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the ledger cannot be encoded or written.
    pub async fn save(
        &self,
        course: &CourseId,
        scope: &Scope,
        ledger: &ProgressLedger,
    ) -> Result<(), StorageError> {
        let encoded = ledger_codec::encode(ledger)?;
        self.cache
            .put(&keys::progress_key(course, scope), &encoded)
            .await
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the cache cannot be written.
    pub async fn remove(&self, course: &CourseId, scope: &Scope) -> Result<(), StorageError> {
        self.cache.remove(&keys::progress_key(course, scope)).await
    }

    /// Record a completion and return the record as stored.
    ///
    /// An item that is already completed keeps its original record and the
    /// ledger is not rewritten.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the ledger cannot be read or written.
    pub async fn record_completion(
        &self,
        course: &CourseId,
        scope: &Scope,
        item: ItemId,
        at: DateTime<Utc>,
    ) -> Result<CompletionRecord, StorageError> {
        let _guard = self.lock().await;
        let mut ledger = self.load(course, scope).await?;
        if ledger.record(item.clone(), at) {
            self.save(course, scope, &ledger).await?;
        }
        ledger
            .get(&item)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    /// Load the lesson book of `scope`. Missing or unreadable books load as empty.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` only when the cache itself cannot be read.
    pub async fn load_lessons(&self, scope: &Scope) -> Result<LessonBook, StorageError> {
        let key = keys::lesson_store_key(scope);
        let Some(raw) = self.cache.get(&key).await? else {
            return Ok(LessonBook::new());
        };
        match lesson_codec::decode(&raw) {
            Ok(book) => Ok(book),
            Err(err) => {
                warn!(key = %key, error = %err, "discarding unreadable lesson store");
                Ok(LessonBook::new())
            }
        }
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the book cannot be encoded or written.
    pub async fn save_lessons(&self, scope: &Scope, book: &LessonBook) -> Result<(), StorageError> {
        let encoded = lesson_codec::encode(book)?;
        self.cache.put(&keys::lesson_store_key(scope), &encoded).await
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the cache cannot be written.
    pub async fn remove_lessons(&self, scope: &Scope) -> Result<(), StorageError> {
        self.cache.remove(&keys::lesson_store_key(scope)).await
    }

    /// Mark `lesson` opened and return the state as stored.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the book cannot be read or written.
    pub async fn open_lesson(
        &self,
        scope: &Scope,
        lesson: ItemId,
        at: DateTime<Utc>,
    ) -> Result<LessonState, StorageError> {
        let _guard = self.lock().await;
        let mut book = self.load_lessons(scope).await?;
        let state = book.open(lesson, at);
        self.save_lessons(scope, &book).await?;
        Ok(state)
    }

    /// Overwrite the state of `lesson`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the book cannot be read or written.
    pub async fn put_lesson(
        &self,
        scope: &Scope,
        lesson: ItemId,
        state: LessonState,
    ) -> Result<(), StorageError> {
        let _guard = self.lock().await;
        let mut book = self.load_lessons(scope).await?;
        book.set(lesson, state);
        self.save_lessons(scope, &book).await
    }

    /// Courses that still have an anonymous-scope ledger on this device.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the cache cannot be scanned.
    pub async fn anonymous_courses(&self) -> Result<Vec<CourseId>, StorageError> {
        let found = self.cache.keys_with_prefix(&keys::progress_prefix()).await?;
        Ok(found
            .iter()
            .filter_map(|key| keys::anonymous_course(key))
            .collect())
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the cache cannot be read.
    pub async fn last_visited(&self, scope: &Scope) -> Result<Option<String>, StorageError> {
        let key = keys::last_visited_key(scope);
        let current = self.cache.get(&key).await?;
        if current.is_some() || !scope.is_anonymous() {
            return Ok(current);
        }

        let Some(legacy) = self.cache.get(keys::LEGACY_ANON_LAST_VISITED_KEY).await? else {
            return Ok(None);
        };
        self.cache.put(&key, &legacy).await?;
        self.cache.remove(keys::LEGACY_ANON_LAST_VISITED_KEY).await?;
        debug!(target_path = %legacy, "moved legacy anonymous last visited pointer");
        Ok(Some(legacy))
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the cache cannot be written.
    pub async fn set_last_visited(&self, scope: &Scope, target: &str) -> Result<(), StorageError> {
        self.cache
            .put(&keys::last_visited_key(scope), target)
            .await
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the cache cannot be written.
    pub async fn clear_last_visited(&self, scope: &Scope) -> Result<(), StorageError> {
        self.cache.remove(&keys::last_visited_key(scope)).await
    }

    pub(crate) fn cache(&self) -> &dyn LocalCache {
        self.cache.as_ref()
    }
}

/// Synchronous local sink: the fact is applied before `record` returns, and
/// the record handed back is the one the ledger keeps.
#[async_trait]
impl CompletionSink for LocalLedgerStore {
    async fn record(&self, fact: &CompletionFact) -> Result<CompletionRecord, ProgressError> {
        let stored = self
            .record_completion(
                &fact.course_id,
                &fact.scope,
                fact.record.item_id.clone(),
                fact.record.completed_at,
            )
            .await?;
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use progress_core::model::{LessonStatus, UserId};
    use progress_core::time::fixed_now;
    use storage::repository::InMemoryRepository;

    fn course() -> CourseId {
        CourseId::new("html-fundamentals").unwrap()
    }

    fn item(raw: &str) -> ItemId {
        ItemId::new(raw).unwrap()
    }

    #[tokio::test]
    async fn missing_ledger_loads_empty() {
        let store = LocalLedgerStore::new(Arc::new(InMemoryRepository::new()));
        let ledger = store.load(&course(), &Scope::Anonymous).await.unwrap();
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn corrupt_ledger_loads_empty() {
        let repo = InMemoryRepository::new();
        repo.put("progress:html-fundamentals", "[oops").await.unwrap();
        let store = LocalLedgerStore::new(Arc::new(repo));
        assert!(store.load(&course(), &Scope::Anonymous).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn record_completion_keeps_first_timestamp() {
        let store = LocalLedgerStore::new(Arc::new(InMemoryRepository::new()));
        let first = store
            .record_completion(&course(), &Scope::Anonymous, item("l1"), fixed_now())
            .await
            .unwrap();
        let again = store
            .record_completion(
                &course(),
                &Scope::Anonymous,
                item("l1"),
                fixed_now() + Duration::days(2),
            )
            .await
            .unwrap();
        assert_eq!(first, again);
    }

    #[tokio::test]
    async fn scopes_are_isolated() {
        let store = LocalLedgerStore::new(Arc::new(InMemoryRepository::new()));
        let user = Scope::Identified(UserId::new("u-1").unwrap());
        store
            .record_completion(&course(), &Scope::Anonymous, item("l1"), fixed_now())
            .await
            .unwrap();

        assert!(store.load(&course(), &user).await.unwrap().is_empty());
        assert_eq!(store.anonymous_courses().await.unwrap(), vec![course()]);
    }

    #[tokio::test]
    async fn local_sink_returns_the_kept_record() {
        let store = LocalLedgerStore::new(Arc::new(InMemoryRepository::new()));
        let fact = |at| CompletionFact {
            scope: Scope::Anonymous,
            course_id: course(),
            record: CompletionRecord::new(item("l1"), at),
        };

        let first = CompletionSink::record(&store, &fact(fixed_now())).await.unwrap();
        let later = CompletionSink::record(&store, &fact(fixed_now() + Duration::hours(1)))
            .await
            .unwrap();

        assert_eq!(first.completed_at, fixed_now());
        assert_eq!(later, first);
        assert!(store.load(&course(), &Scope::Anonymous).await.unwrap().contains(&item("l1")));
    }

    #[tokio::test]
    async fn lesson_book_survives_reload() {
        let store = LocalLedgerStore::new(Arc::new(InMemoryRepository::new()));
        let scope = Scope::Identified(UserId::new("u-1").unwrap());
        store.open_lesson(&scope, item("html-1"), fixed_now()).await.unwrap();
        store
            .put_lesson(&scope, item("html-2"), LessonState::finished(fixed_now()))
            .await
            .unwrap();

        let book = store.load_lessons(&scope).await.unwrap();
        assert_eq!(book.get(&item("html-1")).unwrap().status, LessonStatus::InProgress);
        assert!(book.get(&item("html-2")).unwrap().is_completed());
        assert!(store.load_lessons(&Scope::Anonymous).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn legacy_anonymous_pointer_is_moved_once() {
        let repo = InMemoryRepository::new();
        repo.put("last_lesson:anon", "/html/lessons/l3").await.unwrap();
        let store = LocalLedgerStore::new(Arc::new(repo.clone()));

        assert_eq!(
            store.last_visited(&Scope::Anonymous).await.unwrap().as_deref(),
            Some("/html/lessons/l3")
        );
        assert_eq!(repo.get("last_lesson:anon").await.unwrap(), None);
        assert_eq!(repo.get("last_lesson").await.unwrap().as_deref(), Some("/html/lessons/l3"));

        store.set_last_visited(&Scope::Anonymous, "/html/lessons/l4").await.unwrap();
        assert_eq!(
            store.last_visited(&Scope::Anonymous).await.unwrap().as_deref(),
            Some("/html/lessons/l4")
        );
    }
}
