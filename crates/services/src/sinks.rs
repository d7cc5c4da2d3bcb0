use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use progress_core::model::{CompletionRecord, CourseId, ItemId, LessonState, Scope};
use storage::repository::{
    RemoteCompletionRow, RemoteLessonLedger, RemoteLessonRow, RemoteProgressLedger,
};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::ProgressError;

/// A completion as handed to a sink: who, which course, which record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionFact {
    pub scope: Scope,
    pub course_id: CourseId,
    pub record: CompletionRecord,
}

/// Destination for completion facts.
///
/// The local ledger applies facts before returning; the remote mirror only
/// schedules them. A durable retry queue can replace the mirror without
/// touching callers.
#[async_trait]
pub trait CompletionSink: Send + Sync {
    /// Accept `fact` and return the record as this sink holds it.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the sink could not accept the fact.
    async fn record(&self, fact: &CompletionFact) -> Result<CompletionRecord, ProgressError>;

    /// Wait for facts accepted so far to settle.
    async fn flush(&self) {}
}

/// Fire-and-forget mirror of identified completions into the remote ledger.
///
/// Anonymous facts are ignored. Upload failures are logged and dropped.
/// Dropping the mirror aborts uploads that are still in flight.
pub struct RemoteMirror {
    ledger: Arc<dyn RemoteProgressLedger>,
    tasks: Mutex<JoinSet<()>>,
}

impl RemoteMirror {
    #[must_use]
    pub fn new(ledger: Arc<dyn RemoteProgressLedger>) -> Self {
        Self {
            ledger,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Uploads spawned and not yet reaped.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl CompletionSink for RemoteMirror {
    async fn record(&self, fact: &CompletionFact) -> Result<CompletionRecord, ProgressError> {
        let Some(user) = fact.scope.user_id() else {
            return Ok(fact.record.clone());
        };
        let row = RemoteCompletionRow::new(user.clone(), fact.course_id.clone(), &fact.record);
        let ledger = Arc::clone(&self.ledger);

        spawn_reaped(&self.tasks, async move {
            match ledger.upsert_completion(&row).await {
                Ok(()) => debug!(
                    user = %row.user_id,
                    course = %row.course_id,
                    item = %row.item_id,
                    "mirrored completion to remote ledger"
                ),
                Err(err) => warn!(
                    user = %row.user_id,
                    course = %row.course_id,
                    item = %row.item_id,
                    error = %err,
                    "remote completion write failed"
                ),
            }
        });
        Ok(fact.record.clone())
    }

    async fn flush(&self) {
        join_all(&self.tasks).await;
    }
}

fn spawn_reaped<F>(tasks: &Mutex<JoinSet<()>>, task: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let mut tasks = tasks.lock().unwrap_or_else(PoisonError::into_inner);
    while tasks.try_join_next().is_some() {}
    tasks.spawn(task);
}

async fn join_all(tasks: &Mutex<JoinSet<()>>) {
    let mut pending = {
        let mut tasks = tasks.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *tasks)
    };
    while let Some(joined) = pending.join_next().await {
        if let Err(err) = joined {
            warn!(error = %err, "remote write task did not finish");
        }
    }
}

/// Fire-and-forget mirror of identified lesson states into the remote
/// lesson table. Same failure policy as [`RemoteMirror`].
pub struct LessonMirror {
    ledger: Arc<dyn RemoteLessonLedger>,
    tasks: Mutex<JoinSet<()>>,
}

impl LessonMirror {
    #[must_use]
    pub fn new(ledger: Arc<dyn RemoteLessonLedger>) -> Self {
        Self {
            ledger,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Schedule an upsert of `state`. Anonymous scopes are skipped.
    pub fn mirror(&self, scope: &Scope, lesson: &ItemId, state: LessonState) {
        let Some(user) = scope.user_id() else {
            return;
        };
        let row = RemoteLessonRow {
            user_id: user.clone(),
            lesson_id: lesson.clone(),
            state,
        };
        let ledger = Arc::clone(&self.ledger);
        spawn_reaped(&self.tasks, async move {
            match ledger.upsert_lesson(&row).await {
                Ok(()) => debug!(
                    user = %row.user_id,
                    lesson = %row.lesson_id,
                    status = %row.state.status,
                    "mirrored lesson state to remote"
                ),
                Err(err) => warn!(
                    user = %row.user_id,
                    lesson = %row.lesson_id,
                    error = %err,
                    "remote lesson write failed"
                ),
            }
        });
    }

    pub async fn flush(&self) {
        join_all(&self.tasks).await;
    }
}
