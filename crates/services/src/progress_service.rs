use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use progress_core::Clock;
use progress_core::CurriculumCatalog;
use progress_core::model::{
    CompletionRecord, CourseId, ItemId, LessonBook, LessonState, LessonStatus, ProgressLedger,
    Scope, UserId,
};
use progress_core::sequencer::{self, CourseRoadmap};
use storage::repository::{RemoteProgressLedger, Storage};
use tracing::{debug, info, warn};

use crate::error::ProgressError;
use crate::ledger_store::LocalLedgerStore;
use crate::migration::{MigrationEngine, MigrationReport};
use crate::session::SessionState;
use crate::sinks::{CompletionFact, CompletionSink, LessonMirror, RemoteMirror};

/// Completed/total summary for one course.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CourseSummary {
    pub completed: usize,
    pub total: usize,
    pub percentage: u8,
}

/// Progress facade over the active scope.
///
/// Writes land in the local cache before returning; identified completions
/// and lesson states are mirrored to the remote tables in the background.
/// Reads only touch the local cache and fall back to empty results.
pub struct ProgressService {
    clock: Clock,
    session: SessionState,
    catalog: Arc<CurriculumCatalog>,
    local: LocalLedgerStore,
    remote: Arc<dyn CompletionSink>,
    remote_ledger: Arc<dyn RemoteProgressLedger>,
    lessons: Arc<LessonMirror>,
    migration: MigrationEngine,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        session: SessionState,
        catalog: Arc<CurriculumCatalog>,
        storage: &Storage,
    ) -> Self {
        let mirror: Arc<dyn CompletionSink> =
            Arc::new(RemoteMirror::new(Arc::clone(&storage.remote)));
        Self::with_remote_sink(clock, session, catalog, storage, mirror)
    }

    /// Build the facade with a custom remote sink.
    #[must_use]
    pub fn with_remote_sink(
        clock: Clock,
        session: SessionState,
        catalog: Arc<CurriculumCatalog>,
        storage: &Storage,
        remote: Arc<dyn CompletionSink>,
    ) -> Self {
        let local = LocalLedgerStore::new(Arc::clone(&storage.cache));
        let lessons = Arc::new(LessonMirror::new(Arc::clone(&storage.lessons)));
        let migration =
            MigrationEngine::new(local.clone(), Arc::clone(&remote), Arc::clone(&lessons));
        Self {
            clock,
            session,
            catalog,
            local,
            remote,
            remote_ledger: Arc::clone(&storage.remote),
            lessons,
            migration,
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &CurriculumCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn local_store(&self) -> &LocalLedgerStore {
        &self.local
    }

    #[must_use]
    pub fn scope(&self) -> Scope {
        self.session.scope()
    }

    /// Mark an item completed in the active scope.
    ///
    /// Completing an item twice keeps the first record; the kept record is
    /// still handed to the remote sink. Unknown items are rejected only for
    /// courses the catalog knows; completion order is not enforced.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::StorageUnavailable` if the local ledger cannot
    /// be written, or `ProgressError::NotFound` for an item outside a known
    /// course.
    pub async fn mark_completed(
        &self,
        course: &CourseId,
        item: &ItemId,
    ) -> Result<CompletionRecord, ProgressError> {
        self.ensure_known(course, item)?;

        let scope = self.session.scope();
        let proposed = CompletionFact {
            scope,
            course_id: course.clone(),
            record: CompletionRecord::new(item.clone(), self.clock.now()),
        };
        let record = CompletionSink::record(&self.local, &proposed).await?;
        debug!(course = %course, item = %item, scope = %proposed.scope, "completion recorded");

        let fact = CompletionFact {
            record: record.clone(),
            ..proposed
        };
        if let Err(err) = self.remote.record(&fact).await {
            warn!(course = %course, item = %item, error = %err, "remote mirror rejected completion");
        }
        Ok(record)
    }

    /// Reject items missing from a course the catalog knows.
    pub(crate) fn ensure_known(&self, course: &CourseId, item: &ItemId) -> Result<(), ProgressError> {
        match self.catalog.get(course) {
            Ok(curriculum) if curriculum.item(item).is_none() => Err(ProgressError::NotFound(
                format!("item {item} in course {course}"),
            )),
            _ => Ok(()),
        }
    }

    /// Completion records of the active scope. Empty when unreadable.
    pub async fn completed_lessons(&self, course: &CourseId) -> BTreeMap<ItemId, CompletionRecord> {
        self.ledger(course).await.into_map()
    }

    pub async fn completed_items(&self, course: &CourseId) -> BTreeSet<ItemId> {
        self.ledger(course).await.item_ids()
    }

    pub async fn completed_count(&self, course: &CourseId) -> usize {
        self.ledger(course).await.len()
    }

    /// Percentage of `total` completed, clamped to 100; 0 when `total` is 0.
    pub async fn progress_percentage(&self, course: &CourseId, total: usize) -> u8 {
        sequencer::percentage(self.completed_count(course).await, total)
    }

    pub async fn is_completed(&self, course: &CourseId, item: &ItemId) -> bool {
        self.ledger(course).await.contains(item)
    }

    /// Forget the active scope's local ledger for `course`. Remote rows stay.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::StorageUnavailable` if the cache cannot be written.
    pub async fn reset_course(&self, course: &CourseId) -> Result<(), ProgressError> {
        let scope = self.session.scope();
        let _guard = self.local.lock().await;
        self.local.remove(course, &scope).await?;
        info!(course = %course, scope = %scope, "course progress reset");
        Ok(())
    }

    /// Sequencer view of a catalog course.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::NotFound` for a course outside the catalog.
    pub async fn course_status(&self, course: &CourseId) -> Result<CourseRoadmap, ProgressError> {
        let curriculum = self.catalog.get(course)?;
        let completed = self.completed_items(course).await;
        Ok(sequencer::derive(curriculum, &completed))
    }

    /// Summaries for the given courses. Courses outside the catalog report a
    /// total of 0.
    pub async fn all_courses_progress(
        &self,
        courses: &[CourseId],
    ) -> BTreeMap<CourseId, CourseSummary> {
        let mut out = BTreeMap::new();
        for course in courses {
            let total = self
                .catalog
                .get(course)
                .map_or(0, |curriculum| curriculum.item_count());
            let completed = self.completed_count(course).await;
            out.insert(
                course.clone(),
                CourseSummary {
                    completed,
                    total,
                    percentage: sequencer::percentage(completed, total),
                },
            );
        }
        out
    }

    /// # Errors
    ///
    /// Returns `ProgressError::StorageUnavailable` if the cache cannot be written.
    pub async fn set_last_visited(&self, target: &str) -> Result<(), ProgressError> {
        let scope = self.session.scope();
        self.local.set_last_visited(&scope, target).await?;
        Ok(())
    }

    pub async fn last_visited(&self) -> Option<String> {
        let scope = self.session.scope();
        match self.local.last_visited(&scope).await {
            Ok(target) => target,
            Err(err) => {
                warn!(scope = %scope, error = %err, "last visited read failed");
                None
            }
        }
    }

    /// Record that `lesson` was opened: in progress at 10%, unless it is
    /// already completed.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::StorageUnavailable` if the lesson store cannot
    /// be written.
    pub async fn open_lesson(&self, lesson: &ItemId) -> Result<LessonState, ProgressError> {
        let scope = self.session.scope();
        let state = self
            .local
            .open_lesson(&scope, lesson.clone(), self.clock.now())
            .await?;
        debug!(lesson = %lesson, scope = %scope, percent = state.percent, "lesson opened");
        self.lessons.mirror(&scope, lesson, state);
        Ok(state)
    }

    /// Record that the learner moved past `lesson`: completed at 100%.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::StorageUnavailable` if the lesson store cannot
    /// be written.
    pub async fn finish_lesson(&self, lesson: &ItemId) -> Result<LessonState, ProgressError> {
        self.save_lesson_progress(lesson, 100, LessonStatus::Completed)
            .await
    }

    /// Store an explicit reading state for `lesson`. Percent is clamped to 100.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::StorageUnavailable` if the lesson store cannot
    /// be written.
    pub async fn save_lesson_progress(
        &self,
        lesson: &ItemId,
        percent: u8,
        status: LessonStatus,
    ) -> Result<LessonState, ProgressError> {
        let scope = self.session.scope();
        let state = LessonState::new(percent, status, self.clock.now());
        self.local.put_lesson(&scope, lesson.clone(), state).await?;
        debug!(lesson = %lesson, scope = %scope, status = %status, "lesson progress saved");
        self.lessons.mirror(&scope, lesson, state);
        Ok(state)
    }

    pub async fn lesson_progress(&self, lesson: &ItemId) -> Option<LessonState> {
        self.lesson_book().await.get(lesson).copied()
    }

    /// Lesson states of the active scope. Empty when unreadable.
    pub async fn lesson_book(&self) -> LessonBook {
        let scope = self.session.scope();
        match self.local.load_lessons(&scope).await {
            Ok(book) => book,
            Err(err) => {
                warn!(scope = %scope, error = %err, "lesson store read failed");
                LessonBook::new()
            }
        }
    }

    /// Union the remote ledger into the local one. Local records win.
    ///
    /// Returns the number of records adopted. Anonymous scopes and remote
    /// failures adopt nothing.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::StorageUnavailable` if the local ledger cannot
    /// be written.
    pub async fn refresh_from_remote(&self, course: &CourseId) -> Result<usize, ProgressError> {
        let scope = self.session.scope();
        let Some(user) = scope.user_id() else {
            return Ok(0);
        };
        let remote: ProgressLedger = match self.remote_ledger.completions(user, course).await {
            Ok(records) => records.into_iter().collect(),
            Err(err) => {
                let err = ProgressError::RemoteUnavailable(err);
                warn!(course = %course, user = %user, error = %err, "remote refresh skipped");
                return Ok(0);
            }
        };

        let _guard = self.local.lock().await;
        let mut local = self.local.load(course, &scope).await?;
        let adopted = local.absorb(&remote);
        if !adopted.is_empty() {
            self.local.save(course, &scope, &local).await?;
        }
        debug!(course = %course, user = %user, adopted = adopted.len(), "remote refresh applied");
        Ok(adopted.len())
    }

    /// Fold anonymous progress into `user` and make it the active scope.
    pub async fn sign_in(&self, user: UserId) -> MigrationReport {
        let report = self.migration.migrate(&user).await;
        self.session.set_identified(user);
        report
    }

    pub fn sign_out(&self) {
        self.session.clear();
    }

    /// Wait for background remote writes to settle.
    pub async fn drain_remote(&self) {
        self.remote.flush().await;
        self.lessons.flush().await;
    }

    async fn ledger(&self, course: &CourseId) -> ProgressLedger {
        let scope = self.session.scope();
        match self.local.load(course, &scope).await {
            Ok(ledger) => ledger,
            Err(err) => {
                warn!(course = %course, scope = %scope, error = %err, "progress read failed");
                ProgressLedger::new()
            }
        }
    }
}
