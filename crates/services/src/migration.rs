//! Folds anonymous progress into an identified ledger at sign-in.

use std::sync::Arc;

use progress_core::model::{CourseId, Scope, UserId};
use tracing::{debug, info, warn};

use crate::error::ProgressError;
use crate::ledger_store::LocalLedgerStore;
use crate::sinks::{CompletionFact, CompletionSink, LessonMirror};

/// Outcome of one migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub courses_migrated: usize,
    pub records_adopted: usize,
    pub lessons_adopted: usize,
    pub last_visited_adopted: bool,
    pub failures: usize,
}

impl MigrationReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures == 0
    }
}

/// Unions every anonymous ledger and the anonymous lesson book on this
/// device into a user's.
///
/// The identified entry wins when both sides hold the same item. Anonymous
/// data is removed only after the merged data is written, so a failed run
/// leaves it in place for the next sign-in.
#[derive(Clone)]
pub struct MigrationEngine {
    local: LocalLedgerStore,
    remote: Arc<dyn CompletionSink>,
    lessons: Arc<LessonMirror>,
}

impl MigrationEngine {
    #[must_use]
    pub fn new(
        local: LocalLedgerStore,
        remote: Arc<dyn CompletionSink>,
        lessons: Arc<LessonMirror>,
    ) -> Self {
        Self {
            local,
            remote,
            lessons,
        }
    }

    /// Migrate anonymous progress into `user`. Failures are logged and counted,
    /// never returned.
    pub async fn migrate(&self, user: &UserId) -> MigrationReport {
        let target = Scope::Identified(user.clone());
        let mut report = MigrationReport::default();
        let _guard = self.local.lock().await;

        let courses = match self.local.anonymous_courses().await {
            Ok(courses) => courses,
            Err(err) => {
                warn!(user = %user, error = %err, "could not list anonymous ledgers");
                report.failures += 1;
                Vec::new()
            }
        };

        for course in courses {
            match self.migrate_course(&course, &target).await {
                Ok(adopted) => {
                    report.courses_migrated += 1;
                    report.records_adopted += adopted;
                }
                Err(err) => {
                    warn!(user = %user, course = %course, error = %err, "course migration failed");
                    report.failures += 1;
                }
            }
        }

        match self.migrate_lessons(&target).await {
            Ok(adopted) => report.lessons_adopted = adopted,
            Err(err) => {
                warn!(user = %user, error = %err, "lesson store migration failed");
                report.failures += 1;
            }
        }

        match self.migrate_last_visited(&target).await {
            Ok(adopted) => report.last_visited_adopted = adopted,
            Err(err) => {
                warn!(user = %user, error = %err, "last visited migration failed");
                report.failures += 1;
            }
        }

        info!(
            user = %user,
            courses = report.courses_migrated,
            adopted = report.records_adopted,
            lessons = report.lessons_adopted,
            failures = report.failures,
            "anonymous progress migrated"
        );
        report
    }

    async fn migrate_course(&self, course: &CourseId, target: &Scope) -> Result<usize, ProgressError> {
        let anonymous = self.local.load(course, &Scope::Anonymous).await?;
        let mut identified = self.local.load(course, target).await?;
        let adopted = identified.absorb(&anonymous);

        if !adopted.is_empty() {
            self.local.save(course, target, &identified).await?;
        }
        self.local.remove(course, &Scope::Anonymous).await?;

        for item in &adopted {
            let Some(record) = identified.get(item) else {
                continue;
            };
            let fact = CompletionFact {
                scope: target.clone(),
                course_id: course.clone(),
                record: record.clone(),
            };
            if let Err(err) = self.remote.record(&fact).await {
                debug!(course = %course, item = %item, error = %err, "adopted record not mirrored");
            }
        }
        Ok(adopted.len())
    }

    async fn migrate_lessons(&self, target: &Scope) -> Result<usize, ProgressError> {
        let anonymous = self.local.load_lessons(&Scope::Anonymous).await?;
        if anonymous.is_empty() {
            return Ok(0);
        }
        let mut identified = self.local.load_lessons(target).await?;
        let adopted = identified.absorb(&anonymous);

        if !adopted.is_empty() {
            self.local.save_lessons(target, &identified).await?;
        }
        self.local.remove_lessons(&Scope::Anonymous).await?;

        for lesson in &adopted {
            if let Some(state) = identified.get(lesson) {
                self.lessons.mirror(target, lesson, *state);
            }
        }
        Ok(adopted.len())
    }

    async fn migrate_last_visited(&self, target: &Scope) -> Result<bool, ProgressError> {
        let Some(anonymous) = self.local.last_visited(&Scope::Anonymous).await? else {
            return Ok(false);
        };
        let adopt = self.local.last_visited(target).await?.is_none();
        if adopt {
            self.local.set_last_visited(target, &anonymous).await?;
        }
        self.local.clear_last_visited(&Scope::Anonymous).await?;
        Ok(adopt)
    }
}
