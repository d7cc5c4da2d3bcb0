use std::sync::Arc;

use progress_core::model::{CourseId, ItemId};
use tracing::debug;

use crate::error::ProgressError;
use crate::progress_service::ProgressService;

/// Verdict of an exercise validator on one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckVerdict {
    pub passed: bool,
    pub feedback: Option<String>,
}

impl CheckVerdict {
    #[must_use]
    pub fn pass() -> Self {
        Self {
            passed: true,
            feedback: None,
        }
    }

    #[must_use]
    pub fn fail(feedback: impl Into<String>) -> Self {
        Self {
            passed: false,
            feedback: Some(feedback.into()),
        }
    }
}

/// Exercise-specific validator supplied by the lesson content.
pub trait ExerciseCheck: Send + Sync {
    fn check(&self, submission: &str) -> CheckVerdict;
}

impl<F> ExerciseCheck for F
where
    F: Fn(&str) -> CheckVerdict + Send + Sync,
{
    fn check(&self, submission: &str) -> CheckVerdict {
        self(submission)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Completed,
    AlreadyCompleted,
    Rejected { feedback: Option<String> },
}

/// Runs a submission through its check and records the completion on pass.
#[derive(Clone)]
pub struct CompletionHandler {
    progress: Arc<ProgressService>,
}

impl CompletionHandler {
    #[must_use]
    pub fn new(progress: Arc<ProgressService>) -> Self {
        Self { progress }
    }

    /// Check `submission` and record the completion on pass.
    ///
    /// A passing resubmission still goes through `mark_completed`, so the
    /// kept record is offered to the remote ledger again.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::NotFound` for an item outside a known course and
    /// `ProgressError::StorageUnavailable` if the completion cannot be stored.
    pub async fn submit(
        &self,
        course: &CourseId,
        item: &ItemId,
        check: &dyn ExerciseCheck,
        submission: &str,
    ) -> Result<SubmissionOutcome, ProgressError> {
        self.progress.ensure_known(course, item)?;

        let verdict = check.check(submission);
        if !verdict.passed {
            debug!(course = %course, item = %item, "submission rejected");
            return Ok(SubmissionOutcome::Rejected {
                feedback: verdict.feedback,
            });
        }

        let was_completed = self.progress.is_completed(course, item).await;
        self.progress.mark_completed(course, item).await?;
        if was_completed {
            Ok(SubmissionOutcome::AlreadyCompleted)
        } else {
            Ok(SubmissionOutcome::Completed)
        }
    }
}
