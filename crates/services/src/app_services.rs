use std::sync::Arc;

use progress_core::CurriculumCatalog;
use progress_core::model::Scope;
use storage::repository::{RemoteLessonLedger, RemoteProgressLedger, Storage};
use tracing::info;

use crate::Clock;
use crate::completion::CompletionHandler;
use crate::config::ProgressConfig;
use crate::error::AppServicesError;
use crate::progress_service::ProgressService;
use crate::remote_rest::RestRemoteLedger;
use crate::session::SessionState;
use crate::streak::StreakTracker;

/// Assembles the app-facing services from configuration.
#[derive(Clone)]
pub struct AppServices {
    progress: Arc<ProgressService>,
    completion: CompletionHandler,
    streak: StreakTracker,
}

impl AppServices {
    /// Build services backed by `SQLite` storage and, when configured, the
    /// REST remote ledger.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage, the curriculum file or the
    /// remote client cannot be initialized.
    pub async fn from_config(config: &ProgressConfig, clock: Clock) -> Result<Self, AppServicesError> {
        let mut storage = Storage::sqlite(&config.db_url).await?;
        if let Some(remote) = &config.remote {
            let rest = Arc::new(RestRemoteLedger::new(remote.clone())?);
            let ledger: Arc<dyn RemoteProgressLedger> = rest.clone();
            let lessons: Arc<dyn RemoteLessonLedger> = rest;
            storage = storage.with_remote(ledger).with_lessons(lessons);
            info!(url = %remote.base_url, "using REST remote ledger");
        }

        let mut catalog = CurriculumCatalog::builtin()?;
        if let Some(path) = &config.curriculum_path {
            let json = std::fs::read_to_string(path).map_err(|source| AppServicesError::Io {
                path: path.clone(),
                source,
            })?;
            let added = catalog.extend_from_json(&json)?;
            info!(path = %path.display(), added, "loaded curricula");
        }

        let session = match &config.user {
            Some(user) => SessionState::with_scope(Scope::Identified(user.clone())),
            None => SessionState::new(),
        };
        Ok(Self::from_storage(clock, session, catalog, &storage))
    }

    #[must_use]
    pub fn from_storage(
        clock: Clock,
        session: SessionState,
        catalog: CurriculumCatalog,
        storage: &Storage,
    ) -> Self {
        let progress = Arc::new(ProgressService::new(clock, session, Arc::new(catalog), storage));
        let streak = StreakTracker::new(clock, progress.local_store().clone());
        let completion = CompletionHandler::new(Arc::clone(&progress));
        Self {
            progress,
            completion,
            streak,
        }
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn completion(&self) -> &CompletionHandler {
        &self.completion
    }

    #[must_use]
    pub fn streak(&self) -> &StreakTracker {
        &self.streak
    }
}
