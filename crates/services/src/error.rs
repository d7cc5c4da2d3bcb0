//! Shared error types for the services crate.

use std::path::PathBuf;

use thiserror::Error;

use progress_core::CatalogError;
use progress_core::model::{CourseId, IdError};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by the progress facade and migration.
///
/// Only `StorageUnavailable` reaches callers of write operations; remote
/// failures are logged at the sink boundary and reads fall back to defaults.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("local progress storage unavailable: {0}")]
    StorageUnavailable(#[from] StorageError),

    #[error("remote progress ledger unavailable: {0}")]
    RemoteUnavailable(#[source] StorageError),

    #[error("not found: {0}")]
    NotFound(String),

    /// Union merges cannot conflict; kept so callers can match exhaustively
    /// on the documented taxonomy.
    #[error("migration conflict in course {0}")]
    MigrationConflict(CourseId),
}

impl ProgressError {
    pub(crate) fn unknown_course(course: &CourseId) -> Self {
        Self::NotFound(format!("course {course}"))
    }
}

impl From<CatalogError> for ProgressError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(course) => Self::unknown_course(&course),
            other => Self::NotFound(other.to_string()),
        }
    }
}

/// Errors emitted while reading configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("database url cannot be empty")]
    EmptyDbUrl,
    #[error("invalid user id: {0}")]
    InvalidUser(#[from] IdError),
    #[error("invalid remote timeout (expected whole seconds): {raw}")]
    InvalidTimeout { raw: String },
    #[error("remote url is set but the remote key is missing")]
    MissingRemoteKey,
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("remote client setup failed: {0}")]
    Remote(#[from] reqwest::Error),
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
