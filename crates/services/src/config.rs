use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use progress_core::model::UserId;

use crate::error::ConfigError;
use crate::remote_rest::RemoteConfig;

pub const DEFAULT_DB_URL: &str = "sqlite://progress.sqlite3";
pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Process configuration read from `PROGRESS_*` environment variables.
///
/// `remote_key` and `remote_timeout` are kept even without a remote url so a
/// url supplied later can still build a [`RemoteConfig`].
#[derive(Clone, Debug)]
pub struct ProgressConfig {
    pub db_url: String,
    pub remote: Option<RemoteConfig>,
    pub remote_key: Option<String>,
    pub remote_timeout: Duration,
    pub curriculum_path: Option<PathBuf>,
    pub user: Option<UserId>,
    pub log_filter: String,
}

impl ProgressConfig {
    /// # Errors
    ///
    /// Returns `ConfigError` when a variable is present but unusable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a variable is present but unusable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let db_url = var("PROGRESS_DB_URL").map_or_else(|| DEFAULT_DB_URL.to_string(), normalize_sqlite_url);

        let timeout_secs = match var("PROGRESS_REMOTE_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidTimeout { raw })?,
            None => DEFAULT_REMOTE_TIMEOUT_SECS,
        };
        let remote_key = var("PROGRESS_REMOTE_KEY").map(|key| key.trim().to_string());
        let remote_timeout = Duration::from_secs(timeout_secs);

        let user = var("PROGRESS_USER").map(UserId::new).transpose()?;
        let log_filter = var("PROGRESS_LOG")
            .or_else(|| var("RUST_LOG"))
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        let mut config = Self {
            db_url,
            remote: None,
            remote_key,
            remote_timeout,
            curriculum_path: var("PROGRESS_CURRICULUM").map(PathBuf::from),
            user,
            log_filter,
        };
        if let Some(base_url) = var("PROGRESS_REMOTE_URL") {
            config.set_remote_url(&base_url)?;
        }
        Ok(config)
    }

    /// Point at another database.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::EmptyDbUrl` for a blank value.
    pub fn set_db_url(&mut self, raw: &str) -> Result<(), ConfigError> {
        if raw.trim().is_empty() {
            return Err(ConfigError::EmptyDbUrl);
        }
        self.db_url = normalize_sqlite_url(raw.to_string());
        Ok(())
    }

    /// Use the remote ledger at `base_url` with the configured key and timeout.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingRemoteKey` if no remote key is configured.
    pub fn set_remote_url(&mut self, base_url: &str) -> Result<(), ConfigError> {
        let api_key = self.remote_key.clone().ok_or(ConfigError::MissingRemoteKey)?;
        self.remote = Some(RemoteConfig {
            base_url: base_url.trim().to_string(),
            api_key,
            timeout: self.remote_timeout,
        });
        Ok(())
    }
}

/// Turn a bare path or `sqlite:` url into an absolute `sqlite://` url.
#[must_use]
pub fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim();
    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}
