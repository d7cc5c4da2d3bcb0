#![forbid(unsafe_code)]

pub mod app_services;
pub mod completion;
pub mod config;
pub mod error;
pub mod ledger_store;
pub mod migration;
pub mod progress_service;
pub mod remote_rest;
pub mod session;
pub mod sinks;
pub mod streak;

pub use progress_core::Clock;

pub use app_services::AppServices;
pub use completion::{CheckVerdict, CompletionHandler, ExerciseCheck, SubmissionOutcome};
pub use config::ProgressConfig;
pub use error::{AppServicesError, ConfigError, ProgressError};
pub use ledger_store::LocalLedgerStore;
pub use migration::{MigrationEngine, MigrationReport};
pub use progress_service::{CourseSummary, ProgressService};
pub use remote_rest::{RemoteConfig, RestRemoteLedger};
pub use session::SessionState;
pub use sinks::{CompletionFact, CompletionSink, LessonMirror, RemoteMirror};
pub use streak::StreakTracker;
