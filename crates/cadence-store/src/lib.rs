//! Cadence Store
//!
//! Storage traits and implementations for workflow definitions and run
//! records.
//!
//! - [`WorkflowStore`] reads and writes workflow definitions
//! - [`RunStore`] creates, finishes and queries run records
//!
//! Implementations: [`MemoryStore`] for tests and one-off runs,
//! [`SqliteStore`] for persistence, and [`CachedStore`] which decorates
//! either with the advisory cache.

mod cached;
mod memory;
mod sqlite;
mod types;

pub use cached::CachedStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use types::{RunRecord, RunStats, RunStatus, StepResult, StepStatus};

use async_trait::async_trait;
use cadence_config::WorkflowDef;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// A run record was finished more than once.
  #[error("run '{0}' is already finished")]
  AlreadyFinished(String),

  /// `finish_run` was called with a non-terminal status.
  #[error("run '{0}' cannot be finished with status 'running'")]
  NotTerminal(String),

  /// A stored value could not be decoded.
  #[error("corrupt record: {0}")]
  Corrupt(String),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Storage for workflow definitions.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
  /// Get a workflow by id, or `None` if it does not exist.
  async fn get_workflow(&self, workflow_id: &str) -> Result<Option<WorkflowDef>, Error>;

  /// Insert or replace a workflow.
  async fn save_workflow(&self, workflow: &WorkflowDef) -> Result<(), Error>;

  /// List all workflows ordered by id.
  async fn list_workflows(&self) -> Result<Vec<WorkflowDef>, Error>;
}

/// Storage for run records.
#[async_trait]
pub trait RunStore: Send + Sync {
  /// Record a newly started run.
  async fn create_run(&self, run: &RunRecord) -> Result<(), Error>;

  /// Write the terminal state of a run. Fails if the run is unknown or was
  /// already finished.
  async fn finish_run(&self, run: &RunRecord) -> Result<(), Error>;

  /// Get a run by id.
  async fn get_run(&self, run_id: &str) -> Result<RunRecord, Error>;

  /// List runs of a workflow, newest first.
  async fn list_runs(&self, workflow_id: &str) -> Result<Vec<RunRecord>, Error>;

  /// Aggregate counts, optionally restricted to one caller's runs.
  async fn stats(&self, caller_id: Option<&str>) -> Result<RunStats, Error>;
}

/// A store for both workflows and runs.
pub trait Store: WorkflowStore + RunStore {}

impl<T: WorkflowStore + RunStore> Store for T {}
