use std::path::Path;

use async_trait::async_trait;
use cadence_config::{TriggerType, WorkflowDef, WorkflowStatus};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, SqlitePool};

use crate::{Error, RunRecord, RunStats, RunStatus, RunStore, StepResult, WorkflowStore};

/// SQLite-based store implementation.
pub struct SqliteStore {
  pool: SqlitePool,
}

#[derive(FromRow)]
struct RunRow {
  id: String,
  workflow_id: String,
  caller_id: String,
  trigger_type: String,
  status: RunStatus,
  started_at: DateTime<Utc>,
  finished_at: Option<DateTime<Utc>>,
  steps: Json<Vec<StepResult>>,
  error: Option<String>,
  failed_step: Option<String>,
}

impl TryFrom<RunRow> for RunRecord {
  type Error = Error;

  fn try_from(row: RunRow) -> Result<Self, Self::Error> {
    let trigger_type = row
      .trigger_type
      .parse::<TriggerType>()
      .map_err(Error::Corrupt)?;

    Ok(RunRecord {
      id: row.id,
      workflow_id: row.workflow_id,
      caller_id: row.caller_id,
      trigger_type,
      status: row.status,
      started_at: row.started_at,
      finished_at: row.finished_at,
      steps: row.steps.0,
      error: row.error,
      failed_step: row.failed_step,
    })
  }
}

const RUN_COLUMNS: &str = "id, workflow_id, caller_id, trigger_type, status, started_at, finished_at, steps, error, failed_step";

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open (creating if needed) the database file at `path` and run
  /// migrations.
  pub async fn open(path: &Path) -> Result<Self, Error> {
    let options = SqliteConnectOptions::new()
      .filename(path)
      .create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;

    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// An in-memory database, migrated and ready to use.
  pub async fn in_memory() -> Result<Self, Error> {
    // One connection: every new in-memory connection is a fresh database.
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .connect("sqlite::memory:")
      .await?;

    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(&self.pool).await
  }

  async fn run_exists(&self, run_id: &str) -> Result<bool, Error> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM workflow_runs WHERE id = ?")
      .bind(run_id)
      .fetch_one(&self.pool)
      .await?;
    Ok(count > 0)
  }
}

#[async_trait]
impl WorkflowStore for SqliteStore {
  async fn get_workflow(&self, workflow_id: &str) -> Result<Option<WorkflowDef>, Error> {
    let definition: Option<Json<WorkflowDef>> =
      sqlx::query_scalar("SELECT definition FROM workflows WHERE id = ?")
        .bind(workflow_id)
        .fetch_optional(&self.pool)
        .await?;

    Ok(definition.map(|d| d.0))
  }

  async fn save_workflow(&self, workflow: &WorkflowDef) -> Result<(), Error> {
    sqlx::query(
      r#"
      INSERT INTO workflows (id, name, status, definition, updated_at)
      VALUES (?, ?, ?, ?, ?)
      ON CONFLICT (id) DO UPDATE SET
        name = excluded.name,
        status = excluded.status,
        definition = excluded.definition,
        updated_at = excluded.updated_at
      "#,
    )
    .bind(&workflow.id)
    .bind(&workflow.name)
    .bind(workflow.status.as_str())
    .bind(Json(workflow))
    .bind(Utc::now())
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn list_workflows(&self) -> Result<Vec<WorkflowDef>, Error> {
    let definitions: Vec<Json<WorkflowDef>> =
      sqlx::query_scalar("SELECT definition FROM workflows ORDER BY id")
        .fetch_all(&self.pool)
        .await?;

    Ok(definitions.into_iter().map(|d| d.0).collect())
  }
}

#[async_trait]
impl RunStore for SqliteStore {
  async fn create_run(&self, run: &RunRecord) -> Result<(), Error> {
    sqlx::query(
      r#"
      INSERT INTO workflow_runs (id, workflow_id, caller_id, trigger_type, status, started_at, finished_at, steps, error, failed_step)
      VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
      "#,
    )
    .bind(&run.id)
    .bind(&run.workflow_id)
    .bind(&run.caller_id)
    .bind(run.trigger_type.as_str())
    .bind(run.status)
    .bind(run.started_at)
    .bind(run.finished_at)
    .bind(Json(&run.steps))
    .bind(&run.error)
    .bind(&run.failed_step)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn finish_run(&self, run: &RunRecord) -> Result<(), Error> {
    if !run.status.is_terminal() {
      return Err(Error::NotTerminal(run.id.clone()));
    }

    let result = sqlx::query(
      r#"
      UPDATE workflow_runs
      SET status = ?, finished_at = ?, steps = ?, error = ?, failed_step = ?
      WHERE id = ? AND status = 'running'
      "#,
    )
    .bind(run.status)
    .bind(run.finished_at)
    .bind(Json(&run.steps))
    .bind(&run.error)
    .bind(&run.failed_step)
    .bind(&run.id)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      return if self.run_exists(&run.id).await? {
        Err(Error::AlreadyFinished(run.id.clone()))
      } else {
        Err(Error::NotFound(format!("run {}", run.id)))
      };
    }

    Ok(())
  }

  async fn get_run(&self, run_id: &str) -> Result<RunRecord, Error> {
    let row: Option<RunRow> = sqlx::query_as(&format!(
      "SELECT {} FROM workflow_runs WHERE id = ?",
      RUN_COLUMNS
    ))
    .bind(run_id)
    .fetch_optional(&self.pool)
    .await?;

    row
      .ok_or_else(|| Error::NotFound(format!("run {}", run_id)))?
      .try_into()
  }

  async fn list_runs(&self, workflow_id: &str) -> Result<Vec<RunRecord>, Error> {
    let rows: Vec<RunRow> = sqlx::query_as(&format!(
      "SELECT {} FROM workflow_runs WHERE workflow_id = ? ORDER BY started_at DESC, rowid DESC",
      RUN_COLUMNS
    ))
    .bind(workflow_id)
    .fetch_all(&self.pool)
    .await?;

    rows.into_iter().map(RunRecord::try_from).collect()
  }

  async fn stats(&self, caller_id: Option<&str>) -> Result<RunStats, Error> {
    let (successful, failed): (i64, i64) = sqlx::query_as(
      r#"
      SELECT
        COALESCE(SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END), 0),
        COALESCE(SUM(CASE WHEN status = 'error' THEN 1 ELSE 0 END), 0)
      FROM workflow_runs
      WHERE ?1 IS NULL OR caller_id = ?1
      "#,
    )
    .bind(caller_id)
    .fetch_one(&self.pool)
    .await?;

    let active: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM workflows WHERE status = ?")
      .bind(WorkflowStatus::Active.as_str())
      .fetch_one(&self.pool)
      .await?;

    Ok(RunStats::new(
      successful as u64,
      failed as u64,
      active as u64,
    ))
  }
}
