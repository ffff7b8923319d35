use cadence_config::TriggerType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RunStatus {
  Running,
  Success,
  Error,
}

impl RunStatus {
  pub fn is_terminal(&self) -> bool {
    !matches!(self, RunStatus::Running)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      RunStatus::Running => "running",
      RunStatus::Success => "success",
      RunStatus::Error => "error",
    }
  }
}

impl std::fmt::Display for RunStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Status of a single executed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
  Success,
  Error,
}

/// Outcome of one step within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
  pub step_id: String,
  pub module: String,
  pub status: StepStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output: Option<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  pub started_at: DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
}

/// Durable record of one workflow run.
///
/// Created with status `running` when the run starts and finished exactly
/// once with a terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
  pub id: String,
  pub workflow_id: String,
  pub caller_id: String,
  pub trigger_type: TriggerType,
  pub status: RunStatus,
  pub started_at: DateTime<Utc>,
  #[serde(default)]
  pub finished_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub steps: Vec<StepResult>,
  #[serde(default)]
  pub error: Option<String>,
  /// Id of the step that failed, when the failure is attributable to one.
  #[serde(default)]
  pub failed_step: Option<String>,
}

impl RunRecord {
  /// A new record in the `running` state.
  pub fn start(
    id: impl Into<String>,
    workflow_id: impl Into<String>,
    caller_id: impl Into<String>,
    trigger_type: TriggerType,
  ) -> Self {
    Self {
      id: id.into(),
      workflow_id: workflow_id.into(),
      caller_id: caller_id.into(),
      trigger_type,
      status: RunStatus::Running,
      started_at: Utc::now(),
      finished_at: None,
      steps: Vec::new(),
      error: None,
      failed_step: None,
    }
  }
}

/// Aggregate run counts for dashboards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
  pub successful_runs: u64,
  pub failed_runs: u64,
  pub active_workflows: u64,
  pub total_executions: u64,
}

impl RunStats {
  pub fn new(successful_runs: u64, failed_runs: u64, active_workflows: u64) -> Self {
    Self {
      successful_runs,
      failed_runs,
      active_workflows,
      total_executions: successful_runs + failed_runs,
    }
  }
}
