use std::collections::BTreeMap;

use async_trait::async_trait;
use cadence_config::{WorkflowDef, WorkflowStatus};
use tokio::sync::RwLock;

use crate::{Error, RunRecord, RunStats, RunStatus, RunStore, WorkflowStore};

/// In-memory store. Contents are lost when the store is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
  workflows: RwLock<BTreeMap<String, WorkflowDef>>,
  runs: RwLock<Vec<RunRecord>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// A store pre-populated with the given workflows.
  pub fn with_workflows(workflows: impl IntoIterator<Item = WorkflowDef>) -> Self {
    let workflows = workflows
      .into_iter()
      .map(|w| (w.id.clone(), w))
      .collect();
    Self {
      workflows: RwLock::new(workflows),
      runs: RwLock::default(),
    }
  }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
  async fn get_workflow(&self, workflow_id: &str) -> Result<Option<WorkflowDef>, Error> {
    Ok(self.workflows.read().await.get(workflow_id).cloned())
  }

  async fn save_workflow(&self, workflow: &WorkflowDef) -> Result<(), Error> {
    self
      .workflows
      .write()
      .await
      .insert(workflow.id.clone(), workflow.clone());
    Ok(())
  }

  async fn list_workflows(&self) -> Result<Vec<WorkflowDef>, Error> {
    Ok(self.workflows.read().await.values().cloned().collect())
  }
}

#[async_trait]
impl RunStore for MemoryStore {
  async fn create_run(&self, run: &RunRecord) -> Result<(), Error> {
    self.runs.write().await.push(run.clone());
    Ok(())
  }

  async fn finish_run(&self, run: &RunRecord) -> Result<(), Error> {
    if !run.status.is_terminal() {
      return Err(Error::NotTerminal(run.id.clone()));
    }

    let mut runs = self.runs.write().await;
    let existing = runs
      .iter_mut()
      .find(|r| r.id == run.id)
      .ok_or_else(|| Error::NotFound(format!("run {}", run.id)))?;

    if existing.status.is_terminal() {
      return Err(Error::AlreadyFinished(run.id.clone()));
    }

    *existing = run.clone();
    Ok(())
  }

  async fn get_run(&self, run_id: &str) -> Result<RunRecord, Error> {
    self
      .runs
      .read()
      .await
      .iter()
      .find(|r| r.id == run_id)
      .cloned()
      .ok_or_else(|| Error::NotFound(format!("run {}", run_id)))
  }

  async fn list_runs(&self, workflow_id: &str) -> Result<Vec<RunRecord>, Error> {
    // Runs are appended in start order.
    Ok(
      self
        .runs
        .read()
        .await
        .iter()
        .rev()
        .filter(|r| r.workflow_id == workflow_id)
        .cloned()
        .collect(),
    )
  }

  async fn stats(&self, caller_id: Option<&str>) -> Result<RunStats, Error> {
    let runs = self.runs.read().await;
    let mine = || {
      runs
        .iter()
        .filter(move |r| caller_id.is_none_or(|c| r.caller_id == c))
    };
    let successful = mine().filter(|r| r.status == RunStatus::Success).count();
    let failed = mine().filter(|r| r.status == RunStatus::Error).count();

    let active = self
      .workflows
      .read()
      .await
      .values()
      .filter(|w| w.status == WorkflowStatus::Active)
      .count();

    Ok(RunStats::new(successful as u64, failed as u64, active as u64))
  }
}
