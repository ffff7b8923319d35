//! Workflow execution engine.
//!
//! The `ExecutionEngine` runs a workflow's steps in order against a shared
//! [`ExecutionContext`], reporting progress through an [`ExecutionNotifier`]
//! and recording the outcome as a [`RunRecord`].

use std::sync::Arc;
use std::time::Duration;

use cadence_config::{StepDef, TriggerType, WorkflowDef};
use cadence_registry::{InvocationContext, ModuleRegistry, RegistryError};
use cadence_store::{RunRecord, RunStatus, StepResult, StepStatus, Store};
use chrono::Utc;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::context::{ExecutionContext, ResolveError};
use crate::error::EngineError;
use crate::events::{ExecutionNotifier, NoopNotifier, ProgressEvent};

/// Configuration for the execution engine.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
  /// Upper bound on a single module invocation. `None` waits indefinitely.
  pub step_timeout: Option<Duration>,
}

/// A request to run a workflow.
#[derive(Debug, Clone)]
pub struct RunRequest {
  pub workflow_id: String,
  pub caller_id: String,
  pub trigger_type: TriggerType,
  pub payload: Value,
}

impl RunRequest {
  pub fn new(workflow_id: impl Into<String>, caller_id: impl Into<String>) -> Self {
    Self {
      workflow_id: workflow_id.into(),
      caller_id: caller_id.into(),
      trigger_type: TriggerType::Manual,
      payload: Value::Object(Map::new()),
    }
  }

  pub fn with_trigger(mut self, trigger_type: TriggerType, payload: Value) -> Self {
    self.trigger_type = trigger_type;
    self.payload = payload;
    self
  }
}

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct RunResult {
  pub run_id: String,
  pub workflow_id: String,
  pub status: RunStatus,
  pub steps: Vec<StepResult>,
  /// Final bindings, including `trigger` and `caller`.
  pub outputs: Map<String, Value>,
  pub error: Option<String>,
  pub failed_step: Option<String>,
}

impl RunResult {
  pub fn is_success(&self) -> bool {
    self.status == RunStatus::Success
  }
}

/// The workflow execution engine.
///
/// Cheap to clone; the registry and store are shared.
#[derive(Clone)]
pub struct ExecutionEngine {
  registry: Arc<ModuleRegistry>,
  store: Arc<dyn Store>,
  config: EngineConfig,
}

impl ExecutionEngine {
  pub fn new(registry: Arc<ModuleRegistry>, store: Arc<dyn Store>) -> Self {
    Self::with_config(registry, store, EngineConfig::default())
  }

  pub fn with_config(
    registry: Arc<ModuleRegistry>,
    store: Arc<dyn Store>,
    config: EngineConfig,
  ) -> Self {
    Self {
      registry,
      store,
      config,
    }
  }

  pub fn registry(&self) -> &ModuleRegistry {
    &self.registry
  }

  pub fn store(&self) -> &Arc<dyn Store> {
    &self.store
  }

  /// Run a workflow without observing progress events.
  pub async fn execute(
    &self,
    request: RunRequest,
    cancel: CancellationToken,
  ) -> Result<RunResult, EngineError> {
    self.execute_with(request, &NoopNotifier, cancel).await
  }

  /// Run a workflow, reporting progress to `notifier`.
  ///
  /// Returns `Err` only when the run could not be started (unknown workflow,
  /// rejected trigger payload) or its record could not be written. Step
  /// failures and cancellation produce `Ok` with status `error`.
  #[instrument(skip_all, fields(workflow_id = %request.workflow_id, caller_id = %request.caller_id))]
  pub async fn execute_with<N: ExecutionNotifier + ?Sized>(
    &self,
    request: RunRequest,
    notifier: &N,
    cancel: CancellationToken,
  ) -> Result<RunResult, EngineError> {
    let workflow = self
      .store
      .get_workflow(&request.workflow_id)
      .await?
      .ok_or_else(|| EngineError::WorkflowNotFound {
        workflow_id: request.workflow_id.clone(),
      })?;

    let payload = workflow
      .trigger
      .prepare_payload(request.trigger_type, request.payload)
      .map_err(|source| EngineError::InvalidTriggerPayload { source })?;

    let run_id = uuid::Uuid::new_v4().to_string();
    let mut record = RunRecord::start(
      &run_id,
      &workflow.id,
      &request.caller_id,
      request.trigger_type,
    );
    self.store.create_run(&record).await?;

    info!(
      run_id = %run_id,
      trigger_type = %request.trigger_type,
      steps = workflow.steps.len(),
      "run_started"
    );

    let mut ctx = ExecutionContext::new(payload, &request.caller_id);
    let outcome = self
      .run_steps(&workflow, &mut ctx, &mut record, notifier, &cancel)
      .await;

    match &outcome {
      Ok(()) => record.status = RunStatus::Success,
      Err(e) => {
        record.status = RunStatus::Error;
        record.error = Some(e.to_string());
        record.failed_step = e.step_id().map(str::to_string);
      }
    }
    record.finished_at = Some(Utc::now());

    if let Err(e) = self.store.finish_run(&record).await {
      error!(run_id = %run_id, error = %e, "run_persist_failed");
      return Err(e.into());
    }

    match outcome {
      Ok(()) => {
        info!(run_id = %run_id, "run_completed");
        notifier.notify(ProgressEvent::WorkflowCompleted {
          status: RunStatus::Success.to_string(),
          total_steps: workflow.steps.len(),
        });
      }
      Err(e) => {
        warn!(run_id = %run_id, error = %e, category = ?e.category(), "run_failed");
        notifier.notify(ProgressEvent::WorkflowFailed {
          error: e.to_string(),
          step_id: e.step_id().map(str::to_string),
        });
      }
    }

    Ok(RunResult {
      run_id,
      workflow_id: workflow.id,
      status: record.status,
      steps: record.steps,
      outputs: ctx.into_bindings(),
      error: record.error,
      failed_step: record.failed_step,
    })
  }

  /// Execute steps in order until one fails or all complete.
  async fn run_steps<N: ExecutionNotifier + ?Sized>(
    &self,
    workflow: &WorkflowDef,
    ctx: &mut ExecutionContext,
    record: &mut RunRecord,
    notifier: &N,
    cancel: &CancellationToken,
  ) -> Result<(), EngineError> {
    for step in &workflow.steps {
      if cancel.is_cancelled() {
        info!(run_id = %record.id, step_id = %step.id, "run_cancelled");
        return Err(EngineError::Cancelled);
      }

      notifier.notify(ProgressEvent::StepStarted {
        step_id: step.id.clone(),
      });
      debug!(run_id = %record.id, step_id = %step.id, module = %step.module, "step_started");

      let started_at = Utc::now();
      match self.run_step(workflow, step, ctx, record).await {
        Ok(output) => {
          record.steps.push(StepResult {
            step_id: step.id.clone(),
            module: step.module.clone(),
            status: StepStatus::Success,
            output: Some(output.clone()),
            error: None,
            started_at,
            finished_at: Utc::now(),
          });

          let binding = step.binding_name();
          if ctx.set(binding, output.clone()).is_some() {
            debug!(step_id = %step.id, binding, "binding_overwritten");
          }

          debug!(run_id = %record.id, step_id = %step.id, "step_completed");
          notifier.notify(ProgressEvent::StepCompleted {
            step_id: step.id.clone(),
            output,
          });
        }
        Err(e) => {
          record.steps.push(StepResult {
            step_id: step.id.clone(),
            module: step.module.clone(),
            status: StepStatus::Error,
            output: None,
            error: Some(e.to_string()),
            started_at,
            finished_at: Utc::now(),
          });

          warn!(run_id = %record.id, step_id = %step.id, error = %e, "step_failed");
          notifier.notify(ProgressEvent::StepFailed {
            step_id: step.id.clone(),
            error: e.to_string(),
          });
          return Err(e);
        }
      }
    }

    Ok(())
  }

  /// Resolve inputs, resolve the module function and invoke it.
  async fn run_step(
    &self,
    workflow: &WorkflowDef,
    step: &StepDef,
    ctx: &ExecutionContext,
    record: &RunRecord,
  ) -> Result<Value, EngineError> {
    let inputs = ctx.resolve_inputs(&step.inputs).map_err(|e| match e {
      ResolveError::UnresolvedReference { reference } => EngineError::UnresolvedReference {
        step_id: step.id.clone(),
        reference,
      },
      ResolveError::InvalidTemplate { message } => EngineError::InvalidTemplate {
        step_id: step.id.clone(),
        message,
      },
    })?;

    let function = self.registry.resolve(&step.module).map_err(|e| match e {
      RegistryError::InvalidPath { path } => EngineError::InvalidPath {
        step_id: step.id.clone(),
        path,
      },
      other => EngineError::ModuleNotFound {
        step_id: step.id.clone(),
        path: step.module.clone(),
        source: other,
      },
    })?;

    let invocation = InvocationContext {
      run_id: record.id.clone(),
      workflow_id: workflow.id.clone(),
      step_id: step.id.clone(),
      caller_id: record.caller_id.clone(),
    };

    let call = function.invoke(inputs, &invocation);
    let result = match self.config.step_timeout {
      Some(limit) => tokio::time::timeout(limit, call)
        .await
        .map_err(|_| EngineError::StepTimeout {
          step_id: step.id.clone(),
          timeout_ms: limit.as_millis() as u64,
        })?,
      None => call.await,
    };

    result.map_err(|source| EngineError::StepInvocation {
      step_id: step.id.clone(),
      module: step.module.clone(),
      source,
    })
  }
}
