//! Engine errors.

use cadence_config::TriggerError;
use cadence_registry::{ModuleError, RegistryError};

/// Broad classes of run failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
  /// The workflow or its trigger payload is unusable as authored.
  Definition,
  /// A step refers to a binding or module function that does not exist.
  Resolution,
  /// A module function failed or timed out.
  Invocation,
  Cancelled,
  /// Run records could not be read or written.
  Storage,
}

/// Errors that can occur during a workflow run.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  #[error("workflow '{workflow_id}' not found")]
  WorkflowNotFound { workflow_id: String },

  #[error("invalid trigger payload: {source}")]
  InvalidTriggerPayload {
    #[source]
    source: TriggerError,
  },

  #[error("step '{step_id}' has invalid module path '{path}'")]
  InvalidPath { step_id: String, path: String },

  #[error("step '{step_id}': {source}")]
  ModuleNotFound {
    step_id: String,
    path: String,
    #[source]
    source: RegistryError,
  },

  #[error("step '{step_id}' has an unresolved reference '{reference}'")]
  UnresolvedReference { step_id: String, reference: String },

  #[error("step '{step_id}' has an invalid template: {message}")]
  InvalidTemplate { step_id: String, message: String },

  #[error("step '{step_id}' ({module}) failed: {source}")]
  StepInvocation {
    step_id: String,
    module: String,
    #[source]
    source: ModuleError,
  },

  #[error("step '{step_id}' timed out after {timeout_ms}ms")]
  StepTimeout { step_id: String, timeout_ms: u64 },

  #[error("execution cancelled")]
  Cancelled,

  #[error("store error: {0}")]
  Store(#[from] cadence_store::Error),
}

impl EngineError {
  pub fn category(&self) -> ErrorCategory {
    match self {
      EngineError::WorkflowNotFound { .. }
      | EngineError::InvalidTriggerPayload { .. }
      | EngineError::InvalidPath { .. } => ErrorCategory::Definition,
      EngineError::ModuleNotFound { .. }
      | EngineError::UnresolvedReference { .. }
      | EngineError::InvalidTemplate { .. } => ErrorCategory::Resolution,
      EngineError::StepInvocation { .. } | EngineError::StepTimeout { .. } => {
        ErrorCategory::Invocation
      }
      EngineError::Cancelled => ErrorCategory::Cancelled,
      EngineError::Store(_) => ErrorCategory::Storage,
    }
  }

  /// The step the error is attributable to, if any.
  pub fn step_id(&self) -> Option<&str> {
    match self {
      EngineError::InvalidPath { step_id, .. }
      | EngineError::ModuleNotFound { step_id, .. }
      | EngineError::UnresolvedReference { step_id, .. }
      | EngineError::InvalidTemplate { step_id, .. }
      | EngineError::StepInvocation { step_id, .. }
      | EngineError::StepTimeout { step_id, .. } => Some(step_id),
      _ => None,
    }
  }
}
