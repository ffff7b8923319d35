//! Progress events and notifiers.
//!
//! The engine reports progress by calling [`ExecutionNotifier::notify`] in
//! lockstep with execution. Consumers decide what to do with the events
//! (stream them to a client, log them, ignore them).

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted during a workflow run.
///
/// For one run the order is strict: step events in step order, then at most
/// one terminal event (`WorkflowCompleted` or `WorkflowFailed`), always last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ProgressEvent {
  /// A step is about to run.
  StepStarted { step_id: String },

  /// A step finished and its output was bound.
  StepCompleted {
    step_id: String,
    output: serde_json::Value,
  },

  /// A step failed; no further steps will run.
  StepFailed { step_id: String, error: String },

  /// Every step succeeded.
  WorkflowCompleted { status: String, total_steps: usize },

  /// The run ended in error.
  WorkflowFailed {
    error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    step_id: Option<String>,
  },
}

impl ProgressEvent {
  /// Wire name of the event, e.g. `step_started`.
  pub fn name(&self) -> &'static str {
    match self {
      ProgressEvent::StepStarted { .. } => "step_started",
      ProgressEvent::StepCompleted { .. } => "step_completed",
      ProgressEvent::StepFailed { .. } => "step_failed",
      ProgressEvent::WorkflowCompleted { .. } => "workflow_completed",
      ProgressEvent::WorkflowFailed { .. } => "workflow_failed",
    }
  }

  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      ProgressEvent::WorkflowCompleted { .. } | ProgressEvent::WorkflowFailed { .. }
    )
  }
}

/// Receives progress events.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ProgressEvent);
}

/// A no-op notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ProgressEvent) {}
}

/// A notifier that forwards events into an unbounded channel.
///
/// Unbounded so a slow consumer never stalls the engine; volume is a handful
/// of events per step.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ProgressEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ProgressEvent) {
    // Receiver may have been dropped.
    let _ = self.sender.send(event);
  }
}
