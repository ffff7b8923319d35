//! Framed progress feed for one run.
//!
//! [`ProgressStream`] starts a run on a background task and yields one
//! [`Frame`] per progress event, in order:
//!
//! ```text
//! event: step_started
//! data: {"type":"step_started","stepId":"now"}
//!
//! event: step_completed
//! data: {"type":"step_completed","stepId":"now","output":{...}}
//!
//! event: workflow_completed
//! data: {"type":"workflow_completed","status":"success","totalSteps":1}
//! ```
//!
//! The stream ends exactly once: after the terminal event, or after a single
//! synthetic `error` frame when the run could not produce one. Dropping the
//! stream cancels the run.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::{ExecutionEngine, RunRequest, RunResult};
use crate::error::EngineError;
use crate::events::{ChannelNotifier, ProgressEvent};

/// Event name of the synthetic frame sent when a run fails outside the
/// normal event flow.
pub const ERROR_EVENT: &str = "error";

/// One unit of the live feed.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
  pub event: String,
  pub data: Value,
}

impl Frame {
  pub fn error(message: impl Into<String>) -> Self {
    Self {
      event: ERROR_EVENT.to_string(),
      data: json!({ "error": message.into() }),
    }
  }

  fn from_event(event: &ProgressEvent) -> Self {
    match serde_json::to_value(event) {
      Ok(data) => Self {
        event: event.name().to_string(),
        data,
      },
      Err(e) => Self::error(format!("failed to encode {} event: {}", event.name(), e)),
    }
  }

  pub fn is_error(&self) -> bool {
    self.event == ERROR_EVENT
  }

  /// Text framing: `event: <name>\ndata: <json>\n\n`.
  pub fn encode(&self) -> String {
    format!("event: {}\ndata: {}\n\n", self.event, self.data)
  }
}

/// A cancellable, ordered stream of [`Frame`]s for one run.
pub struct ProgressStream {
  events: mpsc::UnboundedReceiver<ProgressEvent>,
  run: JoinHandle<Result<RunResult, EngineError>>,
  cancel: CancellationToken,
  finished: bool,
}

impl ProgressStream {
  /// Start a run and return its feed.
  pub fn start(engine: Arc<ExecutionEngine>, request: RunRequest) -> Self {
    Self::start_with_cancel(engine, request, CancellationToken::new())
  }

  /// Start a run whose cancellation is also driven by `parent`.
  pub fn start_with_cancel(
    engine: Arc<ExecutionEngine>,
    request: RunRequest,
    parent: CancellationToken,
  ) -> Self {
    let (sender, events) = mpsc::unbounded_channel();
    let cancel = parent.child_token();
    let run_cancel = cancel.clone();

    let run = tokio::spawn(async move {
      let notifier = ChannelNotifier::new(sender);
      engine.execute_with(request, &notifier, run_cancel).await
    });

    Self {
      events,
      run,
      cancel,
      finished: false,
    }
  }

  /// Stop the run before its next step. The step in flight completes.
  pub fn cancel(&self) {
    self.cancel.cancel();
  }

  fn finish(&mut self, frame: Frame) -> Poll<Option<Frame>> {
    self.finished = true;
    Poll::Ready(Some(frame))
  }
}

impl Stream for ProgressStream {
  type Item = Frame;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Frame>> {
    let this = self.get_mut();
    if this.finished {
      return Poll::Ready(None);
    }

    match this.events.poll_recv(cx) {
      Poll::Ready(Some(event)) => {
        let frame = Frame::from_event(&event);
        if event.is_terminal() || frame.is_error() {
          return this.finish(frame);
        }
        Poll::Ready(Some(frame))
      }
      // The notifier is dropped when the run task ends; a closed channel
      // without a terminal event means the run ended abnormally.
      Poll::Ready(None) => match Pin::new(&mut this.run).poll(cx) {
        Poll::Pending => Poll::Pending,
        Poll::Ready(Ok(Err(e))) => {
          debug!(error = %e, "run_ended_with_error");
          this.finish(Frame::error(e.to_string()))
        }
        Poll::Ready(Ok(Ok(result))) => {
          warn!(run_id = %result.run_id, "run_ended_without_terminal_event");
          this.finish(Frame::error("run ended without a terminal event"))
        }
        Poll::Ready(Err(e)) => {
          warn!(error = %e, "run_task_failed");
          this.finish(Frame::error(format!("run task failed: {}", e)))
        }
      },
      Poll::Pending => Poll::Pending,
    }
  }
}

impl Drop for ProgressStream {
  fn drop(&mut self) {
    self.cancel.cancel();
  }
}
