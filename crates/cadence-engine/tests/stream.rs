mod support;

use std::sync::Arc;
use std::time::Duration;

use cadence_config::{StepDef, WorkflowDef};
use cadence_engine::{EngineConfig, ProgressStream, RunRequest};
use cadence_registry::{ModuleFunction, handler_fn};
use cadence_store::{RunStatus, RunStore};
use futures::StreamExt;
use serde_json::json;
use tokio::sync::Notify;

use support::{Calls, harness, harness_with, registry_builder};

#[tokio::test]
async fn test_stream_frames_until_terminal() {
  let workflow = WorkflowDef::new("wf", "Upper")
    .with_step(StepDef::new("shout", "utilities.string.upper").with_input("text", json!("hi")));
  let h = harness(vec![workflow]);

  let frames: Vec<_> = ProgressStream::start(h.engine.clone(), RunRequest::new("wf", "user-1"))
    .collect()
    .await;

  let names: Vec<_> = frames.iter().map(|f| f.event.as_str()).collect();
  assert_eq!(names, vec!["step_started", "step_completed", "workflow_completed"]);

  let encoded = frames[1].encode();
  let data = encoded
    .strip_prefix("event: step_completed\ndata: ")
    .and_then(|rest| rest.strip_suffix("\n\n"))
    .expect("framed event");
  let data: serde_json::Value = serde_json::from_str(data).unwrap();
  assert_eq!(
    data,
    json!({ "type": "step_completed", "stepId": "shout", "output": "HI" })
  );
  assert_eq!(frames[2].data["totalSteps"], 1);
}

#[tokio::test]
async fn test_stream_failed_run_ends_with_workflow_failed() {
  let workflow = WorkflowDef::new("wf", "Fails").with_step(StepDef::new("b", "testing.steps.fail"));
  let h = harness(vec![workflow]);

  let frames: Vec<_> = ProgressStream::start(h.engine.clone(), RunRequest::new("wf", "user-1"))
    .collect()
    .await;

  let names: Vec<_> = frames.iter().map(|f| f.event.as_str()).collect();
  assert_eq!(names, vec!["step_started", "step_failed", "workflow_failed"]);
  assert_eq!(frames[2].data["stepId"], "b");
}

#[tokio::test]
async fn test_unknown_workflow_yields_single_error_frame() {
  let h = harness(vec![]);

  let mut stream = ProgressStream::start(h.engine.clone(), RunRequest::new("missing", "user-1"));
  let frame = stream.next().await.unwrap();

  assert!(frame.is_error());
  assert_eq!(frame.data, json!({ "error": "workflow 'missing' not found" }));
  assert!(stream.next().await.is_none());
  assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_dropping_stream_cancels_run() {
  let release = Arc::new(Notify::new());
  let emails = Calls::default();
  let mut builder = registry_builder(emails.clone());
  let gate = release.clone();
  builder
    .register(
      "testing",
      "steps",
      ModuleFunction::new(
        "wait",
        "Block until released",
        "wait(): string",
        handler_fn(move |_, _| {
          let gate = gate.clone();
          async move {
            gate.notified().await;
            Ok(json!("released"))
          }
        }),
      ),
    )
    .unwrap();

  let workflow = WorkflowDef::new("wf", "Abandoned")
    .with_step(StepDef::new("a", "testing.steps.wait"))
    .with_step(StepDef::new("b", "communication.email.sendEmail"));
  let h = harness_with(builder.build(), vec![workflow], EngineConfig::default(), emails);

  let mut stream = ProgressStream::start(h.engine.clone(), RunRequest::new("wf", "user-1"));
  let first = stream.next().await.unwrap();
  assert_eq!(first.event, "step_started");
  drop(stream);

  // The step in flight finishes; the run then records its cancellation.
  release.notify_one();
  let mut record = None;
  for _ in 0..100 {
    let runs = h.store.list_runs("wf").await.unwrap();
    if let Some(run) = runs.into_iter().find(|r| r.status.is_terminal()) {
      record = Some(run);
      break;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }

  let record = record.expect("run should finish after the stream is dropped");
  assert_eq!(record.status, RunStatus::Error);
  assert_eq!(record.error.as_deref(), Some("execution cancelled"));
  assert_eq!(record.steps.len(), 1);
  assert!(h.emails.lock().unwrap().is_empty());
}
