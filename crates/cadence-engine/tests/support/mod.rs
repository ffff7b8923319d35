//! Shared fixtures for engine tests: a registry with fake module functions
//! and an in-memory store.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use cadence_config::WorkflowDef;
use cadence_engine::{EngineConfig, ExecutionEngine, ProgressEvent};
use cadence_registry::{
  ModuleError, ModuleFunction, ModuleRegistry, RegistryBuilder, handler_fn, register_builtins,
};
use cadence_store::MemoryStore;
use serde_json::{Value, json};
use tokio::sync::mpsc;

/// Inputs received by `communication.email.sendEmail`, in call order.
pub type Calls = Arc<Mutex<Vec<Value>>>;

pub struct Harness {
  pub engine: Arc<ExecutionEngine>,
  pub store: Arc<MemoryStore>,
  pub emails: Calls,
}

/// Builtins plus:
/// - `communication.email.sendEmail`: records its inputs, returns a message id
/// - `testing.steps.fail`: always fails
/// - `testing.steps.echo`: returns its inputs
pub fn registry_builder(emails: Calls) -> RegistryBuilder {
  let mut builder = RegistryBuilder::new();
  register_builtins(&mut builder).expect("builtins register");

  builder
    .register(
      "communication",
      "email",
      ModuleFunction::new(
        "sendEmail",
        "Send an email",
        "sendEmail(to: string, subject: string, body?: string): { messageId: string }",
        handler_fn(move |inputs, _| {
          let emails = emails.clone();
          async move {
            let mut calls = emails.lock().unwrap();
            calls.push(inputs);
            Ok(json!({ "messageId": format!("msg-{}", calls.len()) }))
          }
        }),
      ),
    )
    .expect("register sendEmail")
    .register(
      "testing",
      "steps",
      ModuleFunction::new(
        "fail",
        "Always fails",
        "fail(): never",
        handler_fn(|_, _| async { Err(ModuleError::failed("smtp unavailable")) }),
      ),
    )
    .expect("register fail")
    .register(
      "testing",
      "steps",
      ModuleFunction::new(
        "echo",
        "Return the inputs",
        "echo(...): object",
        handler_fn(|inputs, _| async move { Ok(inputs) }),
      ),
    )
    .expect("register echo");

  builder
}

pub fn harness(workflows: Vec<WorkflowDef>) -> Harness {
  let emails = Calls::default();
  harness_with(registry_builder(emails.clone()).build(), workflows, EngineConfig::default(), emails)
}

pub fn harness_with(
  registry: ModuleRegistry,
  workflows: Vec<WorkflowDef>,
  config: EngineConfig,
  emails: Calls,
) -> Harness {
  let store = Arc::new(MemoryStore::with_workflows(workflows));
  let engine = ExecutionEngine::with_config(Arc::new(registry), store.clone(), config);
  Harness {
    engine: Arc::new(engine),
    store,
    emails,
  }
}

/// Collect every event currently buffered in the channel.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
  let mut events = Vec::new();
  while let Ok(event) = rx.try_recv() {
    events.push(event);
  }
  events
}

/// `name:step` labels for compact order assertions.
pub fn labels(events: &[ProgressEvent]) -> Vec<String> {
  events
    .iter()
    .map(|event| match event {
      ProgressEvent::StepStarted { step_id }
      | ProgressEvent::StepCompleted { step_id, .. }
      | ProgressEvent::StepFailed { step_id, .. } => format!("{}:{}", event.name(), step_id),
      other => other.name().to_string(),
    })
    .collect()
}
