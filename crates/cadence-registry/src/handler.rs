use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ModuleError;

/// Identifies the run and step a module function is invoked for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationContext {
  pub run_id: String,
  pub workflow_id: String,
  pub step_id: String,
  pub caller_id: String,
}

/// Executable body of a module function.
///
/// Receives the step's resolved inputs as a JSON object and returns the
/// step output.
#[async_trait]
pub trait ModuleHandler: Send + Sync {
  async fn call(&self, inputs: Value, ctx: &InvocationContext) -> Result<Value, ModuleError>;
}

type HandlerFn =
  dyn Fn(Value, InvocationContext) -> BoxFuture<'static, Result<Value, ModuleError>> + Send + Sync;

struct FnHandler {
  f: Box<HandlerFn>,
}

#[async_trait]
impl ModuleHandler for FnHandler {
  async fn call(&self, inputs: Value, ctx: &InvocationContext) -> Result<Value, ModuleError> {
    (self.f)(inputs, ctx.clone()).await
  }
}

/// Wrap an async closure as a [`ModuleHandler`].
///
/// ```ignore
/// let echo = handler_fn(|inputs, _ctx| async move { Ok(inputs) });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ModuleHandler>
where
  F: Fn(Value, InvocationContext) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<Value, ModuleError>> + Send + 'static,
{
  Arc::new(FnHandler {
    f: Box::new(move |inputs, ctx| Box::pin(f(inputs, ctx))),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[tokio::test]
  async fn test_handler_fn_receives_context() {
    let handler = handler_fn(|inputs, ctx| async move {
      Ok(json!({ "step": ctx.step_id, "echo": inputs }))
    });

    let ctx = InvocationContext {
      step_id: "greet".to_string(),
      ..Default::default()
    };
    let output = handler.call(json!({ "name": "ada" }), &ctx).await.unwrap();

    assert_eq!(output, json!({ "step": "greet", "echo": { "name": "ada" } }));
  }
}
