use serde::{Deserialize, Serialize};

/// A single step in a workflow.
///
/// `inputs` values are either literals or template strings such as
/// `"{{ trigger.email }}"`, resolved against the execution context at run time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDef {
  pub id: String,
  /// Module function path, e.g. `ai.ai-sdk.chat`.
  #[serde(alias = "modulePath")]
  pub module: String,
  #[serde(default)]
  pub inputs: serde_json::Map<String, serde_json::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output_as: Option<String>,
}

impl StepDef {
  pub fn new(id: impl Into<String>, module: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      module: module.into(),
      inputs: serde_json::Map::new(),
      output_as: None,
    }
  }

  pub fn with_input(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
    self.inputs.insert(name.into(), value);
    self
  }

  pub fn with_output_as(mut self, name: impl Into<String>) -> Self {
    self.output_as = Some(name.into());
    self
  }

  /// The binding name this step's output is stored under.
  ///
  /// Falls back to the step id when `outputAs` is not set.
  pub fn binding_name(&self) -> &str {
    self.output_as.as_deref().unwrap_or(&self.id)
  }
}
