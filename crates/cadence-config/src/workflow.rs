use serde::{Deserialize, Serialize};

use crate::step::StepDef;
use crate::trigger::TriggerDef;

/// Lifecycle status of a stored workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
  #[default]
  Active,
  Draft,
  Paused,
}

impl WorkflowStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      WorkflowStatus::Active => "active",
      WorkflowStatus::Draft => "draft",
      WorkflowStatus::Paused => "paused",
    }
  }
}

impl std::str::FromStr for WorkflowStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "active" => Ok(WorkflowStatus::Active),
      "draft" => Ok(WorkflowStatus::Draft),
      "paused" => Ok(WorkflowStatus::Paused),
      other => Err(format!("unknown workflow status '{}'", other)),
    }
  }
}

/// A workflow definition as authored and stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDef {
  pub id: String,
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default)]
  pub status: WorkflowStatus,
  #[serde(default)]
  pub trigger: TriggerDef,
  #[serde(default)]
  pub steps: Vec<StepDef>,
}

impl WorkflowDef {
  pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      name: name.into(),
      description: None,
      status: WorkflowStatus::default(),
      trigger: TriggerDef::default(),
      steps: Vec::new(),
    }
  }

  pub fn with_step(mut self, step: StepDef) -> Self {
    self.steps.push(step);
    self
  }

  pub fn with_trigger(mut self, trigger: TriggerDef) -> Self {
    self.trigger = trigger;
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::TriggerType;
  use serde_json::json;

  #[test]
  fn test_parse_minimal_workflow() {
    let workflow: WorkflowDef = serde_json::from_value(json!({
      "id": "wf-1",
      "name": "Daily digest",
      "steps": [
        { "id": "now", "module": "utilities.datetime.now", "outputAs": "now" },
        {
          "id": "send",
          "module": "communication.email.sendEmail",
          "inputs": { "subject": "Digest for {{ now.date }}" }
        }
      ]
    }))
    .unwrap();

    assert_eq!(workflow.status, WorkflowStatus::Active);
    assert_eq!(workflow.trigger.trigger_type, TriggerType::Manual);
    assert_eq!(workflow.steps.len(), 2);
    assert_eq!(workflow.steps[1].binding_name(), "send");
  }

  #[test]
  fn test_serialize_uses_camel_case() {
    let workflow = WorkflowDef::new("wf-1", "Test")
      .with_step(StepDef::new("a", "utilities.string.upper").with_output_as("shout"));

    let value = serde_json::to_value(&workflow).unwrap();
    assert_eq!(value["steps"][0]["outputAs"], "shout");
    assert_eq!(value["status"], "active");
    assert_eq!(value["trigger"]["type"], "manual");
  }
}
