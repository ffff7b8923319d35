use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of event that starts a workflow run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerType {
  #[default]
  Manual,
  Chat,
  ChatInput,
  Scheduled,
  Webhook,
}

impl TriggerType {
  pub fn as_str(&self) -> &'static str {
    match self {
      TriggerType::Manual => "manual",
      TriggerType::Chat => "chat",
      TriggerType::ChatInput => "chat-input",
      TriggerType::Scheduled => "scheduled",
      TriggerType::Webhook => "webhook",
    }
  }
}

impl std::fmt::Display for TriggerType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl std::str::FromStr for TriggerType {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "manual" => Ok(TriggerType::Manual),
      "chat" => Ok(TriggerType::Chat),
      "chat-input" => Ok(TriggerType::ChatInput),
      "scheduled" => Ok(TriggerType::Scheduled),
      "webhook" => Ok(TriggerType::Webhook),
      other => Err(format!("unknown trigger type '{}'", other)),
    }
  }
}

/// Widget type of a chat-input form field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
  #[default]
  Text,
  Textarea,
  Number,
  Date,
  Select,
  Checkbox,
}

/// A form field collected from the user before a chat-input run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputField {
  pub key: String,
  pub label: String,
  #[serde(rename = "type", default)]
  pub field_type: FieldType,
  #[serde(default)]
  pub required: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default_value: Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub placeholder: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub options: Vec<String>,
}

impl InputField {
  /// Initial value of the field when the payload does not supply one.
  pub fn initial_value(&self) -> Value {
    match (&self.field_type, &self.default_value) {
      (FieldType::Checkbox, _) => Value::Bool(false),
      (_, Some(default)) if !is_blank(default) => default.clone(),
      _ => Value::String(String::new()),
    }
  }
}

/// Trigger configuration attached to a workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerDef {
  #[serde(rename = "type", default)]
  pub trigger_type: TriggerType,
  #[serde(default)]
  pub config: TriggerConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
  /// Form fields for `chat-input` triggers.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub fields: Vec<InputField>,
  #[serde(flatten)]
  pub extra: serde_json::Map<String, Value>,
}

/// Errors raised while preparing a trigger payload.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TriggerError {
  #[error("{label} is required")]
  MissingField { key: String, label: String },

  #[error("chat-input payload must be a JSON object")]
  NotAnObject,
}

impl TriggerDef {
  pub fn new(trigger_type: TriggerType) -> Self {
    Self {
      trigger_type,
      config: TriggerConfig::default(),
    }
  }

  pub fn with_field(mut self, field: InputField) -> Self {
    self.config.fields.push(field);
    self
  }

  /// Prepare the payload a run is started with.
  ///
  /// Runs started through a `chat-input` trigger get defaults filled in for
  /// missing fields, and are rejected when a required field has no value.
  /// Every other combination passes the payload through untouched.
  pub fn prepare_payload(
    &self,
    trigger_type: TriggerType,
    payload: Value,
  ) -> Result<Value, TriggerError> {
    if trigger_type != TriggerType::ChatInput || self.config.fields.is_empty() {
      return Ok(payload);
    }

    let mut values = match payload {
      Value::Object(map) => map,
      Value::Null => serde_json::Map::new(),
      _ => return Err(TriggerError::NotAnObject),
    };

    for field in &self.config.fields {
      let value = values
        .entry(field.key.clone())
        .or_insert_with(|| field.initial_value());
      if value.is_null() {
        *value = field.initial_value();
      }
      if field.required && is_missing(value) {
        return Err(TriggerError::MissingField {
          key: field.key.clone(),
          label: field.label.clone(),
        });
      }
    }

    Ok(Value::Object(values))
  }
}

fn is_blank(value: &Value) -> bool {
  match value {
    Value::Null => true,
    Value::Bool(b) => !b,
    Value::String(s) => s.is_empty(),
    _ => false,
  }
}

/// A required field counts as unanswered when blank or zero; a cleared number
/// input submits `0`.
fn is_missing(value: &Value) -> bool {
  match value {
    Value::Number(n) => n.as_f64() == Some(0.0),
    other => is_blank(other),
  }
}
