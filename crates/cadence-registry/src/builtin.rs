//! Self-contained utility functions available in every registry.
//!
//! ```text
//! utilities.datetime.now       utilities.datetime.addDays
//! utilities.string.upper       utilities.string.lower
//! utilities.string.concat      utilities.string.split
//! utilities.math.add           utilities.math.multiply
//! utilities.json.parse         utilities.json.stringify
//! ```

use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};

use crate::error::{ModuleError, RegistryError};
use crate::handler::handler_fn;
use crate::registry::{ModuleFunction, RegistryBuilder};

const CATEGORY: &str = "utilities";

/// Register the builtin `utilities.*` functions.
pub fn register_builtins(builder: &mut RegistryBuilder) -> Result<(), RegistryError> {
  builder
    .register(
      CATEGORY,
      "datetime",
      ModuleFunction::new(
        "now",
        "Get the current date and time in UTC",
        "now(): { iso: string, date: string, time: string, unix: number }",
        handler_fn(|_, _| async { Ok(timestamp(Utc::now())) }),
      )
      .with_example(r#"{ "id": "now", "module": "utilities.datetime.now", "outputAs": "now" }"#),
    )?
    .register(
      CATEGORY,
      "datetime",
      ModuleFunction::new(
        "addDays",
        "Add a number of days to an RFC 3339 timestamp",
        "addDays(date: string, days: number): { iso: string, date: string, time: string, unix: number }",
        handler_fn(|inputs, _| async move {
          let date = str_input(&inputs, "date")?;
          let date = DateTime::parse_from_rfc3339(date)
            .map_err(|e| ModuleError::invalid_input(format!("'date' is not RFC 3339: {}", e)))?;
          let days = number_input(&inputs, "days")? as i64;
          Ok(timestamp(date.with_timezone(&Utc) + Duration::days(days)))
        }),
      ),
    )?
    .register(
      CATEGORY,
      "string",
      ModuleFunction::new(
        "upper",
        "Convert text to upper case",
        "upper(text: string): string",
        handler_fn(|inputs, _| async move { Ok(json!(str_input(&inputs, "text")?.to_uppercase())) }),
      ),
    )?
    .register(
      CATEGORY,
      "string",
      ModuleFunction::new(
        "lower",
        "Convert text to lower case",
        "lower(text: string): string",
        handler_fn(|inputs, _| async move { Ok(json!(str_input(&inputs, "text")?.to_lowercase())) }),
      ),
    )?
    .register(
      CATEGORY,
      "string",
      ModuleFunction::new(
        "concat",
        "Join a list of values into one string",
        "concat(parts: array, separator?: string): string",
        handler_fn(|inputs, _| async move {
          let parts = inputs
            .get("parts")
            .and_then(Value::as_array)
            .ok_or_else(|| ModuleError::invalid_input("'parts' must be an array"))?;
          let separator = inputs
            .get("separator")
            .and_then(Value::as_str)
            .unwrap_or("");
          let joined = parts
            .iter()
            .map(|p| match p {
              Value::String(s) => s.clone(),
              other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(separator);
          Ok(json!(joined))
        }),
      ),
    )?
    .register(
      CATEGORY,
      "string",
      ModuleFunction::new(
        "split",
        "Split text on a separator",
        "split(text: string, separator: string): string[]",
        handler_fn(|inputs, _| async move {
          let text = str_input(&inputs, "text")?;
          let separator = str_input(&inputs, "separator")?;
          if separator.is_empty() {
            return Err(ModuleError::invalid_input("'separator' cannot be empty"));
          }
          Ok(json!(text.split(separator).collect::<Vec<_>>()))
        }),
      ),
    )?
    .register(
      CATEGORY,
      "math",
      ModuleFunction::new(
        "add",
        "Add two numbers",
        "add(a: number, b: number): number",
        handler_fn(|inputs, _| async move {
          Ok(number_output(number_input(&inputs, "a")? + number_input(&inputs, "b")?))
        }),
      ),
    )?
    .register(
      CATEGORY,
      "math",
      ModuleFunction::new(
        "multiply",
        "Multiply two numbers",
        "multiply(a: number, b: number): number",
        handler_fn(|inputs, _| async move {
          Ok(number_output(number_input(&inputs, "a")? * number_input(&inputs, "b")?))
        }),
      ),
    )?
    .register(
      CATEGORY,
      "json",
      ModuleFunction::new(
        "parse",
        "Parse a JSON document from text",
        "parse(text: string): any",
        handler_fn(|inputs, _| async move {
          serde_json::from_str(str_input(&inputs, "text")?)
            .map_err(|e| ModuleError::invalid_input(format!("'text' is not valid JSON: {}", e)))
        }),
      ),
    )?
    .register(
      CATEGORY,
      "json",
      ModuleFunction::new(
        "stringify",
        "Serialize a value to JSON text",
        "stringify(value: any, pretty?: boolean): string",
        handler_fn(|inputs, _| async move {
          let value = inputs.get("value").cloned().unwrap_or(Value::Null);
          let pretty = inputs.get("pretty").and_then(Value::as_bool).unwrap_or(false);
          let text = if pretty {
            serde_json::to_string_pretty(&value)
          } else {
            serde_json::to_string(&value)
          };
          text.map(Value::String).map_err(|e| ModuleError::failed(e.to_string()))
        }),
      ),
    )?;

  Ok(())
}

fn timestamp(at: DateTime<Utc>) -> Value {
  json!({
    "iso": at.to_rfc3339(),
    "date": at.format("%Y-%m-%d").to_string(),
    "time": at.format("%H:%M:%S").to_string(),
    "unix": at.timestamp(),
  })
}

fn str_input<'a>(inputs: &'a Value, key: &str) -> Result<&'a str, ModuleError> {
  inputs
    .get(key)
    .and_then(Value::as_str)
    .ok_or_else(|| ModuleError::invalid_input(format!("'{}' must be a string", key)))
}

/// Numbers may arrive as JSON numbers or as numeric strings from templates.
fn number_input(inputs: &Value, key: &str) -> Result<f64, ModuleError> {
  let invalid = || ModuleError::invalid_input(format!("'{}' must be a number", key));
  match inputs.get(key) {
    Some(Value::Number(n)) => n.as_f64().ok_or_else(invalid),
    Some(Value::String(s)) => s.trim().parse().map_err(|_| invalid()),
    _ => Err(invalid()),
  }
}

fn number_output(n: f64) -> Value {
  if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
    json!(n as i64)
  } else {
    json!(n)
  }
}
