//! Per-run binding store and step input resolution.
//!
//! Bindings start with `trigger` (the trigger payload) and `caller` (the
//! caller id); every completed step adds its output under its binding name.
//!
//! Step inputs are resolved against the bindings:
//!
//! ```json
//! {
//!   "to": "{{ trigger.email }}",
//!   "when": "{{ now }}",
//!   "subject": "Report for {{ now.date | upper }}",
//!   "count": 3
//! }
//! ```
//!
//! - A string that is exactly one `{{ path }}` reference yields the referenced
//!   JSON value with its type intact (`when` above is an object).
//! - Any other string containing `{{` is rendered as a minijinja template and
//!   yields a string.
//! - Arrays and objects are resolved element by element; other values are
//!   literals.

use std::collections::HashSet;

use minijinja::Environment;
use serde_json::{Map, Value};

/// Binding name seeded with the trigger payload.
pub const TRIGGER_BINDING: &str = "trigger";

/// Binding name seeded with the caller id.
pub const CALLER_BINDING: &str = "caller";

/// Names the template language reserves for literals and loop state.
const KEYWORDS: &[&str] = &["true", "True", "false", "False", "none", "None", "loop", "self"];

/// Errors raised while resolving step inputs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolveError {
  /// A template referred to a binding that does not exist.
  #[error("unresolved reference '{reference}'")]
  UnresolvedReference { reference: String },

  /// A template could not be parsed or rendered.
  #[error("invalid template: {message}")]
  InvalidTemplate { message: String },
}

/// Name → value bindings for one run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
  bindings: Map<String, Value>,
}

impl ExecutionContext {
  /// A context seeded with the trigger payload and caller id.
  pub fn new(trigger: Value, caller_id: &str) -> Self {
    let mut bindings = Map::new();
    bindings.insert(TRIGGER_BINDING.to_string(), trigger);
    bindings.insert(CALLER_BINDING.to_string(), Value::String(caller_id.to_string()));
    Self { bindings }
  }

  pub fn get(&self, name: &str) -> Option<&Value> {
    self.bindings.get(name)
  }

  /// Bind `value` under `name`, returning the value it replaced.
  pub fn set(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
    self.bindings.insert(name.into(), value)
  }

  pub fn bindings(&self) -> &Map<String, Value> {
    &self.bindings
  }

  pub fn into_bindings(self) -> Map<String, Value> {
    self.bindings
  }

  /// Resolve every input of a step into a JSON object.
  pub fn resolve_inputs(&self, inputs: &Map<String, Value>) -> Result<Value, ResolveError> {
    let env = Environment::new();
    let mut resolved = Map::with_capacity(inputs.len());
    for (name, value) in inputs {
      resolved.insert(name.clone(), self.resolve_with(&env, value)?);
    }
    Ok(Value::Object(resolved))
  }

  /// Resolve a single value.
  pub fn resolve_value(&self, value: &Value) -> Result<Value, ResolveError> {
    self.resolve_with(&Environment::new(), value)
  }

  fn resolve_with(&self, env: &Environment<'_>, value: &Value) -> Result<Value, ResolveError> {
    match value {
      Value::String(s) => self.resolve_string(env, s),
      Value::Array(items) => items
        .iter()
        .map(|item| self.resolve_with(env, item))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array),
      Value::Object(map) => {
        let mut resolved = Map::with_capacity(map.len());
        for (key, item) in map {
          resolved.insert(key.clone(), self.resolve_with(env, item)?);
        }
        Ok(Value::Object(resolved))
      }
      other => Ok(other.clone()),
    }
  }

  fn resolve_string(&self, env: &Environment<'_>, s: &str) -> Result<Value, ResolveError> {
    if !s.contains("{{") {
      return Ok(Value::String(s.to_string()));
    }

    if let Some(path) = reference_path(s) {
      return self.lookup(&path);
    }

    self.render(env, s).map(Value::String)
  }

  fn lookup(&self, path: &Path) -> Result<Value, ResolveError> {
    let root = self
      .bindings
      .get(&path.root)
      .ok_or_else(|| ResolveError::UnresolvedReference {
        reference: path.raw.clone(),
      })?;

    let mut current = root;
    for segment in &path.segments {
      let next = match (current, segment) {
        (Value::Object(map), Segment::Key(key)) => map.get(key),
        (Value::Array(items), Segment::Index(idx)) => items.get(*idx),
        (Value::Array(items), Segment::Key(key)) => {
          key.parse::<usize>().ok().and_then(|i| items.get(i))
        }
        (Value::Object(map), Segment::Index(idx)) => map.get(&idx.to_string()),
        _ => None,
      };
      match next {
        Some(value) => current = value,
        None => return Ok(Value::Null),
      }
    }

    Ok(current.clone())
  }

  fn render(&self, env: &Environment<'_>, template: &str) -> Result<String, ResolveError> {
    let invalid = |e: minijinja::Error| ResolveError::InvalidTemplate {
      message: e.to_string(),
    };

    let tmpl = env.template_from_str(template).map_err(invalid)?;

    let globals: HashSet<&str> = env.globals().map(|(name, _)| name).collect();
    let mut missing: Vec<String> = tmpl
      .undeclared_variables(false)
      .into_iter()
      .filter(|name| {
        !self.bindings.contains_key(name)
          && !globals.contains(name.as_str())
          && !KEYWORDS.contains(&name.as_str())
      })
      .collect();
    if !missing.is_empty() {
      missing.sort();
      return Err(ResolveError::UnresolvedReference {
        reference: missing.join(", "),
      });
    }

    tmpl
      .render(minijinja::Value::from_serialize(&self.bindings))
      .map_err(invalid)
  }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
  Key(String),
  Index(usize),
}

#[derive(Debug, Clone, PartialEq)]
struct Path {
  raw: String,
  root: String,
  segments: Vec<Segment>,
}

/// Parse a string that consists of exactly one `{{ path }}` expression.
///
/// Paths are `name(.field | [index])*`. Anything else (filters, operators,
/// surrounding text) is not a reference and is rendered as a template.
fn reference_path(s: &str) -> Option<Path> {
  let inner = s.trim().strip_prefix("{{")?.strip_suffix("}}")?.trim();
  if inner.is_empty() || inner.contains("{{") || inner.contains("}}") {
    return None;
  }

  let mut chars = inner.char_indices().peekable();
  let ident = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-';

  let mut root = String::new();
  while let Some(&(_, c)) = chars.peek() {
    if !ident(c) {
      break;
    }
    root.push(c);
    chars.next();
  }
  if root.is_empty()
    || root.starts_with(|c: char| c.is_ascii_digit() || c == '-')
    || KEYWORDS.contains(&root.as_str())
  {
    return None;
  }

  let mut segments = Vec::new();
  while let Some((_, c)) = chars.next() {
    match c {
      '.' => {
        let mut key = String::new();
        while let Some(&(_, c)) = chars.peek() {
          if !ident(c) {
            break;
          }
          key.push(c);
          chars.next();
        }
        if key.is_empty() {
          return None;
        }
        segments.push(Segment::Key(key));
      }
      '[' => {
        let mut digits = String::new();
        let mut closed = false;
        for (_, c) in chars.by_ref() {
          if c == ']' {
            closed = true;
            break;
          }
          digits.push(c);
        }
        if !closed {
          return None;
        }
        segments.push(Segment::Index(digits.trim().parse().ok()?));
      }
      _ => return None,
    }
  }

  Some(Path {
    raw: inner.to_string(),
    root,
    segments,
  })
}
