use std::fmt;
use std::sync::Arc;

use serde_json::{Value, json};

use crate::error::{ModuleError, RegistryError};
use crate::handler::{InvocationContext, ModuleHandler};

/// A named, documented unit of work.
#[derive(Clone)]
pub struct ModuleFunction {
  pub name: String,
  pub description: String,
  pub signature: String,
  pub example: Option<String>,
  handler: Arc<dyn ModuleHandler>,
}

impl fmt::Debug for ModuleFunction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ModuleFunction")
      .field("name", &self.name)
      .field("description", &self.description)
      .field("signature", &self.signature)
      .field("example", &self.example)
      .finish_non_exhaustive()
  }
}

impl ModuleFunction {
  pub fn new(
    name: impl Into<String>,
    description: impl Into<String>,
    signature: impl Into<String>,
    handler: Arc<dyn ModuleHandler>,
  ) -> Self {
    Self {
      name: name.into(),
      description: description.into(),
      signature: signature.into(),
      example: None,
      handler,
    }
  }

  pub fn with_example(mut self, example: impl Into<String>) -> Self {
    self.example = Some(example.into());
    self
  }

  /// Invoke the function's handler.
  pub async fn invoke(&self, inputs: Value, ctx: &InvocationContext) -> Result<Value, ModuleError> {
    self.handler.call(inputs, ctx).await
  }
}

#[derive(Debug, Clone)]
pub struct Module {
  pub name: String,
  functions: Vec<ModuleFunction>,
}

impl Module {
  fn new(name: String) -> Self {
    Self {
      name,
      functions: Vec::new(),
    }
  }

  /// Functions in registration order.
  pub fn functions(&self) -> &[ModuleFunction] {
    &self.functions
  }

  /// Look up a function by its exact name.
  pub fn function(&self, name: &str) -> Option<&ModuleFunction> {
    self.functions.iter().find(|f| f.name == name)
  }
}

#[derive(Debug, Clone)]
pub struct Category {
  pub name: String,
  modules: Vec<Module>,
}

impl Category {
  fn new(name: String) -> Self {
    Self {
      name,
      modules: Vec::new(),
    }
  }

  /// Modules in registration order.
  pub fn modules(&self) -> &[Module] {
    &self.modules
  }

  /// Look up a module by canonical or normalized name.
  pub fn module(&self, name: &str) -> Option<&Module> {
    self.modules.iter().find(|m| names_match(&m.name, name))
  }
}

/// Normalize a category or module name for lookup.
///
/// Lowercases and collapses whitespace runs into a single `-`, so
/// `"AI SDK"` and `"ai-sdk"` refer to the same module.
pub fn normalize(name: &str) -> String {
  name
    .split_whitespace()
    .collect::<Vec<_>>()
    .join("-")
    .to_lowercase()
}

fn names_match(canonical: &str, query: &str) -> bool {
  if canonical == query {
    return true;
  }
  let canonical = normalize(canonical);
  let query = normalize(query);
  canonical == query || canonical.replace('-', "") == query.replace('-', "")
}

/// A function together with where it lives in the registry.
#[derive(Debug, Clone, Copy)]
pub struct FunctionRef<'a> {
  pub category: &'a Category,
  pub module: &'a Module,
  pub function: &'a ModuleFunction,
}

impl<'a> FunctionRef<'a> {
  /// Canonical `category.module.function` path.
  pub fn path(&self) -> String {
    format!(
      "{}.{}.{}",
      self.category.name, self.module.name, self.function.name
    )
  }

  /// A step definition that invokes this function, for documentation output.
  pub fn usage_snippet(&self) -> Value {
    json!({
      "id": "step-1",
      "module": self.path(),
      "inputs": {},
      "outputAs": "result",
    })
  }

  /// Other functions in the same module, up to `limit`.
  pub fn related(&self, limit: usize) -> Vec<&'a ModuleFunction> {
    self
      .module
      .functions()
      .iter()
      .filter(|f| f.name != self.function.name)
      .take(limit)
      .collect()
  }
}

/// Immutable catalog of categories, modules and functions.
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
  categories: Vec<Category>,
}

impl ModuleRegistry {
  pub fn builder() -> RegistryBuilder {
    RegistryBuilder::default()
  }

  /// Categories in registration order.
  pub fn categories(&self) -> &[Category] {
    &self.categories
  }

  /// Look up a category by canonical or normalized name.
  pub fn category(&self, name: &str) -> Option<&Category> {
    self.categories.iter().find(|c| names_match(&c.name, name))
  }

  pub fn find_module(&self, category: &str, name: &str) -> Option<&Module> {
    self.category(category).and_then(|c| c.module(name))
  }

  /// Resolve a `category.module.function` path to its function.
  pub fn resolve(&self, path: &str) -> Result<&ModuleFunction, RegistryError> {
    self.lookup(path).map(|r| r.function)
  }

  /// Resolve a path, keeping the category and module it was found in.
  pub fn lookup(&self, path: &str) -> Result<FunctionRef<'_>, RegistryError> {
    let (category_name, module_name, function_name) = parse_path(path)?;

    let category = self
      .category(category_name)
      .ok_or_else(|| RegistryError::CategoryNotFound {
        category: category_name.to_string(),
        available: self.categories.iter().map(|c| c.name.clone()).collect(),
      })?;

    let module = category
      .module(module_name)
      .ok_or_else(|| RegistryError::ModuleNotFound {
        category: category.name.clone(),
        module: module_name.to_string(),
        available: category.modules.iter().map(|m| m.name.clone()).collect(),
      })?;

    let function = module
      .function(function_name)
      .ok_or_else(|| RegistryError::FunctionNotFound {
        module: format!("{}.{}", category.name, module.name),
        function: function_name.to_string(),
        available: module.functions.iter().map(|f| f.name.clone()).collect(),
      })?;

    Ok(FunctionRef {
      category,
      module,
      function,
    })
  }

  /// Iterate every function in registry order.
  pub fn functions(&self) -> impl Iterator<Item = FunctionRef<'_>> {
    self.categories.iter().flat_map(|category| {
      category.modules.iter().flat_map(move |module| {
        module.functions.iter().map(move |function| FunctionRef {
          category,
          module,
          function,
        })
      })
    })
  }

  /// Functions whose path, name or description contains `query`
  /// (case-insensitive).
  pub fn search(&self, query: &str) -> Vec<FunctionRef<'_>> {
    let query = query.to_lowercase();
    self
      .functions()
      .filter(|r| {
        r.path().to_lowercase().contains(&query)
          || r.function.description.to_lowercase().contains(&query)
      })
      .collect()
  }

  pub fn len(&self) -> usize {
    self.functions().count()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

fn parse_path(path: &str) -> Result<(&str, &str, &str), RegistryError> {
  let invalid = || RegistryError::InvalidPath {
    path: path.to_string(),
  };

  let mut parts = path.split('.');
  let (Some(category), Some(module), Some(function), None) =
    (parts.next(), parts.next(), parts.next(), parts.next())
  else {
    return Err(invalid());
  };

  if [category, module, function].iter().any(|p| p.trim().is_empty()) {
    return Err(invalid());
  }

  Ok((category, module, function))
}

/// Rejects a name that matches an already registered sibling once normalized.
fn check_conflict<'a>(
  existing: impl IntoIterator<Item = &'a str>,
  name: &str,
) -> Result<(), RegistryError> {
  match existing.into_iter().find(|e| names_match(e, name)) {
    Some(e) => Err(RegistryError::ConflictingName {
      name: name.to_string(),
      existing: e.to_string(),
    }),
    None => Ok(()),
  }
}

/// Assembles a [`ModuleRegistry`].
///
/// Categories and modules are created on first use and keep registration
/// order. Registering the same path twice is an error.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
  categories: Vec<Category>,
}

impl RegistryBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(
    &mut self,
    category: &str,
    module: &str,
    function: ModuleFunction,
  ) -> Result<&mut Self, RegistryError> {
    for name in [category, module, function.name.as_str()] {
      if name.trim().is_empty() || name.contains('.') {
        return Err(RegistryError::InvalidName {
          name: name.to_string(),
        });
      }
    }

    let category_idx = match self.categories.iter().position(|c| c.name == category) {
      Some(idx) => idx,
      None => {
        check_conflict(self.categories.iter().map(|c| c.name.as_str()), category)?;
        self.categories.push(Category::new(category.to_string()));
        self.categories.len() - 1
      }
    };
    let modules = &mut self.categories[category_idx].modules;

    let module_idx = match modules.iter().position(|m| m.name == module) {
      Some(idx) => idx,
      None => {
        check_conflict(modules.iter().map(|m| m.name.as_str()), module)?;
        modules.push(Module::new(module.to_string()));
        modules.len() - 1
      }
    };
    let functions = &mut modules[module_idx].functions;

    if functions.iter().any(|f| f.name == function.name) {
      return Err(RegistryError::DuplicateFunction {
        path: format!("{}.{}.{}", category, module, function.name),
      });
    }

    functions.push(function);
    Ok(self)
  }

  pub fn build(self) -> ModuleRegistry {
    ModuleRegistry {
      categories: self.categories,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::handler::handler_fn;

  fn noop(name: &str, description: &str) -> ModuleFunction {
    ModuleFunction::new(
      name,
      description,
      format!("{}(): object", name),
      handler_fn(|_, _| async { Ok(Value::Null) }),
    )
  }

  fn test_registry() -> ModuleRegistry {
    let mut builder = ModuleRegistry::builder();
    builder
      .register("ai", "ai-sdk", noop("chat", "Chat with a language model"))
      .unwrap()
      .register("ai", "ai-sdk", noop("embed", "Create embeddings"))
      .unwrap()
      .register("Communication", "Email Tools", noop("sendEmail", "Send an email"))
      .unwrap();
    builder.build()
  }

  #[test]
  fn test_resolve_valid_path() {
    let registry = test_registry();
    let function = registry.resolve("ai.ai-sdk.chat").unwrap();
    assert_eq!(function.name, "chat");
  }

  #[test]
  fn test_resolve_requires_three_segments() {
    let registry = test_registry();

    for path in ["ai.ai-sdk", "ai", "ai.ai-sdk.chat.extra", "ai..chat", ""] {
      assert!(
        matches!(
          registry.resolve(path),
          Err(RegistryError::InvalidPath { .. })
        ),
        "expected InvalidPath for '{}'",
        path
      );
    }
  }

  #[test]
  fn test_resolve_missing_module() {
    let registry = test_registry();
    let err = registry.resolve("ai.nope.chat").unwrap_err();

    assert_eq!(
      err,
      RegistryError::ModuleNotFound {
        category: "ai".to_string(),
        module: "nope".to_string(),
        available: vec!["ai-sdk".to_string()],
      }
    );
  }

  #[test]
  fn test_resolve_missing_category_and_function() {
    let registry = test_registry();

    assert!(matches!(
      registry.resolve("storage.s3.put"),
      Err(RegistryError::CategoryNotFound { .. })
    ));
    assert!(matches!(
      registry.resolve("ai.ai-sdk.Chat"),
      Err(RegistryError::FunctionNotFound { .. })
    ));
  }

  #[test]
  fn test_normalized_category_and_module_names() {
    let registry = test_registry();

    let found = registry.lookup("communication.email-tools.sendEmail").unwrap();
    assert_eq!(found.path(), "Communication.Email Tools.sendEmail");

    assert!(registry.resolve("communication.emailtools.sendEmail").is_ok());
    assert!(registry.find_module("COMMUNICATION", "email tools").is_some());
  }

  #[test]
  fn test_duplicate_registration_rejected() {
    let mut builder = RegistryBuilder::new();
    builder.register("ai", "ai-sdk", noop("chat", "")).unwrap();

    let err = builder
      .register("ai", "ai-sdk", noop("chat", ""))
      .unwrap_err();
    assert_eq!(
      err,
      RegistryError::DuplicateFunction {
        path: "ai.ai-sdk.chat".to_string()
      }
    );
  }

  #[test]
  fn test_names_differing_only_by_normalization_rejected() {
    let mut builder = RegistryBuilder::new();
    builder.register("AI", "ai-sdk", noop("chat", "")).unwrap();

    let err = builder.register("ai", "ai-sdk", noop("embed", "")).unwrap_err();
    assert_eq!(
      err,
      RegistryError::ConflictingName {
        name: "ai".to_string(),
        existing: "AI".to_string(),
      }
    );

    let err = builder.register("AI", "AI SDK", noop("embed", "")).unwrap_err();
    assert!(matches!(err, RegistryError::ConflictingName { .. }));

    builder.register("AI", "ai-sdk", noop("embed", "")).unwrap();
    let registry = builder.build();
    assert_eq!(registry.categories().len(), 1);
    assert!(registry.resolve("ai.aisdk.embed").is_ok());
  }

  #[test]
  fn test_names_cannot_contain_separator() {
    let mut builder = RegistryBuilder::new();
    let err = builder
      .register("ai", "ai.sdk", noop("chat", ""))
      .unwrap_err();
    assert!(matches!(err, RegistryError::InvalidName { .. }));
  }

  #[test]
  fn test_registration_order_is_kept() {
    let registry = test_registry();

    let categories: Vec<_> = registry.categories().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(categories, vec!["ai", "Communication"]);

    let paths: Vec<_> = registry.functions().map(|r| r.path()).collect();
    assert_eq!(
      paths,
      vec![
        "ai.ai-sdk.chat",
        "ai.ai-sdk.embed",
        "Communication.Email Tools.sendEmail"
      ]
    );
  }

  #[test]
  fn test_search_matches_path_and_description() {
    let registry = test_registry();

    let by_description: Vec<_> = registry.search("EMBEDDINGS").into_iter().map(|r| r.path()).collect();
    assert_eq!(by_description, vec!["ai.ai-sdk.embed"]);

    assert_eq!(registry.search("email").len(), 1);
    assert!(registry.search("nothing-like-this").is_empty());
  }

  #[test]
  fn test_usage_snippet_and_related() {
    let registry = test_registry();
    let found = registry.lookup("ai.ai-sdk.chat").unwrap();

    assert_eq!(found.usage_snippet()["module"], "ai.ai-sdk.chat");
    assert_eq!(found.usage_snippet()["outputAs"], "result");

    let related: Vec<_> = found.related(5).into_iter().map(|f| f.name.as_str()).collect();
    assert_eq!(related, vec!["embed"]);
  }
}
