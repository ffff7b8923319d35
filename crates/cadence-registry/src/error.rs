use thiserror::Error;

/// Errors raised while building or querying the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
  /// The path is not `category.module.function`.
  #[error("invalid module path '{path}': expected 'category.module.function'")]
  InvalidPath { path: String },

  #[error("category '{category}' not found (available: {})", .available.join(", "))]
  CategoryNotFound {
    category: String,
    available: Vec<String>,
  },

  #[error("module '{module}' not found in category '{category}' (available: {})", .available.join(", "))]
  ModuleNotFound {
    category: String,
    module: String,
    available: Vec<String>,
  },

  #[error("function '{function}' not found in module '{module}' (available: {})", .available.join(", "))]
  FunctionNotFound {
    module: String,
    function: String,
    available: Vec<String>,
  },

  /// Registration tried to add a path that already exists.
  #[error("module function '{path}' is already registered")]
  DuplicateFunction { path: String },

  /// A category or module name normalizes to one that is already registered.
  #[error("'{name}' conflicts with registered name '{existing}'")]
  ConflictingName { name: String, existing: String },

  /// Names must be non-empty and cannot contain the path separator.
  #[error("invalid registry name '{name}'")]
  InvalidName { name: String },
}

/// Errors returned by module function handlers.
///
/// The engine treats these as opaque: the message is recorded against the
/// failing step and reported in the progress feed.
#[derive(Debug, Error)]
pub enum ModuleError {
  /// The inputs did not satisfy the function's signature.
  #[error("invalid input: {message}")]
  InvalidInput { message: String },

  /// The function ran and reported a failure.
  #[error("{message}")]
  Failed { message: String },

  #[error(transparent)]
  Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ModuleError {
  pub fn invalid_input(message: impl Into<String>) -> Self {
    Self::InvalidInput {
      message: message.into(),
    }
  }

  pub fn failed(message: impl Into<String>) -> Self {
    Self::Failed {
      message: message.into(),
    }
  }
}
