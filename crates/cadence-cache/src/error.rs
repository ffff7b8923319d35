/// Errors raised by cache backends.
///
/// These never reach callers of [`Cache`](crate::Cache); they are logged and
/// absorbed.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
  /// The backing store could not be reached or rejected the operation.
  #[error("cache backend error: {message}")]
  Backend { message: String },

  #[error("redis error: {0}")]
  Redis(#[from] redis::RedisError),

  #[error("cache serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl CacheError {
  pub fn backend(message: impl Into<String>) -> Self {
    Self::Backend {
      message: message.into(),
    }
  }
}
