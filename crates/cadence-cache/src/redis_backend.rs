use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tokio::sync::Mutex;

use crate::backend::CacheBackend;
use crate::error::CacheError;

/// Cache backend on a Redis server, shared by every process pointed at it.
///
/// The connection is opened on first use. After a failed command it is
/// dropped and the next command reconnects.
pub struct RedisBackend {
  client: redis::Client,
  conn: Mutex<Option<MultiplexedConnection>>,
}

impl std::fmt::Debug for RedisBackend {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RedisBackend").finish_non_exhaustive()
  }
}

impl RedisBackend {
  /// Parse `url` without connecting.
  pub fn open(url: &str) -> Result<Self, CacheError> {
    Ok(Self {
      client: redis::Client::open(url)?,
      conn: Mutex::new(None),
    })
  }

  async fn connection(&self) -> Result<MultiplexedConnection, CacheError> {
    let mut conn = self.conn.lock().await;
    if let Some(existing) = conn.as_ref() {
      return Ok(existing.clone());
    }

    let fresh = self.client.get_multiplexed_async_connection().await?;
    *conn = Some(fresh.clone());
    Ok(fresh)
  }

  async fn reset(&self) {
    self.conn.lock().await.take();
  }

  /// Drop the shared connection when `result` failed.
  async fn checked<T>(&self, result: redis::RedisResult<T>) -> Result<T, CacheError> {
    match result {
      Ok(value) => Ok(value),
      Err(e) => {
        self.reset().await;
        Err(e.into())
      }
    }
  }
}

#[async_trait]
impl CacheBackend for RedisBackend {
  async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
    let mut conn = self.connection().await?;
    let result: redis::RedisResult<Option<String>> = conn.get(key).await;
    self.checked(result).await
  }

  async fn set(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), CacheError> {
    let mut conn = self.connection().await?;
    let result: redis::RedisResult<()> = if ttl_secs == 0 {
      conn.set(key, value).await
    } else {
      conn.set_ex(key, value, ttl_secs).await
    };
    self.checked(result).await
  }

  async fn delete(&self, key: &str) -> Result<(), CacheError> {
    let mut conn = self.connection().await?;
    let result: redis::RedisResult<()> = conn.del(key).await;
    self.checked(result).await
  }
}
