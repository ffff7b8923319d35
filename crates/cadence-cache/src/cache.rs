use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::backend::{CacheBackend, MemoryBackend};
use crate::redis_backend::RedisBackend;

/// Which backing store the cache uses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CacheConfig {
  /// No backing store: every lookup misses.
  #[default]
  Disabled,
  /// In-process [`MemoryBackend`].
  Memory,
  /// A Redis server at the given `redis://` or `rediss://` URL, shared
  /// between processes.
  Redis(String),
}

impl std::str::FromStr for CacheConfig {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    let lower = s.to_ascii_lowercase();
    if lower.starts_with("redis://") || lower.starts_with("rediss://") {
      return Ok(CacheConfig::Redis(s.to_string()));
    }

    match lower.as_str() {
      "" | "off" | "none" | "disabled" => Ok(CacheConfig::Disabled),
      "memory" => Ok(CacheConfig::Memory),
      other => Err(format!("unknown cache backend '{}'", other)),
    }
  }
}

/// Cache-aside front end over an optional [`CacheBackend`].
///
/// Cheap to clone; clones share the backend, the write generation and the
/// set of pending writes.
#[derive(Clone, Default)]
pub struct Cache {
  backend: Option<Arc<dyn CacheBackend>>,
  /// Bumped by every delete. A detached write started under an older
  /// generation is dropped.
  generation: Arc<RwLock<u64>>,
  pending: TaskTracker,
}

impl std::fmt::Debug for Cache {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Cache")
      .field("enabled", &self.is_enabled())
      .field("pending", &self.pending.len())
      .finish()
  }
}

impl Cache {
  pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
    Self {
      backend: Some(backend),
      ..Self::default()
    }
  }

  /// A cache with no backing store.
  pub fn disabled() -> Self {
    Self::default()
  }

  /// Build the cache a config names. A Redis URL that does not parse leaves
  /// the cache disabled.
  pub fn from_config(config: CacheConfig) -> Self {
    match config {
      CacheConfig::Disabled => Self::disabled(),
      CacheConfig::Memory => Self::new(Arc::new(MemoryBackend::new())),
      CacheConfig::Redis(url) => match RedisBackend::open(&url) {
        Ok(backend) => Self::new(Arc::new(backend)),
        Err(e) => {
          warn!(error = %e, "cache_backend_unavailable");
          Self::disabled()
        }
      },
    }
  }

  pub fn is_enabled(&self) -> bool {
    self.backend.is_some()
  }

  /// Get a cached value. Backend errors and undecodable entries are misses.
  pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    let backend = self.backend.as_ref()?;

    let raw = match backend.get(key).await {
      Ok(raw) => raw?,
      Err(e) => {
        warn!(key, error = %e, "cache_get_failed");
        return None;
      }
    };

    match serde_json::from_str(&raw) {
      Ok(value) => Some(value),
      Err(e) => {
        warn!(key, error = %e, "cache_decode_failed");
        None
      }
    }
  }

  /// Store a value under `key` for `ttl_secs` seconds.
  pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl_secs: u64) {
    let Some(backend) = &self.backend else {
      return;
    };

    let raw = match serde_json::to_string(value) {
      Ok(raw) => raw,
      Err(e) => {
        warn!(key, error = %e, "cache_encode_failed");
        return;
      }
    };

    if let Err(e) = backend.set(key, raw, ttl_secs).await {
      warn!(key, error = %e, "cache_set_failed");
    }
  }

  /// Delete `key`. Detached writes that have not landed yet are discarded.
  pub async fn delete(&self, key: &str) {
    let Some(backend) = &self.backend else {
      return;
    };

    let mut generation = self.generation.write().await;
    *generation = generation.wrapping_add(1);
    if let Err(e) = backend.delete(key).await {
      warn!(key, error = %e, "cache_delete_failed");
    }
  }

  /// Return the cached value for `key`, or compute it.
  ///
  /// On a miss `compute` runs exactly once and its value is returned
  /// immediately; the cache is populated on a detached task. A compute error
  /// is returned as-is and nothing is cached. If any key is deleted while the
  /// value is being computed or written, the value is not cached.
  pub async fn get_or_compute<T, E, F, Fut>(
    &self,
    key: &str,
    ttl_secs: u64,
    compute: F,
  ) -> Result<T, E>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    if let Some(hit) = self.get::<T>(key).await {
      debug!(key, "cache_hit");
      return Ok(hit);
    }

    let generation = *self.generation.read().await;
    let value = compute().await?;
    self.populate(key, &value, ttl_secs, generation);
    Ok(value)
  }

  /// Wait for every detached write started so far to finish.
  pub async fn flush(&self) {
    self.pending.close();
    self.pending.wait().await;
    self.pending.reopen();
  }

  fn populate<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64, started: u64) {
    let Some(backend) = self.backend.clone() else {
      return;
    };

    let raw = match serde_json::to_string(value) {
      Ok(raw) => raw,
      Err(e) => {
        warn!(key, error = %e, "cache_encode_failed");
        return;
      }
    };

    let key = key.to_string();
    let generation = self.generation.clone();
    self.pending.spawn(async move {
      let current = generation.read().await;
      if *current != started {
        debug!(key = %key, "cache_populate_skipped");
        return;
      }
      if let Err(e) = backend.set(&key, raw, ttl_secs).await {
        warn!(key = %key, error = %e, "cache_populate_failed");
      }
    });
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;

  use async_trait::async_trait;
  use serde_json::{Value, json};

  use super::*;
  use crate::error::CacheError;

  struct FailingBackend;

  #[async_trait]
  impl CacheBackend for FailingBackend {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
      Err(CacheError::backend("connection refused"))
    }

    async fn set(&self, _key: &str, _value: String, _ttl_secs: u64) -> Result<(), CacheError> {
      Err(CacheError::backend("connection refused"))
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
      Err(CacheError::backend("connection refused"))
    }
  }

  fn memory_cache() -> Cache {
    Cache::from_config(CacheConfig::Memory)
  }

  async fn wait_for<T: DeserializeOwned>(cache: &Cache, key: &str) -> Option<T> {
    for _ in 0..100 {
      if let Some(value) = cache.get(key).await {
        return Some(value);
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    None
  }

  #[tokio::test]
  async fn test_set_get_delete() {
    let cache = memory_cache();

    cache.set("k", &json!({ "n": 1 }), 60).await;
    assert_eq!(cache.get::<Value>("k").await, Some(json!({ "n": 1 })));

    cache.delete("k").await;
    assert_eq!(cache.get::<Value>("k").await, None);
  }

  #[tokio::test]
  async fn test_get_or_compute_memoizes() {
    let cache = memory_cache();
    let calls = AtomicUsize::new(0);

    let compute = || async {
      calls.fetch_add(1, Ordering::SeqCst);
      Ok::<_, String>(json!("fresh"))
    };

    let first = cache.get_or_compute("k", 60, compute).await.unwrap();
    assert_eq!(first, json!("fresh"));
    assert_eq!(wait_for::<Value>(&cache, "k").await, Some(json!("fresh")));

    let second = cache.get_or_compute("k", 60, compute).await.unwrap();
    assert_eq!(second, json!("fresh"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_delete_discards_pending_populate() {
    let cache = memory_cache();

    let stale: Result<Value, String> =
      cache.get_or_compute("k", 60, || async { Ok(json!("stale")) }).await;
    assert_eq!(stale.unwrap(), json!("stale"));
    cache.delete("k").await;

    cache.flush().await;
    assert_eq!(cache.get::<Value>("k").await, None);

    let fresh: Result<Value, String> =
      cache.get_or_compute("k", 60, || async { Ok(json!("fresh")) }).await;
    assert_eq!(fresh.unwrap(), json!("fresh"));
    assert_eq!(wait_for::<Value>(&cache, "k").await, Some(json!("fresh")));
  }

  #[tokio::test]
  async fn test_delete_during_compute_skips_populate() {
    let cache = memory_cache();

    let value: Result<Value, String> = cache
      .get_or_compute("k", 60, || async {
        cache.delete("k").await;
        Ok(json!("stale"))
      })
      .await;
    assert_eq!(value.unwrap(), json!("stale"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(cache.get::<Value>("k").await, None);
  }

  #[tokio::test]
  async fn test_flush_waits_for_pending_writes() {
    let cache = memory_cache();

    let value: Result<u32, String> = cache.get_or_compute("k", 60, || async { Ok(7) }).await;
    assert_eq!(value, Ok(7));

    cache.flush().await;
    assert_eq!(cache.get::<u32>("k").await, Some(7));
  }

  #[tokio::test]
  async fn test_get_or_compute_error_is_not_cached() {
    let cache = memory_cache();

    let result: Result<Value, String> = cache
      .get_or_compute("k", 60, || async { Err("upstream down".to_string()) })
      .await;
    assert_eq!(result.unwrap_err(), "upstream down");

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(cache.get::<Value>("k").await, None);
  }

  #[tokio::test]
  async fn test_disabled_cache_always_computes() {
    let cache = Cache::disabled();
    let calls = AtomicUsize::new(0);

    for _ in 0..3 {
      let value: Result<u32, String> = cache
        .get_or_compute("k", 60, || async {
          calls.fetch_add(1, Ordering::SeqCst);
          Ok(7)
        })
        .await;
      assert_eq!(value, Ok(7));
    }

    cache.set("k", &1, 60).await;
    cache.delete("k").await;
    assert_eq!(cache.get::<u32>("k").await, None);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn test_backend_errors_are_absorbed() {
    let cache = Cache::new(Arc::new(FailingBackend));

    cache.set("k", &"v", 60).await;
    cache.delete("k").await;
    assert_eq!(cache.get::<String>("k").await, None);

    let value: Result<String, String> = cache
      .get_or_compute("k", 60, || async { Ok("computed".to_string()) })
      .await;
    assert_eq!(value.unwrap(), "computed");
  }

  #[tokio::test]
  async fn test_undecodable_entry_is_a_miss() {
    let backend = Arc::new(MemoryBackend::new());
    backend.set("k", "not json".to_string(), 60).await.unwrap();

    let cache = Cache::new(backend);
    assert_eq!(cache.get::<Value>("k").await, None);
  }

  #[tokio::test]
  async fn test_unreachable_redis_is_a_miss() {
    let cache = Cache::from_config(CacheConfig::Redis("redis://127.0.0.1:1/".to_string()));
    assert!(cache.is_enabled());

    assert_eq!(cache.get::<String>("k").await, None);
    cache.delete("k").await;

    let value: Result<String, String> = cache
      .get_or_compute("k", 60, || async { Ok("computed".to_string()) })
      .await;
    assert_eq!(value.unwrap(), "computed");
    cache.flush().await;
  }

  #[test]
  fn test_malformed_redis_url_disables_cache() {
    let cache = Cache::from_config(CacheConfig::Redis("not a url".to_string()));
    assert!(!cache.is_enabled());
  }

  #[test]
  fn test_cache_config_from_str() {
    assert_eq!("memory".parse::<CacheConfig>(), Ok(CacheConfig::Memory));
    assert_eq!("off".parse::<CacheConfig>(), Ok(CacheConfig::Disabled));
    assert_eq!(
      "redis://Cache.Local:6379/2".parse::<CacheConfig>(),
      Ok(CacheConfig::Redis("redis://Cache.Local:6379/2".to_string()))
    );
    assert!("rediss://host".parse::<CacheConfig>().is_ok());
    assert!("redis".parse::<CacheConfig>().is_err());
  }
}
