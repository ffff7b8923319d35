use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::Mutex;

use crate::error::CacheError;

/// Number of entries a [`MemoryBackend`] holds unless configured otherwise.
pub const DEFAULT_CAPACITY: usize = 1024;

/// A key-value store holding string values with optional expiry.
///
/// This trait is async to support networked backends like Redis.
#[async_trait]
pub trait CacheBackend: Send + Sync {
  /// Get a value by key. Expired entries are reported as missing.
  async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

  /// Set a value, replacing any previous one. A `ttl_secs` of 0 never expires.
  async fn set(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), CacheError>;

  /// Delete a value. Deleting a missing key is not an error.
  async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

#[derive(Debug)]
struct Entry {
  value: String,
  expires_at: Option<Instant>,
}

impl Entry {
  fn is_expired(&self, now: Instant) -> bool {
    self.expires_at.is_some_and(|at| now >= at)
  }
}

/// In-process cache backend bounded to a fixed number of entries.
///
/// When full, a write first drops expired entries and then evicts the least
/// recently used one. Expired entries are also dropped when read.
pub struct MemoryBackend {
  entries: Mutex<LruCache<String, Entry>>,
}

impl std::fmt::Debug for MemoryBackend {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("MemoryBackend").finish_non_exhaustive()
  }
}

impl Default for MemoryBackend {
  fn default() -> Self {
    Self::new()
  }
}

impl MemoryBackend {
  pub fn new() -> Self {
    Self::with_capacity(DEFAULT_CAPACITY)
  }

  /// A backend holding at most `capacity` entries (at least one).
  pub fn with_capacity(capacity: usize) -> Self {
    let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
    Self {
      entries: Mutex::new(LruCache::new(cap)),
    }
  }

  /// Remove every expired entry and return how many were removed.
  pub async fn purge_expired(&self) -> usize {
    purge(&mut *self.entries.lock().await, Instant::now())
  }

  pub async fn len(&self) -> usize {
    self.entries.lock().await.len()
  }

  pub async fn is_empty(&self) -> bool {
    self.entries.lock().await.is_empty()
  }
}

fn purge(entries: &mut LruCache<String, Entry>, now: Instant) -> usize {
  let expired: Vec<String> = entries
    .iter()
    .filter(|(_, entry)| entry.is_expired(now))
    .map(|(key, _)| key.clone())
    .collect();
  for key in &expired {
    entries.pop(key);
  }
  expired.len()
}

#[async_trait]
impl CacheBackend for MemoryBackend {
  async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
    let now = Instant::now();
    let mut entries = self.entries.lock().await;
    match entries.get(key) {
      None => return Ok(None),
      Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
      Some(_) => {}
    }
    entries.pop(key);
    Ok(None)
  }

  async fn set(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), CacheError> {
    let now = Instant::now();
    let expires_at = (ttl_secs > 0).then(|| now + Duration::from_secs(ttl_secs));

    let mut entries = self.entries.lock().await;
    if entries.len() >= entries.cap().get() && !entries.contains(key) {
      purge(&mut entries, now);
    }
    entries.put(key.to_string(), Entry { value, expires_at });
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<(), CacheError> {
    self.entries.lock().await.pop(key);
    Ok(())
  }
}
