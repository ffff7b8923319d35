//! Cadence Cache
//!
//! A cache-aside layer over a key-value backing store, either a bounded
//! in-process LRU map or a shared Redis server. Values are stored as JSON
//! strings with a per-entry TTL.
//!
//! The cache is advisory: when no backend is configured every lookup misses,
//! and backend failures are logged and treated as misses. Callers never see
//! a cache error.

mod backend;
mod cache;
mod error;
mod keys;
mod redis_backend;

pub use backend::{CacheBackend, DEFAULT_CAPACITY, MemoryBackend};
pub use cache::{Cache, CacheConfig};
pub use error::CacheError;
pub use keys::CacheClass;
pub use redis_backend::RedisBackend;
