//! In-memory order cache.
//!
//! [`LruCache`] is a generic bounded map with least-recently-used eviction,
//! built on an arena-indexed recency list. [`OrderCache`] specialises it to
//! orders behind a mutex and exposes the [`OrderLookup`] surface used by the
//! rest of the service.
//!
//! ```toml
//! [cache]
//! capacity = 1024
//! ```

mod config;
mod list;
mod lock;
pub mod lru;
mod store;

pub use config::CacheConfig;
pub use lru::LruCache;
pub use store::{OrderCache, OrderLookup};

pub(crate) use lock::mutex_lock;
pub(crate) use store::{METRIC_CACHE_EVICT, METRIC_CACHE_HIT, METRIC_CACHE_MISS};
