//! Order cache configuration.
//!
//! Set via the `[cache]` section of `orderline.toml` or
//! `ORDERLINE__CACHE__CAPACITY`; a zero capacity is rejected while loading
//! settings, so the cache never sees one.

use std::num::NonZeroUsize;

use crate::config::CacheSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of orders held in memory.
    pub capacity: NonZeroUsize,
}

impl CacheConfig {
    pub const fn new(capacity: NonZeroUsize) -> Self {
        Self { capacity }
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self::new(settings.capacity)
    }
}
