//! Order cache shared by the ingestion pipeline and the read path.

use std::sync::{Arc, Mutex};

use metrics::counter;

use crate::domain::order::{Order, OrderUid};

use super::config::CacheConfig;
use super::lock::mutex_lock;
use super::lru::LruCache;

const SOURCE: &str = "cache::store";

pub(crate) const METRIC_CACHE_HIT: &str = "orderline_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "orderline_cache_miss_total";
pub(crate) const METRIC_CACHE_EVICT: &str = "orderline_cache_evict_total";

/// Narrow cache surface consumed by ingestion, warmup and the read path.
///
/// Neither operation can fail.
pub trait OrderLookup: Send + Sync {
    fn get(&self, uid: &OrderUid) -> Option<Arc<Order>>;

    fn put(&self, uid: OrderUid, order: Arc<Order>);
}

/// Bounded LRU of orders keyed by uid.
///
/// The mutex is held for a single lookup or insert only.
pub struct OrderCache {
    entries: Mutex<LruCache<OrderUid, Arc<Order>>>,
}

impl OrderCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(config.capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "capacity").capacity()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, uid: &OrderUid) -> bool {
        mutex_lock(&self.entries, SOURCE, "contains").contains(uid)
    }

    /// Uids from most to least recently used.
    pub fn uids_mru(&self) -> Vec<OrderUid> {
        mutex_lock(&self.entries, SOURCE, "uids_mru")
            .keys_mru()
            .cloned()
            .collect()
    }
}

impl OrderLookup for OrderCache {
    fn get(&self, uid: &OrderUid) -> Option<Arc<Order>> {
        let found = mutex_lock(&self.entries, SOURCE, "get").get(uid).cloned();
        match found {
            Some(order) => {
                counter!(METRIC_CACHE_HIT).increment(1);
                Some(order)
            }
            None => {
                counter!(METRIC_CACHE_MISS).increment(1);
                None
            }
        }
    }

    fn put(&self, uid: OrderUid, order: Arc<Order>) {
        let evicted = mutex_lock(&self.entries, SOURCE, "put").put(uid, order);
        if let Some((evicted_uid, _)) = evicted {
            counter!(METRIC_CACHE_EVICT).increment(1);
            tracing::debug!(order_uid = %evicted_uid, "Evicted least recently used order");
        }
    }
}
