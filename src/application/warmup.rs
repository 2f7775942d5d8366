//! Startup cache warmup.
//!
//! Seeds the order cache from the durable store before ingestion starts, so
//! that reads issued right after a restart are served from memory.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use metrics::{gauge, histogram};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{info, instrument, warn};

use crate::{
    application::repos::{OrdersRepo, RepoError},
    cache::{OrderCache, OrderLookup},
};

pub(crate) const METRIC_WARMUP_LOADED: &str = "orderline_cache_warmup_loaded";
pub(crate) const METRIC_WARMUP_MS: &str = "orderline_cache_warm_ms";

#[derive(Debug, Error)]
pub enum WarmupError {
    #[error("failed to fetch orders for warmup: {0}")]
    Fetch(#[from] RepoError),
    #[error("warmup fetch exceeded {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmupReport {
    /// Records returned by the store.
    pub fetched: usize,
    /// Records put into the cache.
    pub inserted: usize,
    /// Records dropped because their uid was blank.
    pub skipped: usize,
}

/// Populate `cache` with at most `cache.capacity()` of the most recently
/// touched orders.
///
/// Orders are put in reverse fetch order so the most recently touched one
/// ends up most recently used. A failed fetch leaves the cache unchanged.
pub async fn warm_cache(
    repo: &dyn OrdersRepo,
    cache: &OrderCache,
) -> Result<WarmupReport, WarmupError> {
    let orders = repo.list_for_warmup(cache.capacity()).await?;

    let mut report = WarmupReport {
        fetched: orders.len(),
        ..WarmupReport::default()
    };

    for order in orders.into_iter().rev() {
        if order.uid.is_blank() {
            report.skipped += 1;
            continue;
        }
        cache.put(order.uid.clone(), Arc::new(order));
        report.inserted += 1;
    }

    Ok(report)
}

/// Runs [`warm_cache`] with the configured store timeout and records metrics.
pub struct CacheWarmer {
    repo: Arc<dyn OrdersRepo>,
    cache: Arc<OrderCache>,
    store_timeout: Duration,
}

impl CacheWarmer {
    pub fn new(repo: Arc<dyn OrdersRepo>, cache: Arc<OrderCache>, store_timeout: Duration) -> Self {
        Self {
            repo,
            cache,
            store_timeout,
        }
    }

    #[instrument(skip(self), fields(capacity = self.cache.capacity()))]
    pub async fn warm_initial(&self) -> Result<WarmupReport, WarmupError> {
        let started_at = Instant::now();

        let report = timeout(
            self.store_timeout,
            warm_cache(self.repo.as_ref(), &self.cache),
        )
        .await
        .map_err(|_| WarmupError::Timeout(self.store_timeout))??;

        if report.skipped > 0 {
            warn!(
                skipped = report.skipped,
                "Skipped stored orders without an order uid"
            );
        }
        info!(
            fetched = report.fetched,
            inserted = report.inserted,
            cached = self.cache.len(),
            "Cache warmed from store"
        );

        gauge!(METRIC_WARMUP_LOADED).set(report.inserted as f64);
        histogram!(METRIC_WARMUP_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        Ok(report)
    }
}
