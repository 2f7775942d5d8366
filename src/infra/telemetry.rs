use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::{
    application::{
        ingest::{METRIC_INGEST_MS, METRIC_INGEST_OUTCOME},
        warmup::{METRIC_WARMUP_LOADED, METRIC_WARMUP_MS},
    },
    cache::{METRIC_CACHE_EVICT, METRIC_CACHE_HIT, METRIC_CACHE_MISS},
    config::{LogFormat, LoggingSettings},
};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register descriptions for every metric the service emits. Idempotent.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CACHE_HIT,
            Unit::Count,
            "Total number of order cache hits."
        );
        describe_counter!(
            METRIC_CACHE_MISS,
            Unit::Count,
            "Total number of order cache misses."
        );
        describe_counter!(
            METRIC_CACHE_EVICT,
            Unit::Count,
            "Total number of orders evicted from the cache due to capacity."
        );
        describe_counter!(
            METRIC_INGEST_OUTCOME,
            Unit::Count,
            "Processed stream messages, labelled by outcome."
        );
        describe_histogram!(
            METRIC_INGEST_MS,
            Unit::Milliseconds,
            "Per-message ingestion latency in milliseconds."
        );
        describe_gauge!(
            METRIC_WARMUP_LOADED,
            Unit::Count,
            "Orders loaded into the cache by the last warmup."
        );
        describe_histogram!(
            METRIC_WARMUP_MS,
            Unit::Milliseconds,
            "Cache warmup latency in milliseconds."
        );
    });
}
