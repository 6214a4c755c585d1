use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing::{info, level_filters::LevelFilter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::metrics::{
    METRIC_CACHE_BYPASS, METRIC_CACHE_ERROR, METRIC_CACHE_HIT, METRIC_CACHE_INVALIDATE_MS,
    METRIC_CACHE_INVALIDATED_KEYS, METRIC_CACHE_MISS,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Installs the global subscriber for `logging` and registers metric
/// descriptions. Fails if a subscriber is already installed.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let events = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(level_filter(logging.level))
        .with(ErrorLayer::default())
        .with(events)
        .try_init()
        .map_err(|err| InfraError::telemetry(format!("subscriber already installed: {err}")))?;

    info!(
        target = "shelf::telemetry",
        version = env!("CARGO_PKG_VERSION"),
        level = %logging.level,
        format = ?logging.format,
        "Logging initialised"
    );
    Ok(())
}

/// `RUST_LOG` wins over the configured level; unparsable directives are skipped.
fn level_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CACHE_HIT,
            Unit::Count,
            "Listing reads answered from the cache."
        );
        describe_counter!(
            METRIC_CACHE_MISS,
            Unit::Count,
            "Listing reads that had to load from the store."
        );
        describe_counter!(
            METRIC_CACHE_BYPASS,
            Unit::Count,
            "Listing reads served from the store because the cache was unavailable."
        );
        describe_counter!(
            METRIC_CACHE_ERROR,
            Unit::Count,
            "Failed cache backend operations, labelled by operation."
        );
        describe_counter!(
            METRIC_CACHE_INVALIDATED_KEYS,
            Unit::Count,
            "Listing keys deleted by invalidation."
        );
        describe_histogram!(
            METRIC_CACHE_INVALIDATE_MS,
            Unit::Milliseconds,
            "Invalidation latency in milliseconds."
        );
    });
}
