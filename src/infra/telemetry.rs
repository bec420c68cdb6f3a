use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "microfeed_feed_cache_hit_total",
            Unit::Count,
            "Feed reads served from a warm cached list."
        );
        describe_counter!(
            "microfeed_feed_cache_miss_total",
            Unit::Count,
            "Feed reads that found no cached list and rebuilt from the post store."
        );
        describe_counter!(
            "microfeed_feed_cache_unavailable_total",
            Unit::Count,
            "Feed reads that could not reach the feed cache."
        );
        describe_counter!(
            "microfeed_feed_cache_cas_retry_total",
            Unit::Count,
            "Feed list writes retried after a concurrent update."
        );
        describe_counter!(
            "microfeed_fanout_advisory_total",
            Unit::Count,
            "Non-fatal publish failures, labelled by kind."
        );
        describe_histogram!(
            "microfeed_fanout_followers",
            Unit::Count,
            "Feeds targeted by one publish, including the author."
        );
        describe_counter!(
            "microfeed_likes_cache_hit_total",
            Unit::Count,
            "Like counts served from the cache."
        );
        describe_counter!(
            "microfeed_likes_cache_miss_total",
            Unit::Count,
            "Like counts reloaded from the post store."
        );
        describe_histogram!(
            "microfeed_feed_rebuild_ms",
            Unit::Milliseconds,
            "Latency of rebuilding a feed from the post store."
        );
    });
}
