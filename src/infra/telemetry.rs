use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::taxonomy::{METRIC_CASCADE_BATCH_SIZE, METRIC_CASCADE_DISPATCH};
use crate::cache::{
    METRIC_OPTION_CACHE_HIT, METRIC_OPTION_CACHE_INVALIDATE, METRIC_OPTION_CACHE_MISS,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
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
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
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
            METRIC_OPTION_CACHE_HIT,
            Unit::Count,
            "Option reads served from the in-memory cache."
        );
        describe_counter!(
            METRIC_OPTION_CACHE_MISS,
            Unit::Count,
            "Option reads that went to the store."
        );
        describe_counter!(
            METRIC_OPTION_CACHE_INVALIDATE,
            Unit::Count,
            "Option cache entries removed by writes."
        );
        describe_counter!(
            METRIC_CASCADE_DISPATCH,
            Unit::Count,
            "Batched children lookups sent to the store."
        );
        describe_histogram!(
            METRIC_CASCADE_BATCH_SIZE,
            Unit::Count,
            "Distinct parent ids per batched children lookup."
        );
    });
}
