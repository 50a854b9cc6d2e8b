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

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "esi_gateway_serve_total",
            Unit::Count,
            "Resolved requests by resource kind, serving tier and staleness."
        );
        describe_counter!(
            "esi_gateway_revalidation_lock_busy_total",
            Unit::Count,
            "Requests that found another revalidation in flight for the same key."
        );
        describe_counter!(
            "esi_gateway_upstream_requests_total",
            Unit::Count,
            "Upstream calls by response status (or `network` when no response arrived)."
        );
        describe_counter!(
            "esi_gateway_backoff_raised_total",
            Unit::Count,
            "Cooldown raises by trigger (soft, hard, throttled)."
        );
        describe_histogram!(
            "esi_gateway_backoff_wait_ms",
            Unit::Milliseconds,
            "Time upstream calls spent suspended by the shared cooldown."
        );
    });
}
