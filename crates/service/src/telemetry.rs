//! Logging and metrics setup.

use std::sync::OnceLock;

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{Config, LogFormat};
use crate::error::StartupError;

static PROMETHEUS: OnceLock<Result<PrometheusHandle, String>> = OnceLock::new();

/// Installs the global tracing subscriber.
///
/// The filter comes from `RUST_LOG`; an invalid directive falls back to
/// `info`.
pub fn init_tracing(config: &Config) -> Result<(), StartupError> {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    }
    .map_err(|e| StartupError::Telemetry(e.to_string()))
}

/// Installs the Prometheus recorder and describes the service metrics.
///
/// Safe to call more than once; later calls return the same handle.
pub fn init_metrics() -> Result<PrometheusHandle, StartupError> {
    PROMETHEUS
        .get_or_init(install_recorder)
        .clone()
        .map_err(StartupError::Telemetry)
}

fn install_recorder() -> Result<PrometheusHandle, String> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("failed to install prometheus recorder: {e}"))?;

    describe_counter!("reservations_total", "Reservation sagas started");
    describe_counter!("reservations_succeeded", "Reservations that reserved every line");
    describe_counter!(
        "reservations_failed",
        "Reservations that reserved nothing, by reason_kind"
    );
    describe_counter!(
        "reservation_conflicts_total",
        "Saves retried after a concurrent stock update"
    );
    describe_histogram!(
        "reservation_duration_seconds",
        "Time from request to outcome event"
    );
    describe_counter!(
        "messages_consumed_total",
        "Deliveries settled by the consumer, by disposition"
    );
    describe_counter!("events_published_total", "Events confirmed by the broker");
    describe_counter!(
        "event_publish_failures_total",
        "Events not confirmed within the publish deadline"
    );
    describe_counter!("stock_batches_saved_total", "Stock batches committed to PostgreSQL");

    tracing::info!("prometheus metrics recorder installed");
    Ok(handle)
}
