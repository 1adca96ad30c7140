//! Tracing and metrics initialization

use anyhow::Result;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

// Target prefixes also cover the moderator_* library crates
const DEFAULT_FILTER: &str = "moderator=info";
const VERBOSE_FILTER: &str = "moderator=debug,tower_http=debug";

/// Initialize tracing/logging
pub fn init_tracing(verbose: bool, logging: &LoggingConfig) {
    let filter = if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(logging.filter.as_deref().unwrap_or(DEFAULT_FILTER))
        })
    };

    let registry = tracing_subscriber::registry().with(filter);

    match logging.format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .init(),
    }
}

/// Initialize metrics exporter and return handle for rendering
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "moderator_requests_total",
        "Total number of moderation requests processed"
    );
    metrics::describe_counter!(
        "moderator_inputs_total",
        "Total number of texts scored"
    );
    metrics::describe_histogram!(
        "moderator_inference_latency_us",
        metrics::Unit::Microseconds,
        "Tokenization plus forward-pass latency in microseconds"
    );
    metrics::describe_counter!("moderator_errors_total", "Total number of errors by kind");

    info!("Metrics exporter initialized");
    Ok(handle)
}

/// Handle for a recorder that is not installed globally, for tests and embedding
pub fn detached_metrics_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}
