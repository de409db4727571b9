//! Prometheus metrics infrastructure
//!
//! Recording goes through the `metrics` facade, so every helper here is a
//! no-op until `init_metrics` installs the Prometheus recorder.

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, response::IntoResponse, routing::get, Router};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use super::config::MetricsConfig;
use crate::domain::webhook::DeliveryStatus;
use crate::domain::JobStatus;

const BLOCK_DURATION_METRIC: &str = "engine_block_duration_seconds";

/// Prometheus metrics handle for serving metrics endpoint
#[derive(Clone)]
pub struct PrometheusMetrics {
    handle: Arc<PrometheusHandle>,
}

impl PrometheusMetrics {
    /// Get the metrics as a string for the /metrics endpoint
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Install the Prometheus recorder; `None` when disabled or already installed
pub fn init_metrics(config: &MetricsConfig) -> Option<PrometheusMetrics> {
    if !config.enabled {
        tracing::info!("Prometheus metrics disabled");
        return None;
    }

    let builder = match PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full(BLOCK_DURATION_METRIC.to_string()),
        &config.block_duration_buckets,
    ) {
        Ok(builder) => builder,
        Err(e) => {
            tracing::error!(error = %e, "Invalid block duration buckets");
            return None;
        }
    };

    match builder.install_recorder() {
        Ok(handle) => {
            gauge!("engine_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
            tracing::info!(path = %config.path, "Prometheus metrics initialized");

            Some(PrometheusMetrics {
                handle: Arc::new(handle),
            })
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            None
        }
    }
}

/// Create the metrics router
pub fn create_metrics_router(metrics: PrometheusMetrics, path: &str) -> Router {
    Router::new()
        .route(path, get(metrics_handler))
        .with_state(metrics)
}

async fn metrics_handler(State(metrics): State<PrometheusMetrics>) -> impl IntoResponse {
    metrics.render()
}

/// Record one block's LLM invocation
pub fn record_block_invocation(
    model: &str,
    success: bool,
    duration: Duration,
    tokens: Option<u64>,
) {
    let labels = [
        ("model", model.to_string()),
        ("status", if success { "success" } else { "error" }.to_string()),
    ];

    counter!("engine_block_invocations_total", &labels).increment(1);
    histogram!(BLOCK_DURATION_METRIC, &labels).record(duration.as_secs_f64());

    if let Some(tokens) = tokens {
        counter!("engine_llm_tokens_total", "model" => model.to_string()).increment(tokens);
    }
}

/// Record a job entering `status`
pub fn record_job_transition(status: JobStatus) {
    counter!("engine_job_transitions_total", "status" => status.as_str()).increment(1);
}

/// Record a webhook delivery reaching a terminal status
pub fn record_webhook_delivery(status: DeliveryStatus) {
    counter!("engine_webhook_deliveries_total", "status" => status.as_str()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_block_invocation("gpt-4o-mini", true, Duration::from_millis(12), Some(30));
        record_job_transition(JobStatus::Running);
        record_webhook_delivery(DeliveryStatus::Success);
    }

    #[test]
    fn test_empty_buckets_are_rejected() {
        let config = MetricsConfig {
            block_duration_buckets: Vec::new(),
            ..Default::default()
        };
        assert!(init_metrics(&config).is_none());
    }

    #[test]
    fn test_disabled_metrics() {
        let config = MetricsConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(init_metrics(&config).is_none());
    }
}
