//! Observability infrastructure - Metrics

mod config;
mod metrics;

pub use config::{MetricsConfig, DEFAULT_BLOCK_DURATION_BUCKETS};
pub use metrics::{
    create_metrics_router, init_metrics, record_block_invocation, record_job_transition,
    record_webhook_delivery, PrometheusMetrics,
};
