use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use super::health;
use super::state::AppState;
use super::v1;
use crate::infrastructure::observability::{create_metrics_router, PrometheusMetrics};

/// Create the full router with application state. The metrics endpoint is
/// mounted when a recorder was installed.
pub fn create_router(state: AppState, metrics: Option<(PrometheusMetrics, &str)>) -> Router {
    let router = Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .route("/live", get(health::live_check))
        .nest("/v1", v1::create_v1_router())
        .with_state(state);

    let router = match metrics {
        Some((metrics, path)) => router.merge(create_metrics_router(metrics, path)),
        None => router,
    };

    router.layer(TraceLayer::new_for_http())
}
