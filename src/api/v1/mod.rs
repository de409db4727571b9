//! Versioned HTTP endpoints

pub mod jobs;
pub mod requests;
pub mod webhooks;

use axum::{
    routing::{get, post},
    Router,
};

use super::state::AppState;

/// Create v1 API router
pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route("/jobs", post(jobs::trigger_job))
        .route("/jobs/{job_id}", get(jobs::get_job))
        .route("/jobs/{job_id}/cancel", post(jobs::cancel_job))
        .route("/jobs/{job_id}/retry", post(jobs::retry_job))
        .route(
            "/requests/{request_id}",
            get(requests::get_request).put(requests::put_request),
        )
        .route("/requests/{request_id}/jobs", get(requests::list_jobs))
        .route("/requests/{request_id}/outputs", get(requests::list_outputs))
        .route(
            "/requests/{request_id}/outputs/latest",
            get(requests::latest_output),
        )
        .route("/requests/{request_id}/events", get(requests::stream_events))
        .route(
            "/webhooks",
            get(webhooks::list_webhooks).post(webhooks::create_webhook),
        )
        .route(
            "/webhooks/{webhook_id}",
            get(webhooks::get_webhook).delete(webhooks::delete_webhook),
        )
        .route(
            "/webhooks/{webhook_id}/deliveries",
            get(webhooks::get_deliveries),
        )
}
