//! Health, liveness and readiness endpoints

use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::api::types::Json;
use serde::Serialize;

use super::state::AppState;

/// Detailed health response with component status
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<Vec<HealthCheck>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

/// Health check status
#[derive(Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Individual component health check
#[derive(Serialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

/// Simple health check - returns 200 if the service is running
/// Used for basic liveness probes
pub async fn health_check() -> impl IntoResponse {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: None,
        latency_ms: None,
    };

    (StatusCode::OK, Json(response))
}

/// Readiness check: the stores answer and the event bus has its
/// webhook dispatcher attached
pub async fn ready_check(State(state): State<AppState>) -> impl IntoResponse {
    let start = Instant::now();
    let mut checks = Vec::new();

    let workflows_started = Instant::now();
    checks.push(match state.workflows.list().await {
        Ok(workflows) if workflows.iter().any(|w| w.is_triggerable()) => {
            healthy("workflows", workflows_started)
        }
        Ok(_) => HealthCheck {
            name: "workflows".to_string(),
            status: HealthStatus::Degraded,
            message: Some("No active workflows loaded".to_string()),
            latency_ms: Some(elapsed_ms(workflows_started)),
        },
        Err(e) => unhealthy("workflows", workflows_started, e.to_string()),
    });

    let webhooks_started = Instant::now();
    checks.push(match state.webhooks.list().await {
        Ok(_) => healthy("webhooks", webhooks_started),
        Err(e) => unhealthy("webhooks", webhooks_started, e.to_string()),
    });

    let status = overall_status(&checks);
    let response = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: Some(checks),
        latency_ms: Some(elapsed_ms(start)),
    };

    let status_code = match status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(response))
}

/// Liveness check - simple check to verify the service is running
/// Used for Kubernetes liveness probes to detect crashes
pub async fn live_check() -> impl IntoResponse {
    StatusCode::OK
}

fn overall_status(checks: &[HealthCheck]) -> HealthStatus {
    if checks.iter().any(|c| c.status == HealthStatus::Unhealthy) {
        HealthStatus::Unhealthy
    } else if checks.iter().any(|c| c.status == HealthStatus::Degraded) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn healthy(name: &str, start: Instant) -> HealthCheck {
    HealthCheck {
        name: name.to_string(),
        status: HealthStatus::Healthy,
        message: None,
        latency_ms: Some(elapsed_ms(start)),
    }
}

fn unhealthy(name: &str, start: Instant, message: String) -> HealthCheck {
    HealthCheck {
        name: name.to_string(),
        status: HealthStatus::Unhealthy,
        message: Some(message),
        latency_ms: Some(elapsed_ms(start)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: HealthStatus::Healthy,
            version: "1.0.0".to_string(),
            checks: None,
            latency_ms: None,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(json.contains("\"version\":\"1.0.0\""));
        assert!(!json.contains("checks"));
    }

    #[test]
    fn test_overall_status() {
        let now = Instant::now();
        let mut checks = vec![healthy("workflows", now), healthy("webhooks", now)];
        assert!(overall_status(&checks) == HealthStatus::Healthy);

        checks[0].status = HealthStatus::Degraded;
        assert!(overall_status(&checks) == HealthStatus::Degraded);

        checks.push(unhealthy("events", now, "closed".to_string()));
        assert!(overall_status(&checks) == HealthStatus::Unhealthy);
        assert_eq!(checks[2].message.as_deref(), Some("closed"));
    }
}
