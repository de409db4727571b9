//! Webhook subscription endpoints

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::domain::webhook::{DeliveryStatus, Webhook, WebhookDelivery, WebhookStatus};
use crate::domain::EventType;

/// Request to create a webhook
#[derive(Debug, Deserialize)]
pub struct CreateWebhookRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub url: String,
    #[serde(default)]
    pub secret: Option<String>,
    pub events: Vec<EventType>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Total attempts per event
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_timeout_ms() -> u64 {
    10_000
}

/// Webhook as returned by the API; the secret is never echoed back
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub url: String,
    pub has_secret: bool,
    pub events: Vec<EventType>,
    pub headers: HashMap<String, String>,
    pub status: WebhookStatus,
    pub failure_count: u32,
    pub retry_count: u32,
    pub retry_delay_ms: u64,
    pub timeout_ms: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_at: Option<DateTime<Utc>>,
}

impl From<Webhook> for WebhookResponse {
    fn from(w: Webhook) -> Self {
        Self {
            id: w.id.to_string(),
            name: w.name,
            description: w.description,
            url: w.url,
            has_secret: w.secret.is_some(),
            events: w.events,
            headers: w.headers,
            status: w.status,
            failure_count: w.failure_count,
            retry_count: w.retry_count,
            retry_delay_ms: w.retry_delay_ms,
            timeout_ms: w.timeout_ms,
            created_at: w.created_at,
            updated_at: w.updated_at,
            last_success_at: w.last_success_at,
            last_failure_at: w.last_failure_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WebhooksListResponse {
    pub webhooks: Vec<WebhookResponse>,
}

#[derive(Debug, Serialize)]
pub struct WebhookDeliveryResponse {
    pub id: String,
    pub webhook_id: String,
    pub event_id: String,
    pub event_type: EventType,
    pub status: DeliveryStatus,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<WebhookDelivery> for WebhookDeliveryResponse {
    fn from(d: WebhookDelivery) -> Self {
        Self {
            id: d.id.to_string(),
            webhook_id: d.webhook_id.to_string(),
            event_id: d.event_id,
            event_type: d.event_type,
            status: d.status,
            attempts: d.attempts,
            response_status: d.response_status,
            response_body: d.response_body,
            error_message: d.error_message,
            created_at: d.created_at,
            last_attempt_at: d.last_attempt_at,
            completed_at: d.completed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeliveriesListResponse {
    pub deliveries: Vec<WebhookDeliveryResponse>,
}

#[derive(Debug, Deserialize)]
pub struct DeliveriesQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

pub async fn list_webhooks(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let webhooks = state.webhooks.list().await?;

    Ok(Json(WebhooksListResponse {
        webhooks: webhooks.into_iter().map(WebhookResponse::from).collect(),
    }))
}

pub async fn get_webhook(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let webhook = state.webhooks.get(&id).await?;
    Ok(Json(WebhookResponse::from(webhook)))
}

/// Subscribe an endpoint to lifecycle events
pub async fn create_webhook(
    State(state): State<AppState>,
    Json(req): Json<CreateWebhookRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = req
        .id
        .unwrap_or_else(|| format!("wh-{}", uuid::Uuid::new_v4()));

    let mut webhook = Webhook::new(id, req.name, req.url)
        .with_events(req.events)
        .with_retry_config(req.retry_count, req.retry_delay_ms)
        .with_timeout_ms(req.timeout_ms);

    if let Some(description) = req.description {
        webhook = webhook.with_description(description);
    }
    if let Some(secret) = req.secret {
        webhook = webhook.with_secret(secret);
    }
    for (key, value) in req.headers {
        webhook = webhook.with_header(key, value);
    }

    let created = state.webhooks.create(webhook).await?;
    Ok((StatusCode::CREATED, Json(WebhookResponse::from(created))))
}

pub async fn delete_webhook(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.webhooks.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delivery history for a webhook, newest first
pub async fn get_deliveries(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DeliveriesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let deliveries = state
        .webhooks
        .get_deliveries(&id, query.limit, query.offset)
        .await?;

    Ok(Json(DeliveriesListResponse {
        deliveries: deliveries
            .into_iter()
            .map(WebhookDeliveryResponse::from)
            .collect(),
    }))
}
