//! Request registration, output history and event stream endpoints

use std::collections::HashMap;
use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::jobs::JobResponse;
use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::domain::{EngineEvent, OutputRecord, ProcessingRequest, RequestId};

/// Body of `PUT /v1/requests/{request_id}`
#[derive(Debug, Deserialize)]
pub struct PutRequestBody {
    pub text: String,
    /// Block name -> instruction; replaces the active instruction per block
    #[serde(default)]
    pub custom_instructions: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct OutputsListResponse {
    pub request_id: String,
    pub outputs: Vec<OutputRecord>,
}

#[derive(Debug, Serialize)]
pub struct JobsListResponse {
    pub request_id: String,
    pub jobs: Vec<JobResponse>,
}

async fn load_request(state: &AppState, raw: &str) -> Result<ProcessingRequest, ApiError> {
    let id = RequestId::new(raw).map_err(|e| ApiError::from(e).with_param("request_id"))?;
    state
        .requests
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Request not found: {}", id)))
}

/// Register a request or replace its text
pub async fn put_request(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    Json(body): Json<PutRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let id = RequestId::new(request_id.as_str())
        .map_err(|e| ApiError::from(e).with_param("request_id"))?;

    let (mut request, status) = match state.requests.get(&id).await? {
        Some(mut existing) => {
            existing.set_text(body.text);
            (existing, StatusCode::OK)
        }
        None => (ProcessingRequest::new(id, body.text), StatusCode::CREATED),
    };

    for (block, text) in body.custom_instructions {
        request.set_instruction(block, text);
    }

    let saved = state.requests.save(request).await?;
    Ok((status, Json(saved)))
}

pub async fn get_request(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(load_request(&state, &request_id).await?))
}

/// Every job run for a request, oldest first
pub async fn list_jobs(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let request = load_request(&state, &request_id).await?;
    let jobs = state.lifecycle.list_for_request(request.id()).await?;

    Ok(Json(JobsListResponse {
        request_id: request.id().to_string(),
        jobs: jobs.into_iter().map(JobResponse::from).collect(),
    }))
}

/// All output versions, oldest first
pub async fn list_outputs(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let request = load_request(&state, &request_id).await?;
    let outputs = state.outputs.list_for_request(request.id()).await?;

    Ok(Json(OutputsListResponse {
        request_id: request.id().to_string(),
        outputs,
    }))
}

pub async fn latest_output(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let request = load_request(&state, &request_id).await?;
    let latest = state
        .outputs
        .latest(request.id())
        .await?
        .ok_or_else(|| ApiError::not_found(format!("No output for request {}", request.id())))?;

    Ok(Json(latest))
}

/// Live lifecycle events for one request as server-sent events.
///
/// Only events published after the client connects are sent.
pub async fn stream_events(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let request = load_request(&state, &request_id).await?;
    debug!(request_id = %request.id(), "Event stream opened");

    let stream = state
        .events
        .stream_for(request.id().as_str().to_string())
        .map(|event| Ok(to_sse_event(&event)));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn to_sse_event(event: &EngineEvent) -> Event {
    match Event::default()
        .event(event.event_type.as_str())
        .id(event.id.as_str())
        .json_data(event)
    {
        Ok(sse) => sse,
        Err(e) => {
            warn!(event_id = %event.id, error = %e, "Failed to encode event");
            Event::default().event("error").data(e.to_string())
        }
    }
}
