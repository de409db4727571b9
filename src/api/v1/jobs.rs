//! Trigger API and job status endpoints

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::domain::{FailureKind, Job, JobId, JobStatus, RequestId, WorkflowId};

/// Body of `POST /v1/jobs`
#[derive(Debug, Deserialize)]
pub struct TriggerJobRequest {
    pub request_id: String,
    pub workflow_id: String,
    /// Block name -> instruction, overriding instructions stored on the request
    #[serde(default)]
    pub custom_instructions: HashMap<String, String>,
}

/// Returned when a job is accepted
#[derive(Debug, Serialize)]
pub struct JobAcceptedResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub attempt: u32,
}

impl From<&Job> for JobAcceptedResponse {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id().to_string(),
            status: job.status(),
            attempt: job.attempt(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: String,
    pub request_id: String,
    pub workflow_id: String,
    pub status: JobStatus,
    pub attempt: u32,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_block: Option<String>,
    pub blocks_completed: usize,
    pub cancel_requested: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_version: Option<u32>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id().to_string(),
            request_id: job.request_id().to_string(),
            workflow_id: job.workflow_id().to_string(),
            status: job.status(),
            attempt: job.attempt(),
            retry_count: job.retry_count(),
            previous_job_id: job.previous_job_id().map(ToString::to_string),
            current_block: job.current_block().map(str::to_string),
            blocks_completed: job.blocks_completed(),
            cancel_requested: job.cancel_requested(),
            failure_kind: job.failure_kind(),
            error: job.error().map(str::to_string),
            output_version: job.output_version(),
            created_at: job.created_at(),
            started_at: job.started_at(),
            completed_at: job.completed_at(),
        }
    }
}

fn parse_job_id(raw: &str) -> Result<JobId, ApiError> {
    JobId::new(raw).map_err(|e| ApiError::from(e).with_param("job_id"))
}

/// Trigger a workflow for a request
pub async fn trigger_job(
    State(state): State<AppState>,
    Json(req): Json<TriggerJobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = RequestId::new(req.request_id.as_str())
        .map_err(|e| ApiError::from(e).with_param("request_id"))?;
    let workflow_id = WorkflowId::new(req.workflow_id.as_str())
        .map_err(|e| ApiError::bad_request(e.to_string()).with_param("workflow_id"))?;

    let job = state
        .lifecycle
        .trigger(request_id, workflow_id, req.custom_instructions)
        .await?;

    info!(job_id = %job.id(), request_id = %job.request_id(), workflow_id = %job.workflow_id(), "Job accepted");
    Ok((StatusCode::ACCEPTED, Json(JobAcceptedResponse::from(&job))))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.lifecycle.get(&parse_job_id(&job_id)?).await?;
    Ok(Json(JobResponse::from(job)))
}

/// Cancel a pending or running job
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.lifecycle.cancel(&parse_job_id(&job_id)?).await?;
    Ok((StatusCode::ACCEPTED, Json(JobResponse::from(job))))
}

/// Resubmit a failed job
pub async fn retry_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.lifecycle.retry(&parse_job_id(&job_id)?).await?;
    info!(job_id = %job.id(), previous_job_id = %job_id, attempt = job.attempt(), "Job resubmitted by caller");
    Ok((StatusCode::ACCEPTED, Json(JobAcceptedResponse::from(&job))))
}
