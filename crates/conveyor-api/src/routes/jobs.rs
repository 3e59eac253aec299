//! Job creation and lifecycle endpoints.
//!
//! The creation endpoint is the same door for everyone: external schedulers
//! and the event dispatcher create jobs with identical semantics.

use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use conveyor_core::job::{Job, Launcher, NewJob};
use conveyor_core::{JobId, TemplateId, UserId};
use conveyor_db::{JobRepo, RunTemplateRepo};

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_jobs).post(create_job))
        .route("/{id}", get(get_job))
        .route("/{id}/begin", post(begin_job))
        .route("/{id}/complete", post(complete_job))
}

#[derive(Debug, Deserialize)]
struct CreateJobRequest {
    runtemplate_id: Uuid,
    #[serde(default)]
    env: BTreeMap<String, String>,
    /// User on whose behalf the job runs; omitted means a scheduler run.
    launched_by: Option<Uuid>,
}

#[derive(Debug, Serialize)]
struct JobResponse {
    id: String,
    app_id: String,
    company_id: String,
    runtemplate_id: String,
    status: String,
    launcher: Launcher,
    begin_at: DateTime<Utc>,
    end_at: Option<DateTime<Utc>>,
    exitcode: Option<i32>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id.to_string(),
            app_id: job.app_id.to_string(),
            company_id: job.company_id.to_string(),
            runtemplate_id: job.runtemplate_id.to_string(),
            status: job.status.as_str().to_string(),
            launcher: job.launcher,
            begin_at: job.begin_at,
            end_at: job.end_at,
            exitcode: job.exitcode,
        }
    }
}

async fn create_job(
    State(state): State<AppState>,
    Json(req): Json<CreateJobRequest>,
) -> Result<Json<JobResponse>, ApiError> {
    let template = state
        .templates
        .get(TemplateId::from_uuid(req.runtemplate_id))
        .await?;
    if !template.enabled {
        return Err(ApiError::Conflict(format!(
            "run template {} is disabled",
            template.id
        )));
    }

    let launcher = match req.launched_by {
        Some(user_id) => Launcher::User {
            user_id: UserId::from_uuid(user_id),
        },
        None => Launcher::Scheduler,
    };
    let job = state
        .jobs
        .create(NewJob {
            app_id: template.app_id,
            company_id: template.company_id,
            runtemplate_id: template.id,
            env: req.env,
            launcher,
        })
        .await?;
    Ok(Json(job.into()))
}

async fn list_jobs(State(state): State<AppState>) -> Result<Json<Vec<JobResponse>>, ApiError> {
    let jobs = state.jobs.list_recent(50).await?;
    Ok(Json(jobs.into_iter().map(Into::into).collect()))
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobResponse>, ApiError> {
    let job = state.jobs.get(JobId::from_uuid(id)).await?;
    Ok(Json(job.into()))
}

async fn begin_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobResponse>, ApiError> {
    let job = state.jobs.begin(JobId::from_uuid(id)).await?;
    Ok(Json(job.into()))
}

#[derive(Debug, Deserialize)]
struct CompleteJobRequest {
    exitcode: i32,
}

#[derive(Debug, Serialize)]
struct CompleteJobResponse {
    job: JobResponse,
    severity: String,
    success: bool,
    /// Whether the app's exit-code table marks this code retryable; acting
    /// on it is the external scheduler's call.
    retry: bool,
}

async fn complete_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CompleteJobRequest>,
) -> Result<Json<CompleteJobResponse>, ApiError> {
    let completed = state
        .jobs
        .complete(JobId::from_uuid(id), req.exitcode)
        .await?;
    Ok(Json(CompleteJobResponse {
        job: completed.job.into(),
        severity: completed.outcome.severity.as_str().to_string(),
        success: completed.outcome.success,
        retry: completed.outcome.retry,
    }))
}
