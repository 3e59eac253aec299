//! Retention report endpoints, consumed by the reporting/CLI layer.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use conveyor_core::CleanupJobId;
use conveyor_core::retention::{CleanupJob, RecordError, RetentionPolicy};
use conveyor_db::{CleanupJobRepo, RetentionPolicyRepo};

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/policies", get(list_policies))
        .route("/jobs", get(list_jobs))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/cancel", post(cancel_job))
}

#[derive(Debug, Serialize)]
struct PolicyResponse {
    id: String,
    policy_name: String,
    data_type: String,
    table_name: String,
    retention_period_days: i32,
    grace_period_days: i32,
    deletion_action: String,
    enabled: bool,
}

impl From<RetentionPolicy> for PolicyResponse {
    fn from(policy: RetentionPolicy) -> Self {
        Self {
            id: policy.id.to_string(),
            policy_name: policy.policy_name,
            data_type: policy.data_type,
            table_name: policy.table_name,
            retention_period_days: policy.retention_period_days,
            grace_period_days: policy.grace_period_days,
            deletion_action: policy.action.as_str().to_string(),
            enabled: policy.enabled,
        }
    }
}

async fn list_policies(
    State(state): State<AppState>,
) -> Result<Json<Vec<PolicyResponse>>, ApiError> {
    let policies = state.policies.list().await?;
    Ok(Json(policies.into_iter().map(Into::into).collect()))
}

#[derive(Debug, Serialize)]
struct CleanupJobResponse {
    id: String,
    policy_id: String,
    job_type: String,
    status: String,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    records_processed: i64,
    records_deleted: i64,
    records_anonymized: i64,
    records_archived: i64,
    errors: Vec<RecordError>,
    summary: Option<String>,
}

impl From<CleanupJob> for CleanupJobResponse {
    fn from(job: CleanupJob) -> Self {
        Self {
            id: job.id.to_string(),
            policy_id: job.policy_id.to_string(),
            job_type: job.job_type.as_str().to_string(),
            status: job.status.as_str().to_string(),
            started_at: job.started_at,
            completed_at: job.completed_at,
            records_processed: job.counts.processed,
            records_deleted: job.counts.deleted,
            records_anonymized: job.counts.anonymized,
            records_archived: job.counts.archived,
            errors: job.errors,
            summary: job.summary,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListJobsQuery {
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    20
}

async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<Vec<CleanupJobResponse>>, ApiError> {
    let jobs = state.cleanup_jobs.list_recent(query.limit).await?;
    Ok(Json(jobs.into_iter().map(Into::into).collect()))
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CleanupJobResponse>, ApiError> {
    let job = state.cleanup_jobs.get(CleanupJobId::from_uuid(id)).await?;
    Ok(Json(job.into()))
}

async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CleanupJobResponse>, ApiError> {
    let id = CleanupJobId::from_uuid(id);
    state.cleanup_jobs.request_cancel(id).await?;
    let job = state.cleanup_jobs.get(id).await?;
    Ok(Json(job.into()))
}
