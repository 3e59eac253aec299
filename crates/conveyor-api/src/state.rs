//! Application state.

use conveyor_db::{
    PgCleanupJobRepo, PgEventSourceRepo, PgJobRepo, PgRetentionPolicyRepo, PgRunTemplateRepo,
};
use sqlx::PgPool;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub jobs: Arc<PgJobRepo>,
    pub templates: Arc<PgRunTemplateRepo>,
    pub sources: Arc<PgEventSourceRepo>,
    pub policies: Arc<PgRetentionPolicyRepo>,
    pub cleanup_jobs: Arc<PgCleanupJobRepo>,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        Self {
            jobs: Arc::new(PgJobRepo::new(pool.clone())),
            templates: Arc::new(PgRunTemplateRepo::new(pool.clone())),
            sources: Arc::new(PgEventSourceRepo::new(pool.clone())),
            policies: Arc::new(PgRetentionPolicyRepo::new(pool.clone())),
            cleanup_jobs: Arc::new(PgCleanupJobRepo::new(pool.clone())),
            pool,
        }
    }
}
