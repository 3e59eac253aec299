//! Route definitions.

pub mod health;
pub mod jobs;
pub mod retention;
pub mod sources;

use axum::Router;

use crate::AppState;

/// Build the full API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .nest("/jobs", jobs::router())
        .nest("/retention", retention::router())
        .nest("/sources", sources::router())
        .with_state(state)
}
