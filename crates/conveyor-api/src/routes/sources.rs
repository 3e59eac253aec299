//! Event source visibility endpoints.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use conveyor_core::source::EventSource;
use conveyor_db::EventSourceRepo;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_sources))
}

#[derive(Debug, Serialize)]
struct SourceResponse {
    id: String,
    name: String,
    adapter_type: String,
    driver: String,
    enabled: bool,
    last_processed_id: i64,
}

impl From<EventSource> for SourceResponse {
    fn from(source: EventSource) -> Self {
        Self {
            id: source.id.to_string(),
            name: source.name,
            adapter_type: source.adapter_type,
            driver: source.connection.driver.as_str().to_string(),
            enabled: source.enabled,
            last_processed_id: source.last_processed_id,
        }
    }
}

async fn list_sources(
    State(state): State<AppState>,
) -> Result<Json<Vec<SourceResponse>>, ApiError> {
    let sources = state.sources.list().await?;
    Ok(Json(sources.into_iter().map(Into::into).collect()))
}
