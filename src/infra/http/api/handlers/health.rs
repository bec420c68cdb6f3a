use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use super::repo_to_api;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::models::StatsResponse;
use crate::infra::http::api::state::ApiState;

/// Always 200 while the process serves requests; the body says what is degraded.
pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let report = state.services.health().await;
    (StatusCode::OK, Json(report))
}

/// Post and author totals from the authoritative store.
pub async fn stats(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let stats = state.services.posts.stats().await.map_err(repo_to_api)?;
    Ok(Json(StatsResponse {
        posts: stats.posts,
        authors: stats.authors,
        generated_at: time::OffsetDateTime::now_utc(),
    }))
}
