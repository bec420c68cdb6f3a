//! Feed handlers

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;

use crate::domain::types::UserId;

use super::{cache_to_api, feed_to_api};
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::models::*;
use crate::infra::http::api::state::ApiState;

pub async fn get_feed(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
    Query(query): Query<FeedQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = UserId::new(user_id);
    let page = state
        .services
        .feeds
        .get_feed(&user_id, query.use_cache.unwrap_or(true))
        .await
        .map_err(feed_to_api)?;

    Ok(Json(FeedResponse::new(user_id, page)))
}

pub async fn reset_feed(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = state
        .services
        .feeds
        .reset(&UserId::new(user_id))
        .await
        .map_err(cache_to_api)?;

    Ok(Json(FeedResetResponse { removed }))
}
