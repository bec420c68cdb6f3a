//! User-scoped handlers: authored posts and follower edges.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;

use crate::domain::types::UserId;

use super::repo_to_api;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::models::*;
use crate::infra::http::api::state::ApiState;

pub async fn list_user_posts(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let posts = state
        .services
        .posts
        .posts_by_author(&UserId::new(user_id), query.limit)
        .await
        .map_err(repo_to_api)?;

    Ok(Json(posts))
}

pub async fn follow_user(
    State(state): State<ApiState>,
    Path((user_id, follower)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let (followee, follower) = edge(user_id, follower)?;
    let changed = state.services.followers.follow(&followee, &follower);
    Ok(Json(FollowResponse { changed }))
}

pub async fn unfollow_user(
    State(state): State<ApiState>,
    Path((user_id, follower)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let (followee, follower) = edge(user_id, follower)?;
    let changed = state.services.followers.unfollow(&followee, &follower);
    Ok(Json(FollowResponse { changed }))
}

fn edge(followee: String, follower: String) -> Result<(UserId, UserId), ApiError> {
    if followee == follower {
        return Err(ApiError::invalid_input(
            "a user cannot follow themselves",
            None,
        ));
    }
    Ok((UserId::new(followee), UserId::new(follower)))
}
