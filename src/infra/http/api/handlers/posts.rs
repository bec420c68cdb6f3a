//! Posts handlers

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::domain::posts::PostDraft;
use crate::domain::types::UserId;

use super::{likes_to_api, parse_post_id, publish_to_api, repo_to_api};
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::models::*;
use crate::infra::http::api::state::ApiState;

pub async fn create_post(
    State(state): State<ApiState>,
    Json(payload): Json<PostCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let draft = PostDraft::new(payload.author_id, payload.text, payload.tags);
    let outcome = state
        .services
        .fanout
        .publish(draft)
        .await
        .map_err(publish_to_api)?;

    Ok((StatusCode::CREATED, Json(PostCreateResponse::from(outcome))))
}

pub async fn get_post(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_post_id(&id)?;
    let post = state
        .services
        .posts
        .get_post(id)
        .await
        .map_err(repo_to_api)?;

    match post {
        Some(post) => Ok(Json(post)),
        None => Err(ApiError::not_found("post not found")),
    }
}

pub async fn like_post(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(payload): Json<LikeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let post_id = parse_post_id(&id)?;
    let user_id = UserId::new(payload.user_id.trim());
    if user_id.as_str().is_empty() {
        return Err(ApiError::invalid_input(
            "userId must not be empty",
            None,
        ));
    }

    let like_count = state
        .services
        .likes
        .record_like(post_id, &user_id)
        .await
        .map_err(likes_to_api)?;

    Ok(Json(LikeCountResponse {
        post_id,
        like_count,
    }))
}

pub async fn get_like_count(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let post_id = parse_post_id(&id)?;
    let like_count = state
        .services
        .likes
        .get_count(post_id)
        .await
        .map_err(likes_to_api)?;

    Ok(Json(LikeCountResponse {
        post_id,
        like_count,
    }))
}
