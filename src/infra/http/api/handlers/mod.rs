//! API handlers organized by resource type.
//!
//! Each submodule contains handlers for one resource. Conversions from
//! service errors to [`ApiError`] live here and are shared across modules.

mod feeds;
mod health;
mod posts;
mod search;
mod users;

pub use feeds::*;
pub use health::*;
pub use posts::*;
pub use search::*;
pub use users::*;

use axum::http::StatusCode;

use crate::application::fanout::PublishError;
use crate::application::feed::FeedError;
use crate::application::likes::LikesError;
use crate::application::repos::RepoError;
use crate::cache::CacheError;
use crate::domain::error::DomainError;
use crate::domain::types::PostId;

use super::error::{ApiError, codes};

fn domain_to_api(err: DomainError) -> ApiError {
    ApiError::invalid_input("request failed validation", Some(err.to_string()))
}

fn repo_to_api(err: RepoError) -> ApiError {
    match err {
        RepoError::NotFound => ApiError::not_found("resource not found"),
        RepoError::InvalidInput { message } => {
            ApiError::invalid_input("invalid input", Some(message))
        }
        RepoError::Timeout(_) => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::STORE_TIMEOUT,
            "post store timed out",
            Some(err.to_string()),
        ),
        RepoError::Persistence(message) => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::STORE_UNAVAILABLE,
            "post store unavailable",
            Some(message),
        ),
    }
}

fn publish_to_api(err: PublishError) -> ApiError {
    match err {
        PublishError::Invalid(err) => domain_to_api(err),
        PublishError::PersistenceFailed(err) => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::PERSISTENCE_FAILED,
            "post could not be persisted",
            Some(err.to_string()),
        ),
    }
}

fn feed_to_api(err: FeedError) -> ApiError {
    match err {
        FeedError::Store(err) => repo_to_api(err),
    }
}

fn likes_to_api(err: LikesError) -> ApiError {
    match err {
        LikesError::NotFound => ApiError::not_found("post not found"),
        LikesError::Store(err) => repo_to_api(err),
    }
}

fn cache_to_api(err: CacheError) -> ApiError {
    ApiError::new(
        StatusCode::SERVICE_UNAVAILABLE,
        codes::CACHE_UNAVAILABLE,
        "feed cache unavailable",
        Some(err.to_string()),
    )
}

fn parse_post_id(raw: &str) -> Result<PostId, ApiError> {
    raw.parse::<PostId>()
        .map_err(|err| ApiError::bad_request("invalid post id", Some(err.to_string())))
}
