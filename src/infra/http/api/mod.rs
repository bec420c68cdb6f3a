pub mod error;
pub mod handlers;
pub mod models;
pub mod state;

pub use state::ApiState;

use axum::{
    Router,
    routing::{get, post, put},
};

pub fn build_api_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/posts", post(handlers::create_post))
        .route("/api/v1/posts/{id}", get(handlers::get_post))
        .route(
            "/api/v1/posts/{id}/likes",
            get(handlers::get_like_count).post(handlers::like_post),
        )
        .route("/api/v1/users/{id}/posts", get(handlers::list_user_posts))
        .route(
            "/api/v1/users/{id}/followers/{follower}",
            put(handlers::follow_user).delete(handlers::unfollow_user),
        )
        .route(
            "/api/v1/feeds/{user_id}",
            get(handlers::get_feed).delete(handlers::reset_feed),
        )
        .route("/api/v1/search", get(handlers::search_posts))
        .route("/api/v1/search/tags", get(handlers::tag_trends))
        .route("/api/v1/stats", get(handlers::stats))
        .route("/health", get(handlers::health))
        .with_state(state)
}
