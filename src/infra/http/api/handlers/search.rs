//! Search handlers

use axum::Json;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::domain_to_api;
use crate::application::repos::TimeRange;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::models::*;
use crate::infra::http::api::state::ApiState;

pub async fn search_posts(
    State(state): State<ApiState>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let results = state
        .services
        .search
        .search(query.q.as_deref().unwrap_or(""), query.limit)
        .await
        .map_err(domain_to_api)?;

    Ok(Json(results))
}

pub async fn tag_trends(
    State(state): State<ApiState>,
    Query(query): Query<TagTrendsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let range = TimeRange {
        from: parse_instant(query.from.as_deref(), "missing or invalid `from` timestamp")?,
        to: parse_instant(query.to.as_deref(), "missing or invalid `to` timestamp")?,
    };

    let trends = state
        .services
        .search
        .tag_trends(range, query.limit)
        .await
        .map_err(domain_to_api)?;

    Ok(Json(trends))
}

fn parse_instant(raw: Option<&str>, message: &'static str) -> Result<OffsetDateTime, ApiError> {
    let raw = raw.ok_or_else(|| ApiError::bad_request(message, None))?;
    OffsetDateTime::parse(raw, &Rfc3339)
        .map_err(|err| ApiError::bad_request(message, Some(err.to_string())))
}
