use axum::{
    Json,
    extract::{FromRequestParts, Path, Query, State},
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use esi_gateway_api_types::{ApiSuccess, CharacterView, SearchHit};
use serde::Deserialize;

use crate::application::error::{AppError, ErrorReport};

use super::state::ApiState;

/// Caller token from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

impl<S: Send + Sync> FromRequestParts<S> for BearerToken {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        extract_token(parts.headers.get(AUTHORIZATION))
            .map(BearerToken)
            .ok_or_else(|| AppError::unauthorized("Missing Bearer token"))
    }
}

fn extract_token(header: Option<&axum::http::HeaderValue>) -> Option<String> {
    let raw = header?.to_str().ok()?;
    let bearer = raw.strip_prefix("Bearer ")?.trim();
    if bearer.is_empty() {
        return None;
    }
    Some(bearer.to_string())
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub strict: Option<String>,
}

impl SearchQuery {
    fn strict(&self) -> bool {
        matches!(
            self.strict.as_deref().map(str::trim),
            Some("true" | "1" | "yes")
        )
    }
}

pub async fn get_character(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<ApiSuccess<CharacterView>>, AppError> {
    let served = state.characters.get(&id).await?;
    Ok(Json(served.into_envelope()))
}

pub async fn search_characters(
    State(state): State<ApiState>,
    BearerToken(token): BearerToken,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ApiSuccess<Vec<SearchHit>>>, AppError> {
    let strict = query.strict();
    let text = query.query.unwrap_or_default();
    let hits = state.search.characters(&token, &text, strict).await?;
    Ok(Json(ApiSuccess::new(hits)))
}

pub async fn health(State(state): State<ApiState>) -> Response {
    let (db, cache) = tokio::join!(state.db.health_check(), state.cache.ping());
    let report = match (db, cache) {
        (Ok(()), Ok(())) => return StatusCode::NO_CONTENT.into_response(),
        (Err(err), _) => ErrorReport::from_error(
            "infra::http::health::database",
            StatusCode::SERVICE_UNAVAILABLE,
            &err,
        ),
        (_, Err(err)) => ErrorReport::from_error(
            "infra::http::health::fast_cache",
            StatusCode::SERVICE_UNAVAILABLE,
            &err,
        ),
    };
    let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
    report.attach(&mut response);
    response
}

pub async fn route_not_found() -> AppError {
    AppError::not_found("Route not found")
}
