//! Resolves the acting user from the `x-user-id` header.
//!
//! There is no authentication here: the header is trusted and only checked
//! against the user table.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use super::routes::AppState;
use crate::access::Actor;

pub const USER_HEADER: &str = "x-user-id";

/// Extractor for the user performing the request.
pub struct CurrentActor(pub Actor);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentActor {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .unwrap_or("");
        if raw.is_empty() {
            return Err((StatusCode::UNAUTHORIZED, format!("Missing {} header", USER_HEADER)).into_response());
        }
        let id = Uuid::parse_str(raw).map_err(|_| {
            (StatusCode::UNAUTHORIZED, format!("Invalid {} header", USER_HEADER)).into_response()
        })?;
        match state.store.find_user(id).await {
            Ok(Some(user)) => Ok(CurrentActor(Actor::new(user))),
            Ok(None) => Err((StatusCode::UNAUTHORIZED, "Unknown user".to_string()).into_response()),
            Err(e) => Err(e.into_response()),
        }
    }
}
