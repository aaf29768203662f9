//! Caller identity middleware.
//!
//! The upstream authentication proxy sets `X-Actor-Id` and `X-Actor-Role`.
//! Both must be present and the role must be known, otherwise 401.
//! On success an `ActorContext` is injected for handlers.

use std::str::FromStr;

use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::ActorContext;
use crate::authorization::Actor;
use crate::models::enums::Role;

pub const ACTOR_ID_HEADER: &str = "X-Actor-Id";
pub const ACTOR_ROLE_HEADER: &str = "X-Actor-Role";

pub async fn require_actor(mut req: Request<axum::body::Body>, next: Next) -> Response {
    let actor = match actor_from_headers(req.headers()) {
        Ok(actor) => actor,
        Err(err) => return err.into_response(),
    };
    req.extensions_mut().insert(ActorContext(actor));
    next.run(req).await
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ApiError> {
    let id = header(headers, ACTOR_ID_HEADER).ok_or(ApiError::Unauthorized)?;
    let role = header(headers, ACTOR_ROLE_HEADER)
        .map(|r| r.to_ascii_lowercase())
        .ok_or(ApiError::Unauthorized)?;
    let role = Role::from_str(&role).map_err(|_| {
        tracing::warn!(actor_id = id, role, "Unknown actor role");
        ApiError::Unauthorized
    })?;
    Ok(Actor::new(id, role))
}
