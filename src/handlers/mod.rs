pub mod admin;
pub mod availability;
pub mod enquiries;
pub mod health;

use std::sync::Arc;

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::routing::get;
use axum::Router;
use rusqlite::Connection;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::models::Actor;
use crate::state::AppState;

pub const REQUESTER_HEADER: &str = "x-requester-id";

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/availability", get(availability::get_availability))
        .route(
            "/api/enquiries",
            get(enquiries::list_enquiries).post(enquiries::create_enquiry),
        )
        .route(
            "/api/enquiries/:id",
            get(enquiries::get_enquiry).patch(enquiries::update_enquiry),
        )
        .route("/api/admin/enquiries", get(admin::list_all_enquiries))
        .with_state(state)
}

/// Map the identity supplied by the upstream auth layer onto an actor.
///
/// A bearer token must match the admin or system token; otherwise the caller is
/// the requester named in `X-Requester-Id`.
#[allow(clippy::result_large_err)]
pub(crate) fn identify(headers: &HeaderMap, config: &AppConfig) -> Result<Actor, AppError> {
    let auth = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if let Some(token) = auth.strip_prefix("Bearer ") {
        if !config.admin_token.is_empty() && token == config.admin_token {
            return Ok(Actor::Admin);
        }
        if !config.system_token.is_empty() && token == config.system_token {
            return Ok(Actor::System);
        }
        return Err(AppError::Unauthorized);
    }

    match headers
        .get(REQUESTER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
    {
        Some(id) if !id.is_empty() => Ok(Actor::Requester(id.to_string())),
        _ => Err(AppError::Unauthorized),
    }
}

/// Run store work on the blocking pool with a connection of its own.
pub(crate) async fn with_db<T, F>(state: &Arc<AppState>, f: F) -> Result<T, AppError>
where
    F: FnOnce(&mut Connection, &AppState) -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || {
        let mut conn = state.db.get()?;
        f(&mut conn, &state)
    })
    .await
    .map_err(|e| AppError::Internal(format!("store worker failed: {e}")))?
}
