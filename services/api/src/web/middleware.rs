//! services/api/src/web/middleware.rs
//!
//! Admin gate for the moderation routes.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use memoria_core::AuthError;
use std::sync::Arc;
use tracing::warn;

use crate::error::ApiError;
use crate::web::session::session_id;
use crate::web::state::AppState;

/// Middleware that re-checks the session's admin claim on every request.
///
/// If valid, inserts the `AuthUser` into request extensions for handlers to use.
/// A session that lost its admin claim is dropped and answered with 403;
/// a missing or expired one with 401.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let id = session_id(req.headers()).ok_or(ApiError::Unauthenticated)?;
    let gate = state
        .sessions
        .get(&id)
        .await
        .ok_or(ApiError::Unauthenticated)?;

    match gate.verify().await {
        Ok(user) => {
            req.extensions_mut().insert(user);
            Ok(next.run(req).await)
        }
        Err(err) => {
            state.sessions.remove(&id).await;
            match err {
                AuthError::NotAdmin => {
                    warn!(session = %id, "Session lost its admin claim");
                    Err(ApiError::Auth(err))
                }
                _ => Err(ApiError::Unauthenticated),
            }
        }
    }
}
