//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for administrator login, logout, and the current
//! session.

use axum::{
    extract::{Extension, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use memoria_core::AuthUser;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::error::{ApiError, ErrorBody};
use crate::web::session::{cleared_cookie, session_cookie, session_id};
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// The signed-in administrator.
#[derive(Serialize, ToSchema)]
pub struct SessionUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub is_admin: bool,
}

impl From<AuthUser> for SessionUser {
    fn from(user: AuthUser) -> Self {
        Self {
            uid: user.uid,
            email: user.email,
            display_name: user.display_name,
            is_admin: user.is_admin,
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/login - Sign in as an administrator
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = SessionUser),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 403, description = "The account is not an administrator", body = ErrorBody)
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // A browser logging in again gives up its previous session.
    if let Some(previous) = session_id(&headers) {
        if let Some(gate) = state.sessions.remove(&previous).await {
            if let Err(e) = gate.sign_out().await {
                warn!(error = %e, "Failed to sign out previous session");
            }
        }
    }

    let gate = state.new_gate();
    let user = gate.sign_in(req.email.trim(), &req.password).await?;
    let id = state.sessions.create(gate).await;
    info!(uid = %user.uid, "Administrator signed in");

    let cookie = session_cookie(id, state.sessions.ttl());
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(SessionUser::from(user)),
    ))
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session", body = ErrorBody)
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let id = session_id(&headers).ok_or(ApiError::Unauthenticated)?;
    if let Some(gate) = state.sessions.remove(&id).await {
        gate.sign_out().await?;
        info!(session = %id, "Signed out");
    }
    Ok((StatusCode::OK, [(header::SET_COOKIE, cleared_cookie())]))
}

/// GET /auth/session - The administrator behind the session cookie
#[utoipa::path(
    get,
    path = "/auth/session",
    responses(
        (status = 200, description = "Active administrator session", body = SessionUser),
        (status = 401, description = "No active session", body = ErrorBody)
    )
)]
pub async fn session_handler(Extension(user): Extension<AuthUser>) -> Json<SessionUser> {
    Json(SessionUser::from(user))
}
