pub mod admin;
pub mod auth;
pub mod middleware;
pub mod rest;
pub mod session;
pub mod state;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use self::rest::ApiDoc;
use self::state::AppState;

pub use middleware::require_admin;

/// Room for the largest form: a 5MB DNI plus a 10MB picture, with headroom.
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Builds the complete application router: public listings and forms, the
/// auth endpoints, the admin area, and the Swagger UI.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/relatos", get(rest::list_relatos_handler))
        .route("/relatos/{id}", get(rest::get_relato_handler))
        .route("/relato/formulario", post(rest::submit_relato_handler))
        .route("/portal-memoria", get(rest::list_portal_memoria_handler))
        .route("/portal-memoria/{id}", get(rest::get_portal_memoria_handler))
        .route(
            "/portal-memoria/formulario",
            post(rest::submit_portal_memoria_handler),
        )
        .route("/media/{*path}", get(rest::media_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler));

    // Protected routes (admin session required)
    let protected_routes = Router::new()
        .route("/auth/session", get(auth::session_handler))
        .route("/admin/stats", get(admin::stats_handler))
        .route("/admin/{kind}/pending", get(admin::pending_handler))
        .route("/admin/{kind}/{id}", get(admin::detail_handler))
        .route("/admin/{kind}/{id}/approve", post(admin::approve_handler))
        .route("/admin/{kind}/{id}/reject", post(admin::reject_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_admin,
        ));

    let mut api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES));

    match state.config.cors_origin.parse::<HeaderValue>() {
        Ok(origin) => {
            let cors = CorsLayer::new()
                .allow_origin(origin)
                .allow_credentials(true)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([CONTENT_TYPE, ACCEPT]);
            api_router = api_router.layer(cors);
        }
        Err(_) => warn!(origin = %state.config.cors_origin, "Invalid CORS origin, CORS disabled"),
    }

    Router::new()
        .merge(api_router.with_state(state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
