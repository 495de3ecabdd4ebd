//! API layer - HTTP handlers and routing
//!
//! This module contains all HTTP endpoints of Quillpost:
//! - Article endpoints (public index and detail, admin management)
//! - Session endpoints (sign in, sign out)
//! - Password reset endpoints
//! - Admin dashboard
//! - Health check

pub mod admin;
pub mod articles;
pub mod auth;
pub mod cookies;
pub mod extract;
pub mod health;
pub mod middleware;
pub mod passwords;
pub mod responses;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::get,
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use middleware::{ApiError, AppState, CurrentUser, RequestContext};

/// Build the application routes, all behind session resumption
pub fn build_app_router(state: AppState) -> Router<AppState> {
    // Admin routes (admin role only; anonymous callers are unauthorized too)
    let admin_routes = articles::admin_router().route_layer(axum_middleware::from_fn(middleware::require_admin));

    // Admin routes that ask anonymous callers to sign in first
    let signed_in_admin_routes = articles::signed_in_admin_router(state.upload_config.max_file_size)
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn(middleware::require_authentication));

    // Protected routes (need a session but not admin)
    let protected_routes = Router::new()
        .merge(auth::protected_router())
        .merge(admin::router())
        .route_layer(axum_middleware::from_fn(middleware::require_authentication));

    // Public routes
    Router::new()
        .merge(articles::public_router())
        .merge(auth::public_router())
        .merge(passwords::router())
        .merge(admin_routes)
        .merge(signed_in_admin_routes)
        .merge(protected_routes)
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::resume_session,
        ))
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    let mut cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::COOKIE])
        .allow_credentials(true);
    match cors_origin.parse::<HeaderValue>() {
        Ok(origin) => cors = cors.allow_origin(origin),
        Err(e) => tracing::warn!(origin = cors_origin, error = %e, "Ignoring invalid CORS origin"),
    }

    Router::new()
        .merge(build_app_router(state.clone()))
        // Health check stays outside session handling
        .route("/up", get(health::up))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
