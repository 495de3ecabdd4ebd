//! Session API endpoints
//!
//! Handles HTTP requests for signing in and out:
//! - GET /session - Redirect to the front page
//! - GET /session/new - Sign-in entry point
//! - POST /session - Sign in
//! - DELETE /session - Sign out

use axum::{
    extract::State,
    routing::{delete, get},
    Router,
};
use serde::Deserialize;

use crate::api::cookies::{CookieChange, PERMANENT_MAX_AGE, RETURN_TO_COOKIE, SESSION_COOKIE};
use crate::api::extract::JsonBody;
use crate::api::middleware::{ApiError, AppState, RequestContext};
use crate::api::responses::{Page, Redirect, SignInPage};
use crate::services::rate_limiter::account_key;

/// Where a successful sign-in lands when no page was remembered
const DEFAULT_AFTER_SIGN_IN: &str = "/admin/dashboard";

/// Request body for signing in
#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    #[serde(default)]
    pub email_address: String,
    #[serde(default)]
    pub password: String,
}

/// Build public session routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/session", get(session_root).post(sign_in))
        .route("/session/new", get(sign_in_page))
}

/// Build protected session routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new().route("/session", delete(sign_out))
}

/// GET /session
async fn session_root() -> Redirect {
    Redirect::to("/")
}

/// GET /session/new
async fn sign_in_page(ctx: RequestContext) -> Page<SignInPage> {
    let authenticated = ctx.current.is_some();
    Page::new(ctx.flash, SignInPage { authenticated })
}

/// POST /session - Sign in
///
/// Attempts are capped per client origin and per email address, successful
/// or not. A successful sign-in clears the address count.
async fn sign_in(
    State(state): State<AppState>,
    ctx: RequestContext,
    JsonBody(body): JsonBody<SignInRequest>,
) -> Result<Redirect, ApiError> {
    let origin = ctx.client.origin_key();
    let account = account_key(&body.email_address);
    if !state.login_limiter.attempt_all(&[origin.as_str(), account.as_str()]).await {
        return Err(ApiError::RateLimited {
            location: "/session/new",
        });
    }

    let user = state
        .user_service
        .authenticate(&body.email_address, &body.password)
        .await?
        .ok_or_else(|| {
            tracing::warn!(origin = %origin, "Failed sign-in attempt");
            ApiError::InvalidCredentials
        })?;
    state.login_limiter.clear(&account).await;

    let (_session, cookie_value) = state
        .session_manager
        .start_session(&user, ctx.client.clone())
        .await?;

    let target = ctx
        .return_to
        .unwrap_or_else(|| DEFAULT_AFTER_SIGN_IN.to_string());

    Ok(Redirect::to(target)
        .cookie(CookieChange::Set {
            name: SESSION_COOKIE,
            value: cookie_value,
            max_age: Some(PERMANENT_MAX_AGE),
        })
        .cookie(CookieChange::Remove {
            name: RETURN_TO_COOKIE,
        }))
}

/// DELETE /session - Sign out
async fn sign_out(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Redirect, ApiError> {
    let session = ctx
        .session()
        .ok_or(ApiError::Unauthenticated { return_to: None })?;

    state.session_manager.terminate_session(session).await?;

    Ok(Redirect::to("/session/new").cookie(CookieChange::Remove {
        name: SESSION_COOKIE,
    }))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::*;
    use crate::config::{Config, RateLimitConfig};
    use crate::db::repositories::{SessionRepository, SqlxSessionRepository};
    use axum::http::{header, StatusCode};
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_session_root_redirects_home() {
        let app = spawn_app().await;
        let response = app.server.get("/session").await;
        assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(response.header(header::LOCATION), "/");
    }

    #[tokio::test]
    async fn test_sign_in_lands_on_dashboard() {
        let app = spawn_app().await;
        app.create_user("jane@example.com", false).await;

        let response = app
            .server
            .post("/session")
            .json(&json!({ "email_address": " Jane@Example.com ", "password": PASSWORD }))
            .await;

        assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(response.header(header::LOCATION), "/admin/dashboard");
        let cookie = response.cookie("session_id");
        assert!(cookie.http_only().unwrap_or(false));
        assert!(cookie.max_age().is_some());

        let dashboard = app.server.get("/admin/dashboard").await;
        assert_eq!(dashboard.status_code(), StatusCode::OK);
        let body: Value = dashboard.json();
        assert_eq!(body["user"]["email_address"], "jane@example.com");
    }

    #[tokio::test]
    async fn test_bad_credentials_redirect_back_with_alert() {
        let app = spawn_app().await;
        app.create_user("jane@example.com", false).await;

        for (email, password) in [("jane@example.com", "wrong"), ("nobody@example.com", PASSWORD)] {
            let response = app
                .server
                .post("/session")
                .json(&json!({ "email_address": email, "password": password }))
                .await;

            assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
            assert_eq!(response.header(header::LOCATION), "/session/new");
            let body: Value = response.json();
            assert_eq!(body["alert"], "Try another email address or password.");
        }

        let page: Value = app.server.get("/session/new").await.json();
        assert_eq!(page["authenticated"], false);
        assert_eq!(page["flash"]["alert"], "Try another email address or password.");

        // The flash is shown once
        let page: Value = app.server.get("/session/new").await.json();
        assert_eq!(page["flash"], Value::Null);
    }

    #[tokio::test]
    async fn test_return_to_is_used_once() {
        let app = spawn_app().await;
        app.create_user("jane@example.com", false).await;

        let response = app.server.get("/admin/dashboard?tab=drafts").await;
        assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(response.header(header::LOCATION), "/session/new");

        let response = app
            .server
            .post("/session")
            .json(&json!({ "email_address": "jane@example.com", "password": PASSWORD }))
            .await;
        assert_eq!(response.header(header::LOCATION), "/admin/dashboard?tab=drafts");

        let response = app
            .server
            .post("/session")
            .json(&json!({ "email_address": "jane@example.com", "password": PASSWORD }))
            .await;
        assert_eq!(response.header(header::LOCATION), "/admin/dashboard");
    }

    #[tokio::test]
    async fn test_non_get_requests_are_not_remembered() {
        let app = spawn_app().await;
        app.create_user("jane@example.com", false).await;

        let response = app.server.delete("/session").await;
        assert_eq!(response.header(header::LOCATION), "/session/new");

        let response = app
            .server
            .post("/session")
            .json(&json!({ "email_address": "jane@example.com", "password": PASSWORD }))
            .await;
        assert_eq!(response.header(header::LOCATION), "/admin/dashboard");
    }

    #[tokio::test]
    async fn test_sign_out_ends_session() {
        let app = spawn_app().await;
        let user = app.create_user("jane@example.com", false).await;
        app.sign_in("jane@example.com").await;

        let response = app.server.delete("/session").await;
        assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(response.header(header::LOCATION), "/session/new");

        let sessions = SqlxSessionRepository::new(app.state.pool.clone());
        assert_eq!(sessions.count_by_user(user.id).await.unwrap(), 0);

        let response = app.server.get("/admin/dashboard").await;
        assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(response.header(header::LOCATION), "/session/new");
    }

    #[tokio::test]
    async fn test_sign_in_is_rate_limited() {
        let mut config = Config::default();
        config.auth.login_rate_limit = RateLimitConfig {
            max_requests: 2,
            window_seconds: 180,
        };
        let app = spawn_app_with(config).await;
        app.create_user("jane@example.com", false).await;

        for _ in 0..2 {
            let response = app
                .server
                .post("/session")
                .json(&json!({ "email_address": "jane@example.com", "password": "wrong" }))
                .await;
            assert_eq!(response.json::<Value>()["alert"], "Try another email address or password.");
        }

        // Correct credentials are refused too once the cap is reached
        let response = app
            .server
            .post("/session")
            .json(&json!({ "email_address": "jane@example.com", "password": PASSWORD }))
            .await;
        assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(response.header(header::LOCATION), "/session/new");
        assert_eq!(response.json::<Value>()["alert"], "Try again later.");
    }

    #[tokio::test]
    async fn test_rotating_forwarded_for_does_not_lift_login_cap() {
        let mut config = Config::default();
        config.auth.login_rate_limit = RateLimitConfig {
            max_requests: 2,
            window_seconds: 180,
        };
        let app = spawn_app_with(config).await;
        app.create_user("jane@example.com", false).await;

        let attempt = |ip: &'static str, password: &'static str| {
            app.server
                .post("/session")
                .add_header(
                    header::HeaderName::from_static("x-forwarded-for"),
                    header::HeaderValue::from_static(ip),
                )
                .json(&json!({ "email_address": "jane@example.com", "password": password }))
        };

        for ip in ["198.51.100.1", "198.51.100.2"] {
            let response = attempt(ip, "wrong").await;
            assert_eq!(response.json::<Value>()["alert"], "Try another email address or password.");
        }

        let response = attempt("198.51.100.3", PASSWORD).await;
        assert_eq!(response.header(header::LOCATION), "/session/new");
        assert_eq!(response.json::<Value>()["alert"], "Try again later.");
    }

    #[tokio::test]
    async fn test_successful_sign_in_clears_address_count() {
        let mut config = Config::default();
        config.auth.login_rate_limit = RateLimitConfig {
            max_requests: 2,
            window_seconds: 180,
        };
        let app = spawn_app_with(config).await;
        app.create_user("jane@example.com", false).await;

        for (ip, password) in [("198.51.100.1", "wrong"), ("198.51.100.2", PASSWORD)] {
            app.server
                .post("/session")
                .add_header(
                    header::HeaderName::from_static("x-forwarded-for"),
                    header::HeaderValue::from_static(ip),
                )
                .json(&json!({ "email_address": "jane@example.com", "password": password }))
                .await;
        }

        let response = app
            .server
            .post("/session")
            .add_header(
                header::HeaderName::from_static("x-forwarded-for"),
                header::HeaderValue::from_static("198.51.100.3"),
            )
            .json(&json!({ "email_address": "jane@example.com", "password": PASSWORD }))
            .await;
        assert_eq!(response.header(header::LOCATION), "/admin/dashboard");
    }
}
