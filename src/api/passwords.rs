//! Password reset API endpoints
//!
//! - GET /passwords/new - Reset request entry point
//! - POST /passwords - Request reset instructions by email
//! - GET /passwords/{token} and /passwords/{token}/edit - Check a reset link
//! - PATCH/PUT /passwords/{token} - Choose a new password

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Router,
};
use serde::Deserialize;

use crate::api::extract::JsonBody;
use crate::api::middleware::{ApiError, AppState, RequestContext};
use crate::api::responses::{Page, Redirect, ResetPage};
use crate::services::password_reset::PasswordResetError;
use crate::services::rate_limiter::account_key;

/// Request body for reset instructions
#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub email_address: String,
}

/// Request body for a new password
#[derive(Debug, Deserialize)]
pub struct NewPasswordRequest {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirmation: String,
}

/// Build the password reset routes (no auth required)
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/passwords", post(request_reset))
        .route("/passwords/new", get(new_reset))
        .route("/passwords/{token}", get(edit_password).patch(update_password).put(update_password))
        .route("/passwords/{token}/edit", get(edit_password))
}

/// Map a reset failure for the link identified by `token`
fn reset_error(e: PasswordResetError, token: &str) -> ApiError {
    match e {
        PasswordResetError::InvalidOrExpiredToken => ApiError::InvalidOrExpiredToken,
        // A rejected password sends the user back to the form either way
        PasswordResetError::PasswordMismatch | PasswordResetError::ValidationError(_) => {
            ApiError::PasswordMismatch {
                token: token.to_string(),
            }
        }
        PasswordResetError::InternalError(e) => ApiError::Internal(e),
    }
}

/// GET /passwords/new
async fn new_reset(ctx: RequestContext) -> Page<ResetPage> {
    Page::new(ctx.flash, ResetPage { token: None })
}

/// POST /passwords - Request reset instructions
///
/// Answers the same way whether or not the address belongs to a user.
/// Capped per client origin and per address.
async fn request_reset(
    State(state): State<AppState>,
    ctx: RequestContext,
    JsonBody(body): JsonBody<ResetRequest>,
) -> Result<Redirect, ApiError> {
    let origin = ctx.client.origin_key();
    let account = account_key(&body.email_address);
    if !state.reset_limiter.attempt_all(&[origin.as_str(), account.as_str()]).await {
        return Err(ApiError::RateLimited {
            location: "/passwords/new",
        });
    }

    state
        .password_reset
        .request_reset(&body.email_address)
        .await
        .map_err(|e| reset_error(e, ""))?;

    Ok(Redirect::to("/session/new")
        .notice("Password reset instructions sent (if user with that email address exists)."))
}

/// GET /passwords/{token}[/edit] - Show the new password form
async fn edit_password(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(token): Path<String>,
) -> Result<Page<ResetPage>, ApiError> {
    state
        .password_reset
        .verify_token(&token)
        .await
        .map_err(|e| reset_error(e, &token))?;

    Ok(Page::new(ctx.flash, ResetPage { token: Some(token) }))
}

/// PATCH /passwords/{token} - Set the new password
///
/// Signs the user out of every session.
async fn update_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    JsonBody(body): JsonBody<NewPasswordRequest>,
) -> Result<Redirect, ApiError> {
    let user = state
        .password_reset
        .verify_token(&token)
        .await
        .map_err(|e| reset_error(e, &token))?;

    state
        .password_reset
        .reset_password(&user, &body.password, &body.password_confirmation)
        .await
        .map_err(|e| reset_error(e, &token))?;

    Ok(Redirect::to("/session/new").notice("Password has been reset."))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::*;
    use crate::config::{Config, RateLimitConfig};
    use axum::http::{header, StatusCode};
    use serde_json::{json, Value};

    const NEW_PASSWORD: &str = "a brand new secret";

    fn token_from_mail(body: &str) -> String {
        let start = body.find("/passwords/").unwrap() + "/passwords/".len();
        let rest = &body[start..];
        rest[..rest.find("/edit").unwrap()].to_string()
    }

    #[tokio::test]
    async fn test_request_reset_for_known_address_sends_mail() {
        let app = spawn_app().await;
        app.create_user("jane@example.com", false).await;

        let response = app
            .server
            .post("/passwords")
            .json(&json!({ "email_address": "jane@example.com" }))
            .await;

        assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(response.header(header::LOCATION), "/session/new");
        assert_eq!(
            response.json::<Value>()["notice"],
            "Password reset instructions sent (if user with that email address exists)."
        );

        let sent = app.mail.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "jane@example.com");

        let token = token_from_mail(&sent[0].body);
        let page = app.server.get(&format!("/passwords/{}/edit", token)).await;
        assert_eq!(page.status_code(), StatusCode::OK);
        assert_eq!(page.json::<Value>()["token"], token.as_str());
    }

    #[tokio::test]
    async fn test_request_reset_for_unknown_address_looks_the_same() {
        let app = spawn_app().await;

        let response = app
            .server
            .post("/passwords")
            .json(&json!({ "email_address": "ghost@example.com" }))
            .await;

        assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(response.header(header::LOCATION), "/session/new");
        assert_eq!(
            response.json::<Value>()["notice"],
            "Password reset instructions sent (if user with that email address exists)."
        );
        assert!(app.mail.sent().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_token_redirects_to_new_request() {
        let app = spawn_app().await;

        for path in ["/passwords/not-a-token", "/passwords/not-a-token/edit"] {
            let response = app.server.get(path).await;
            assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
            assert_eq!(response.header(header::LOCATION), "/passwords/new");
        }

        let page: Value = app.server.get("/passwords/new").await.json();
        assert_eq!(page["flash"]["alert"], "Password reset link is invalid or has expired.");
    }

    #[tokio::test]
    async fn test_mismatched_confirmation_changes_nothing() {
        let app = spawn_app().await;
        let user = app.create_user("jane@example.com", false).await;
        app.sign_in("jane@example.com").await;
        let token = app.state.password_reset.issue_token(&user).unwrap();

        let response = app
            .server
            .patch(&format!("/passwords/{}", token))
            .json(&json!({ "password": NEW_PASSWORD, "password_confirmation": "something else" }))
            .await;

        assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.header(header::LOCATION),
            format!("/passwords/{}/edit", token).as_str()
        );
        assert_eq!(response.json::<Value>()["alert"], "Passwords did not match.");

        // Still signed in, old password still valid, token still usable
        assert_eq!(app.server.get("/admin/dashboard").await.status_code(), StatusCode::OK);
        app.sign_in("jane@example.com").await;
        let page = app.server.get(&format!("/passwords/{}/edit", token)).await;
        assert_eq!(page.status_code(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_blank_password_is_rejected() {
        let app = spawn_app().await;
        let user = app.create_user("jane@example.com", false).await;
        let token = app.state.password_reset.issue_token(&user).unwrap();

        let response = app
            .server
            .put(&format!("/passwords/{}", token))
            .json(&json!({ "password": "", "password_confirmation": "" }))
            .await;

        assert_eq!(
            response.header(header::LOCATION),
            format!("/passwords/{}/edit", token).as_str()
        );
        app.sign_in("jane@example.com").await;
    }

    #[tokio::test]
    async fn test_reset_signs_out_everywhere_and_burns_token() {
        let app = spawn_app().await;
        let user = app.create_user("jane@example.com", false).await;
        app.sign_in("jane@example.com").await;
        let token = app.state.password_reset.issue_token(&user).unwrap();

        let response = app
            .server
            .patch(&format!("/passwords/{}", token))
            .json(&json!({ "password": NEW_PASSWORD, "password_confirmation": NEW_PASSWORD }))
            .await;

        assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(response.header(header::LOCATION), "/session/new");
        assert_eq!(response.json::<Value>()["notice"], "Password has been reset.");

        // The old session is gone
        let response = app.server.get("/admin/dashboard").await;
        assert_eq!(response.header(header::LOCATION), "/session/new");

        // The link only works once
        let response = app.server.get(&format!("/passwords/{}/edit", token)).await;
        assert_eq!(response.header(header::LOCATION), "/passwords/new");

        let response = app
            .server
            .post("/session")
            .json(&json!({ "email_address": "jane@example.com", "password": NEW_PASSWORD }))
            .await;
        assert_eq!(response.header(header::LOCATION), "/admin/dashboard");
    }

    #[tokio::test]
    async fn test_reset_requests_are_rate_limited() {
        let mut config = Config::default();
        config.auth.reset_rate_limit = RateLimitConfig {
            max_requests: 1,
            window_seconds: 180,
        };
        let app = spawn_app_with(config).await;
        app.create_user("jane@example.com", false).await;

        let first = app
            .server
            .post("/passwords")
            .json(&json!({ "email_address": "jane@example.com" }))
            .await;
        assert_eq!(first.header(header::LOCATION), "/session/new");

        let second = app
            .server
            .post("/passwords")
            .json(&json!({ "email_address": "jane@example.com" }))
            .await;
        assert_eq!(second.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(second.header(header::LOCATION), "/passwords/new");
        assert_eq!(second.json::<Value>()["alert"], "Try again later.");
        assert_eq!(app.mail.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_rotating_forwarded_for_does_not_lift_reset_cap() {
        let mut config = Config::default();
        config.auth.reset_rate_limit = RateLimitConfig {
            max_requests: 1,
            window_seconds: 180,
        };
        let app = spawn_app_with(config).await;
        app.create_user("jane@example.com", false).await;

        let mut locations = Vec::new();
        for ip in ["198.51.100.1", "198.51.100.2"] {
            let response = app
                .server
                .post("/passwords")
                .add_header(
                    header::HeaderName::from_static("x-forwarded-for"),
                    header::HeaderValue::from_static(ip),
                )
                .json(&json!({ "email_address": "jane@example.com" }))
                .await;
            locations.push(response.header(header::LOCATION));
        }

        assert_eq!(locations[0], "/session/new");
        assert_eq!(locations[1], "/passwords/new");
        assert_eq!(app.mail.sent().len(), 1);
    }
}
