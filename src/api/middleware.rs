//! API middleware
//!
//! Contains:
//! - `AppState`, the shared services handed to every handler
//! - `ApiError`, the HTTP error taxonomy
//! - `resume_session`, which builds the per-request [`RequestContext`] and
//!   writes pending cookies on the way out
//! - `require_authentication` and `require_admin` route guards

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::api::cookies::{
    read_cookie, read_signed_cookie, to_header, CookieChange, PendingCookies, FLASH_COOKIE,
    RETURN_TO_COOKIE, SESSION_COOKIE,
};
use crate::api::responses::{Flash, Redirect};
use crate::config::{Config, UploadConfig};
use crate::db::repositories::{SqlxArticleRepository, SqlxSessionRepository, SqlxUserRepository};
use crate::db::DynDatabasePool;
use crate::models::{ClientMetadata, FieldErrors, Session, User};
use crate::services::article::{ArticleService, ArticleServiceError};
use crate::services::image_store::ImageStore;
use crate::services::mailer::MailSink;
use crate::services::password_reset::PasswordResetService;
use crate::services::rate_limiter::RateLimiter;
use crate::services::session::{AuthenticatedSession, SessionManager};
use crate::services::signing::MessageVerifier;
use crate::services::user::{UserService, UserServiceError};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub verifier: Arc<MessageVerifier>,
    pub user_service: Arc<UserService>,
    pub session_manager: Arc<SessionManager>,
    pub password_reset: Arc<PasswordResetService>,
    pub article_service: Arc<ArticleService>,
    pub login_limiter: Arc<RateLimiter>,
    pub reset_limiter: Arc<RateLimiter>,
    pub upload_config: Arc<UploadConfig>,
}

impl AppState {
    /// Wire repositories and services over `pool`
    pub fn new(
        config: &Config,
        pool: DynDatabasePool,
        verifier: Arc<MessageVerifier>,
        mail: Arc<dyn MailSink>,
        images: Arc<dyn ImageStore>,
    ) -> Self {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());
        let article_repo = SqlxArticleRepository::boxed(pool.clone());

        Self {
            user_service: Arc::new(UserService::new(user_repo.clone())),
            session_manager: Arc::new(SessionManager::new(
                session_repo,
                user_repo.clone(),
                verifier.clone(),
            )),
            password_reset: Arc::new(PasswordResetService::new(
                user_repo.clone(),
                verifier.clone(),
                mail,
                chrono::Duration::minutes(config.auth.reset_token_ttl_minutes),
                config.server.public_url.clone(),
            )),
            article_service: Arc::new(ArticleService::new(
                article_repo,
                user_repo,
                images,
                config.upload.clone(),
            )),
            login_limiter: Arc::new(RateLimiter::from_config("login", &config.auth.login_rate_limit)),
            reset_limiter: Arc::new(RateLimiter::from_config(
                "password_reset",
                &config.auth.reset_rate_limit,
            )),
            upload_config: Arc::new(config.upload.clone()),
            verifier,
            pool,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// HTTP error taxonomy. Most variants answer with a redirect and a flash.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthenticated { return_to: Option<String> },

    #[error("You are not authorized to access this page.")]
    Unauthorized,

    #[error("Article not found.")]
    NotFound,

    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    #[error("Try another email address or password.")]
    InvalidCredentials,

    #[error("Password reset link is invalid or has expired.")]
    InvalidOrExpiredToken,

    #[error("Passwords did not match.")]
    PasswordMismatch { token: String },

    #[error("Try again later.")]
    RateLimited { location: &'static str },

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();

        match self {
            ApiError::Unauthenticated { return_to } => {
                let redirect = Redirect::to("/session/new");
                match return_to {
                    Some(path) => redirect
                        .cookie(CookieChange::SetSigned {
                            name: RETURN_TO_COOKIE,
                            value: path,
                        })
                        .into_response(),
                    None => redirect.into_response(),
                }
            }
            ApiError::Unauthorized | ApiError::NotFound => {
                Redirect::to("/").alert(message).into_response()
            }
            ApiError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "errors": errors })),
            )
                .into_response(),
            ApiError::InvalidCredentials => {
                Redirect::to("/session/new").alert(message).into_response()
            }
            ApiError::InvalidOrExpiredToken => {
                Redirect::to("/passwords/new").alert(message).into_response()
            }
            ApiError::PasswordMismatch { token } => {
                Redirect::to(format!("/passwords/{}/edit", token))
                    .alert(message)
                    .into_response()
            }
            ApiError::RateLimited { location } => {
                Redirect::to(location).alert(message).into_response()
            }
            ApiError::Internal(e) => {
                tracing::error!(error = ?e, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

impl From<ArticleServiceError> for ApiError {
    fn from(e: ArticleServiceError) -> Self {
        match e {
            ArticleServiceError::NotFound(_) => ApiError::NotFound,
            ArticleServiceError::ValidationError(errors) => ApiError::Validation(errors),
            ArticleServiceError::InternalError(e) => ApiError::Internal(e),
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::ValidationError(msg) => {
                ApiError::Validation(FieldErrors::single("base", msg))
            }
            UserServiceError::EmailTaken(_) => ApiError::Validation(FieldErrors::single(
                "email_address",
                "has already been taken",
            )),
            UserServiceError::InternalError(e) => ApiError::Internal(e),
        }
    }
}

// ============================================================================
// Request context
// ============================================================================

/// Everything a handler may need to know about the caller, resolved once
/// per request by `resume_session`.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub current: Option<AuthenticatedSession>,
    pub flash: Option<Flash>,
    pub return_to: Option<String>,
    pub client: ClientMetadata,
}

impl RequestContext {
    pub fn user(&self) -> Option<&User> {
        self.current.as_ref().map(|current| &current.user)
    }

    pub fn session(&self) -> Option<&Session> {
        self.current.as_ref().map(|current| &current.session)
    }

    pub fn is_admin(&self) -> bool {
        self.user().is_some_and(User::is_admin)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("resume_session middleware is not installed")))
    }
}

/// The signed-in user. Only for routes behind `require_authentication`.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let ctx = RequestContext::from_request_parts(parts, state).await?;
        ctx.current
            .map(|current| CurrentUser(current.user))
            .ok_or(ApiError::Unauthenticated { return_to: None })
    }
}

/// Client details for session audit and rate limiting.
///
/// Prefers `X-Forwarded-For` and `X-Real-IP` (reverse proxy) over the peer
/// address.
fn client_metadata(request: &Request) -> ClientMetadata {
    let headers = request.headers();

    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|value| value.to_str().ok())
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty())
    };
    let peer = || {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
    };

    ClientMetadata {
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(String::from),
        ip_address: forwarded.or_else(real_ip).or_else(peer),
    }
}

/// Only same-site paths are acceptable post-login targets
fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.starts_with("/\\")
}

// ============================================================================
// Middleware
// ============================================================================

/// Resolve the session cookie, flash and `return_to` slot into a
/// [`RequestContext`], then write the response's pending cookies.
pub async fn resume_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let headers = request.headers();
    let session_cookie = read_cookie(headers, SESSION_COOKIE);
    let current = state
        .session_manager
        .resume_session(session_cookie.as_deref())
        .await?;

    let flash = read_signed_cookie(headers, FLASH_COOKIE, &state.verifier)
        .and_then(|value| serde_json::from_str::<Flash>(&value).ok());
    let return_to =
        read_signed_cookie(headers, RETURN_TO_COOKIE, &state.verifier).filter(|path| is_local_path(path));

    let stale_session_cookie = session_cookie.is_some() && current.is_none();
    let consumes_flash = flash.is_some() && request.method() == Method::GET;

    let ctx = RequestContext {
        current,
        flash,
        return_to,
        client: client_metadata(&request),
    };
    request.extensions_mut().insert(ctx);

    let mut response = next.run(request).await;

    let mut pending = response
        .extensions_mut()
        .remove::<PendingCookies>()
        .unwrap_or_default();
    if consumes_flash && response.status().is_success() && !pending.touches(FLASH_COOKIE) {
        pending.push(CookieChange::Remove { name: FLASH_COOKIE });
    }
    if stale_session_cookie && !pending.touches(SESSION_COOKIE) {
        pending.push(CookieChange::Remove { name: SESSION_COOKIE });
    }

    for change in &pending.0 {
        if let Some(value) = to_header(change, &state.verifier) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }

    Ok(response)
}

/// Redirect anonymous callers to the sign-in page, remembering where they
/// were headed when the request was a GET.
pub async fn require_authentication(request: Request, next: Next) -> Result<Response, ApiError> {
    let authenticated = request
        .extensions()
        .get::<RequestContext>()
        .is_some_and(|ctx| ctx.current.is_some());

    if !authenticated {
        let remembers_path = request.method() == Method::GET || request.method() == Method::HEAD;
        let return_to = remembers_path.then(|| {
            request
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| "/".to_string())
        });
        return Err(ApiError::Unauthenticated { return_to });
    }

    Ok(next.run(request).await)
}

/// Admin authorization middleware
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let is_admin = request
        .extensions()
        .get::<RequestContext>()
        .is_some_and(RequestContext::is_admin);

    if !is_admin {
        tracing::warn!(path = %request.uri().path(), "Non-admin request to admin route");
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(request).await)
}
