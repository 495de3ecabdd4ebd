//! Admin API endpoints
//!
//! Handles HTTP requests for the signed-in area:
//! - GET /admin/dashboard - Current user and article totals

use axum::{extract::State, routing::get, Router};

use crate::api::middleware::{ApiError, AppState, CurrentUser, RequestContext};
use crate::api::responses::{Dashboard, Page};

/// Build the admin routes (requires auth middleware)
pub fn router() -> Router<AppState> {
    Router::new().route("/admin/dashboard", get(dashboard))
}

/// GET /admin/dashboard
async fn dashboard(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ctx: RequestContext,
) -> Result<Page<Dashboard>, ApiError> {
    let counts = state.article_service.counts().await?;
    Ok(Page::new(ctx.flash, Dashboard { user, counts }))
}
