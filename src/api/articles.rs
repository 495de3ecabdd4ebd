//! Article API endpoints
//!
//! Handles HTTP requests for article operations:
//! - GET / and GET /articles - List visible articles
//! - GET /articles/{id} - Show one visible article
//! - GET /articles/{id}/edit - Load an article for editing (admin)
//! - POST /articles - Create article (admin)
//! - PATCH/PUT /articles/{id} - Update article (admin)
//! - DELETE /articles/{id} - Delete article (admin)
//! - PATCH /articles/{id}/set_owner - Reassign the owner (admin)
//! - POST /articles/{id}/image - Attach the image (admin)
//! - DELETE /articles/{id}/remove_image - Remove the image (admin)
//!
//! Drafts are only visible to admins. Everyone else gets the same answer for
//! a draft as for an unknown ID.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::{delete, get, patch, post},
    Router,
};
use serde::Deserialize;

use crate::api::extract::{ArticleId, JsonBody};
use crate::api::middleware::{ApiError, AppState, CurrentUser, RequestContext};
use crate::api::responses::{ArticleDetail, ArticleList, Page, Redirect};
use crate::models::{CreateArticleInput, FieldErrors, UpdateArticleInput};
use crate::services::article::ImageSubmission;

/// Room for multipart framing on top of the image itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Request body for reassigning an article
#[derive(Debug, Deserialize)]
pub struct SetOwnerRequest {
    pub user_id: i64,
}

/// Build public article routes
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_articles))
        .route("/articles", get(list_articles))
        .route("/articles/{id}", get(show_article))
}

/// Build admin article routes (requires admin middleware)
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/articles", post(create_article))
        .route(
            "/articles/{id}",
            patch(update_article).put(update_article).delete(delete_article),
        )
        .route("/articles/{id}/edit", get(edit_article))
}

/// Build admin routes that need a signed-in user first
///
/// `max_image_size` raises the body limit so the largest allowed image fits.
pub fn signed_in_admin_router(max_image_size: u64) -> Router<AppState> {
    let body_limit = usize::try_from(max_image_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/articles/{id}/set_owner", patch(set_owner))
        .route(
            "/articles/{id}/image",
            post(attach_image).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/articles/{id}/remove_image", delete(remove_image))
}

/// GET /articles
///
/// Newest first. Admins also see drafts.
async fn list_articles(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Page<ArticleList>, ApiError> {
    let articles = state.article_service.visible_to(ctx.user()).await?;
    Ok(Page::new(ctx.flash, ArticleList { articles }))
}

/// GET /articles/{id}
async fn show_article(
    State(state): State<AppState>,
    ctx: RequestContext,
    ArticleId(id): ArticleId,
) -> Result<Page<ArticleDetail>, ApiError> {
    let article = state.article_service.find_visible(id, ctx.user()).await?;
    let image_attached = state.article_service.has_image(article.id).await?;

    Ok(Page::new(
        ctx.flash,
        ArticleDetail {
            article,
            image_attached,
        },
    ))
}

/// GET /articles/{id}/edit
async fn edit_article(
    State(state): State<AppState>,
    ctx: RequestContext,
    ArticleId(id): ArticleId,
) -> Result<Page<ArticleDetail>, ApiError> {
    let article = state.article_service.find_visible(id, ctx.user()).await?;
    let image_attached = state.article_service.has_image(article.id).await?;

    Ok(Page::new(
        ctx.flash,
        ArticleDetail {
            article,
            image_attached,
        },
    ))
}

/// POST /articles
async fn create_article(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(input): JsonBody<CreateArticleInput>,
) -> Result<Redirect, ApiError> {
    let article = state.article_service.create(&user, input).await?;

    Ok(Redirect::to(format!("/articles/{}", article.id)).notice("Article was successfully created."))
}

/// PATCH /articles/{id}
///
/// Ownership is not updatable here; see `set_owner`.
async fn update_article(
    State(state): State<AppState>,
    ArticleId(id): ArticleId,
    JsonBody(input): JsonBody<UpdateArticleInput>,
) -> Result<Redirect, ApiError> {
    let article = state.article_service.update(id, input).await?;

    Ok(Redirect::to(format!("/articles/{}", article.id)).notice("Article was successfully updated."))
}

/// DELETE /articles/{id}
async fn delete_article(
    State(state): State<AppState>,
    ArticleId(id): ArticleId,
) -> Result<Redirect, ApiError> {
    state.article_service.delete(id).await?;

    Ok(Redirect::to("/articles").notice("Article was successfully destroyed."))
}

/// PATCH /articles/{id}/set_owner
async fn set_owner(
    State(state): State<AppState>,
    ArticleId(id): ArticleId,
    JsonBody(body): JsonBody<SetOwnerRequest>,
) -> Result<Redirect, ApiError> {
    let article = state.article_service.set_owner(id, body.user_id).await?;

    Ok(Redirect::to(format!("/articles/{}", article.id)).notice("Article owner was successfully updated."))
}

/// POST /articles/{id}/image
///
/// Accepts multipart/form-data with a single file field named "image".
async fn attach_image(
    State(state): State<AppState>,
    ArticleId(id): ArticleId,
    mut multipart: Multipart,
) -> Result<Redirect, ApiError> {
    let mut submission = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::debug!(error = %e, "Unreadable multipart body");
        ApiError::Validation(FieldErrors::single("image", "could not be read"))
    })? {
        if field.name() != Some("image") {
            continue;
        }

        let filename = field.file_name().unwrap_or("image").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field.bytes().await.map_err(|e| {
            tracing::debug!(error = %e, "Failed to read image field");
            ApiError::Validation(FieldErrors::single("image", "could not be read"))
        })?;

        submission = Some(ImageSubmission {
            filename,
            content_type,
            data: data.to_vec(),
        });
        break;
    }

    let submission =
        submission.ok_or_else(|| ApiError::Validation(FieldErrors::single("image", "can't be blank")))?;
    let stored = state.article_service.attach_image(id, submission).await?;

    tracing::info!(article_id = id, size = stored.size, "Article image attached");
    Ok(Redirect::to(format!("/articles/{}/edit", id)).notice("Image was successfully attached."))
}

/// DELETE /articles/{id}/remove_image
async fn remove_image(
    State(state): State<AppState>,
    ArticleId(id): ArticleId,
) -> Result<Redirect, ApiError> {
    let redirect = Redirect::to(format!("/articles/{}/edit", id));

    if state.article_service.remove_image(id).await? {
        Ok(redirect.notice("Image removed."))
    } else {
        Ok(redirect.alert("No image was attached."))
    }
}
