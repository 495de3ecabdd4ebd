//! Request extractors that reject through [`ApiError`]
//!
//! axum's own `Path` and `Json` answer malformed input with plain-text 400s
//! and 415s. These wrappers keep every failure inside the redirect and
//! `{"errors": ...}` conventions of the rest of the API.

use axum::{
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;

use crate::api::middleware::ApiError;
use crate::models::FieldErrors;

/// Article ID from the `{id}` path segment.
///
/// A segment that is not a number cannot name an article, so it is treated
/// like an unknown ID.
#[derive(Debug, Clone, Copy)]
pub struct ArticleId(pub i64);

impl<S: Send + Sync> FromRequestParts<S> for ArticleId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<i64>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| {
                tracing::debug!(error = %rejection, "Unparsable article ID");
                ApiError::NotFound
            })?;
        Ok(ArticleId(id))
    }
}

/// JSON request body. Unreadable or mistyped bodies become a 422.
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| {
                tracing::debug!(error = %rejection, "Rejected request body");
                ApiError::Validation(FieldErrors::single("body", rejection.body_text()))
            })?;
        Ok(JsonBody(value))
    }
}
