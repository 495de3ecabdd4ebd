//! Shared API response types
//!
//! Mutating endpoints answer with a [`Redirect`]: a 303 with a `Location`
//! header, a small JSON body and an optional flash message. Landing endpoints
//! wrap their payload in a [`Page`], which carries the pending flash.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::cookies::{CookieChange, PendingCookies, FLASH_COOKIE};
use crate::models::{Article, ArticleCounts, User};

/// One-shot message shown on the next page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flash {
    Notice(String),
    Alert(String),
}

/// 303 See Other, optionally with a flash and cookie changes
#[derive(Debug)]
pub struct Redirect {
    location: String,
    flash: Option<Flash>,
    cookies: PendingCookies,
}

impl Redirect {
    pub fn to(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            flash: None,
            cookies: PendingCookies::default(),
        }
    }

    pub fn notice(mut self, message: impl Into<String>) -> Self {
        self.flash = Some(Flash::Notice(message.into()));
        self
    }

    pub fn alert(mut self, message: impl Into<String>) -> Self {
        self.flash = Some(Flash::Alert(message.into()));
        self
    }

    pub fn cookie(mut self, change: CookieChange) -> Self {
        self.cookies.push(change);
        self
    }
}

impl IntoResponse for Redirect {
    fn into_response(mut self) -> Response {
        let mut body = Map::new();
        body.insert("location".to_string(), Value::String(self.location.clone()));

        if let Some(flash) = &self.flash {
            if let Ok(Value::Object(fields)) = serde_json::to_value(flash) {
                body.extend(fields);
            }
            match serde_json::to_string(flash) {
                Ok(value) => self.cookies.push(CookieChange::SetSigned {
                    name: FLASH_COOKIE,
                    value,
                }),
                Err(e) => tracing::error!(error = %e, "Failed to encode flash"),
            }
        }

        let location = HeaderValue::from_str(&self.location).unwrap_or_else(|_| {
            tracing::error!(location = %self.location, "Invalid redirect location");
            HeaderValue::from_static("/")
        });

        let mut response = (
            StatusCode::SEE_OTHER,
            [(header::LOCATION, location)],
            Json(Value::Object(body)),
        )
            .into_response();
        response.extensions_mut().insert(self.cookies);
        response
    }
}

/// A landing page: the payload plus the flash that was pending for it
#[derive(Debug, Serialize)]
pub struct Page<T> {
    flash: Option<Flash>,
    #[serde(flatten)]
    data: T,
}

impl<T: Serialize> Page<T> {
    pub fn new(flash: Option<Flash>, data: T) -> Self {
        Self { flash, data }
    }
}

impl<T: Serialize> IntoResponse for Page<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ArticleList {
    pub articles: Vec<Article>,
}

/// Article detail with its image status
#[derive(Debug, Serialize)]
pub struct ArticleDetail {
    pub article: Article,
    pub image_attached: bool,
}

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub user: User,
    pub counts: ArticleCounts,
}

#[derive(Debug, Serialize)]
pub struct SignInPage {
    pub authenticated: bool,
}

#[derive(Debug, Serialize)]
pub struct ResetPage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}
