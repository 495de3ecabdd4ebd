//! Cookie plumbing
//!
//! Handlers and errors never format `Set-Cookie` headers themselves. They
//! attach [`PendingCookies`] to the response, and the `resume_session`
//! middleware signs and writes them. Every cookie is `HttpOnly`,
//! `SameSite=Lax` and scoped to `/`.

use axum::http::{header, HeaderMap, HeaderValue};

use crate::services::signing::MessageVerifier;

pub const SESSION_COOKIE: &str = "session_id";
pub const RETURN_TO_COOKIE: &str = "return_to";
pub const FLASH_COOKIE: &str = "flash";

/// "Permanent" cookie lifetime: 20 years
pub const PERMANENT_MAX_AGE: i64 = 20 * 365 * 24 * 60 * 60;

/// A cookie to set or remove on the way out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieChange {
    /// The value is already signed
    Set {
        name: &'static str,
        value: String,
        max_age: Option<i64>,
    },
    /// Signed on write, with the cookie name as purpose
    SetSigned { name: &'static str, value: String },
    Remove { name: &'static str },
}

/// Cookie changes carried in response extensions
#[derive(Debug, Clone, Default)]
pub struct PendingCookies(pub Vec<CookieChange>);

impl PendingCookies {
    pub fn push(&mut self, change: CookieChange) {
        self.0.push(change);
    }

    pub fn touches(&self, cookie: &str) -> bool {
        self.0.iter().any(|change| match change {
            CookieChange::Set { name, .. }
            | CookieChange::SetSigned { name, .. }
            | CookieChange::Remove { name } => *name == cookie,
        })
    }
}

/// Find a cookie in the request's `Cookie` headers
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// Read a cookie and check its signature
pub fn read_signed_cookie(headers: &HeaderMap, name: &str, verifier: &MessageVerifier) -> Option<String> {
    read_cookie(headers, name).and_then(|value| verifier.verify_str(name, &value))
}

/// Render one change as a `Set-Cookie` header
pub fn to_header(change: &CookieChange, verifier: &MessageVerifier) -> Option<HeaderValue> {
    let rendered = match change {
        CookieChange::Set { name, value, max_age } => format_cookie(name, value, *max_age),
        CookieChange::SetSigned { name, value } => {
            format_cookie(name, &verifier.sign_str(name, value), None)
        }
        CookieChange::Remove { name } => format_cookie(name, "", Some(0)),
    };

    match HeaderValue::from_str(&rendered) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::error!(error = %e, "Dropping unrepresentable cookie");
            None
        }
    }
}

fn format_cookie(name: &str, value: &str, max_age: Option<i64>) -> String {
    let mut cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", name, value);
    if let Some(max_age) = max_age {
        cookie.push_str(&format!("; Max-Age={}", max_age));
    }
    cookie
}
