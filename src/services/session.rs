//! Session manager
//!
//! A session is a database row plus a cookie holding its signed ID. Sessions
//! do not expire on their own; they end on logout or when the password is
//! reset.

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{ClientMetadata, Session, User};
use crate::services::signing::MessageVerifier;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Signing purpose of the session cookie
pub const SESSION_COOKIE_PURPOSE: &str = "session_id";

/// A resumed session and the user it belongs to
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    pub session: Session,
    pub user: User,
}

pub struct SessionManager {
    session_repo: Arc<dyn SessionRepository>,
    user_repo: Arc<dyn UserRepository>,
    verifier: Arc<MessageVerifier>,
}

impl SessionManager {
    pub fn new(
        session_repo: Arc<dyn SessionRepository>,
        user_repo: Arc<dyn UserRepository>,
        verifier: Arc<MessageVerifier>,
    ) -> Self {
        Self {
            session_repo,
            user_repo,
            verifier,
        }
    }

    /// Persist a new session for `user`.
    ///
    /// Returns the session and the signed value for the `session_id` cookie.
    pub async fn start_session(&self, user: &User, client: ClientMetadata) -> Result<(Session, String)> {
        let session = self
            .session_repo
            .create(&Session::new(user.id, client))
            .await
            .context("Failed to start session")?;

        let cookie_value = self.verifier.sign_str(SESSION_COOKIE_PURPOSE, &session.id);

        tracing::info!(
            user_id = user.id,
            ip = session.ip_address.as_deref().unwrap_or("unknown"),
            "Session started"
        );
        Ok((session, cookie_value))
    }

    /// Resolve a `session_id` cookie value.
    ///
    /// `None` covers a missing cookie, a bad signature and a session that no
    /// longer exists. Only database faults are errors.
    pub async fn resume_session(&self, cookie_value: Option<&str>) -> Result<Option<AuthenticatedSession>> {
        let Some(cookie_value) = cookie_value else {
            return Ok(None);
        };

        let Some(session_id) = self.verifier.verify_str(SESSION_COOKIE_PURPOSE, cookie_value) else {
            tracing::debug!("Ignoring session cookie with invalid signature");
            return Ok(None);
        };

        let Some(session) = self
            .session_repo
            .get_by_id(&session_id)
            .await
            .context("Failed to resume session")?
        else {
            return Ok(None);
        };

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to load session user")?;

        Ok(user.map(|user| AuthenticatedSession { session, user }))
    }

    /// Delete the session row
    pub async fn terminate_session(&self, session: &Session) -> Result<()> {
        self.session_repo
            .delete(&session.id)
            .await
            .context("Failed to terminate session")?;

        tracing::info!(user_id = session.user_id, "Session terminated");
        Ok(())
    }
}
