//! Password reset flow
//!
//! Reset tokens are not stored. A token is a signed JSON payload carrying the
//! user ID, the issue time and a fingerprint of the password hash it was
//! issued against. Changing the password changes the fingerprint, so a token
//! works at most once.

use crate::db::repositories::UserRepository;
use crate::models::{normalize_email, User};
use crate::services::mailer::{MailSink, OutgoingMail};
use crate::services::password::hash_password;
use crate::services::signing::MessageVerifier;
use crate::services::user::{validate_password, UserServiceError};
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Signing purpose and payload tag of reset tokens
pub const RESET_TOKEN_PURPOSE: &str = "password_reset";

/// Tolerated clock skew for tokens issued "in the future"
const MAX_CLOCK_SKEW_SECONDS: i64 = 60;

/// Error types for the password reset flow
#[derive(Debug, thiserror::Error)]
pub enum PasswordResetError {
    /// Bad signature, wrong purpose, too old, unknown user or already used
    #[error("Password reset link is invalid or has expired")]
    InvalidOrExpiredToken,

    /// Password and confirmation differ
    #[error("Passwords did not match")]
    PasswordMismatch,

    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct ResetClaims {
    uid: i64,
    iat: i64,
    purpose: String,
    fp: String,
}

pub struct PasswordResetService {
    user_repo: Arc<dyn UserRepository>,
    verifier: Arc<MessageVerifier>,
    mail: Arc<dyn MailSink>,
    token_ttl: Duration,
    public_url: String,
}

impl PasswordResetService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        verifier: Arc<MessageVerifier>,
        mail: Arc<dyn MailSink>,
        token_ttl: Duration,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            user_repo,
            verifier,
            mail,
            token_ttl,
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Queue reset instructions for `email_address` if it belongs to a user.
    ///
    /// The outcome is the same whether or not the address is known.
    pub async fn request_reset(&self, email_address: &str) -> Result<(), PasswordResetError> {
        let user = self
            .user_repo
            .get_by_email(&normalize_email(email_address))
            .await
            .context("Failed to look up user for password reset")?;

        let Some(user) = user else {
            tracing::info!("Password reset requested for unknown address");
            return Ok(());
        };

        let token = self.issue_token(&user)?;
        self.mail.enqueue(OutgoingMail {
            to: user.email_address.clone(),
            subject: "Reset your password".to_string(),
            body: format!(
                "You can reset your password within the next {} minutes on this password reset page:\n\n{}/passwords/{}/edit\n\nIf you didn't request a password reset, you can safely ignore this email.\n",
                self.token_ttl.num_minutes(),
                self.public_url,
                token
            ),
        });

        tracing::info!(user_id = user.id, "Password reset instructions queued");
        Ok(())
    }

    /// Sign a fresh reset token for `user`
    pub fn issue_token(&self, user: &User) -> Result<String, PasswordResetError> {
        self.issue_token_at(user, Utc::now())
    }

    fn issue_token_at(&self, user: &User, now: DateTime<Utc>) -> Result<String, PasswordResetError> {
        let claims = ResetClaims {
            uid: user.id,
            iat: now.timestamp(),
            purpose: RESET_TOKEN_PURPOSE.to_string(),
            fp: user.password_fingerprint().to_string(),
        };
        let payload = serde_json::to_vec(&claims).context("Failed to encode reset token")?;
        Ok(self.verifier.sign(RESET_TOKEN_PURPOSE, &payload))
    }

    /// Resolve a token to its user
    pub async fn verify_token(&self, token: &str) -> Result<User, PasswordResetError> {
        self.verify_token_at(token, Utc::now()).await
    }

    async fn verify_token_at(&self, token: &str, now: DateTime<Utc>) -> Result<User, PasswordResetError> {
        let claims = self
            .verifier
            .verify(RESET_TOKEN_PURPOSE, token)
            .and_then(|payload| serde_json::from_slice::<ResetClaims>(&payload).ok())
            .ok_or(PasswordResetError::InvalidOrExpiredToken)?;

        if claims.purpose != RESET_TOKEN_PURPOSE {
            return Err(PasswordResetError::InvalidOrExpiredToken);
        }

        let age = now.timestamp() - claims.iat;
        if age > self.token_ttl.num_seconds() || age < -MAX_CLOCK_SKEW_SECONDS {
            tracing::debug!(user_id = claims.uid, age, "Expired password reset token");
            return Err(PasswordResetError::InvalidOrExpiredToken);
        }

        let user = self
            .user_repo
            .get_by_id(claims.uid)
            .await
            .context("Failed to load user for password reset")?
            .ok_or(PasswordResetError::InvalidOrExpiredToken)?;

        if user.password_fingerprint() != claims.fp {
            tracing::debug!(user_id = user.id, "Password reset token already used");
            return Err(PasswordResetError::InvalidOrExpiredToken);
        }

        Ok(user)
    }

    /// Set a new password and sign the user out everywhere.
    ///
    /// Returns the number of sessions that were revoked.
    pub async fn reset_password(
        &self,
        user: &User,
        password: &str,
        password_confirmation: &str,
    ) -> Result<u64, PasswordResetError> {
        if password != password_confirmation {
            return Err(PasswordResetError::PasswordMismatch);
        }

        validate_password(password).map_err(|e| match e {
            UserServiceError::ValidationError(msg) => PasswordResetError::ValidationError(msg),
            other => PasswordResetError::InternalError(other.into()),
        })?;

        let password_hash = hash_password(password).context("Failed to hash password")?;

        // Applies only if nobody consumed the token since it was verified
        let revoked = self
            .user_repo
            .update_password_and_revoke_sessions(user.id, &user.password_hash, &password_hash)
            .await
            .context("Failed to reset password")?
            .ok_or_else(|| {
                tracing::debug!(user_id = user.id, "Password reset token already used");
                PasswordResetError::InvalidOrExpiredToken
            })?;

        tracing::info!(user_id = user.id, revoked_sessions = revoked, "Password reset");
        Ok(revoked)
    }
}
