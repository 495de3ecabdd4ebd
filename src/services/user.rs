//! User service
//!
//! Credential store operations:
//! - Account creation with email normalization and argon2 hashing
//! - Credential checks for login
//! - Bootstrap of the first admin account on an empty database

use crate::config::BootstrapAdmin;
use crate::db::repositories::UserRepository;
use crate::models::{normalize_email, CreateUserInput, User};
use crate::services::password::{hash_password, verify_password, verify_password_for_missing_user};
use anyhow::Context;
use std::sync::Arc;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Another account already uses this address
    #[error("Email address is already registered: {0}")]
    EmailTaken(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// User service for account management and credential checks
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
}

impl UserService {
    pub fn new(user_repo: Arc<dyn UserRepository>) -> Self {
        Self { user_repo }
    }

    /// Create an account.
    ///
    /// # Errors
    ///
    /// - `ValidationError` for a malformed address or an empty password
    /// - `EmailTaken` if the normalized address is already registered
    /// - `InternalError` for database errors
    pub async fn create_user(&self, input: CreateUserInput) -> Result<User, UserServiceError> {
        validate_email(&input.email_address)?;
        validate_password(&input.password)?;

        let email_address = normalize_email(&input.email_address);
        if self
            .user_repo
            .get_by_email(&email_address)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::EmailTaken(email_address));
        }

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let user = User::new(&email_address, password_hash, input.admin);

        let created = self
            .user_repo
            .create(&user)
            .await
            .context("Failed to create user")?;

        tracing::info!(user_id = created.id, admin = created.admin, "User created");
        Ok(created)
    }

    /// Check an email/password pair.
    ///
    /// Returns `None` for an unknown address or a wrong password; both cases
    /// cost one argon2 run so they are indistinguishable by timing.
    pub async fn authenticate(
        &self,
        email_address: &str,
        password: &str,
    ) -> Result<Option<User>, UserServiceError> {
        let Some(user) = self.find_by_email(email_address).await? else {
            verify_password_for_missing_user(password);
            return Ok(None);
        };

        let valid = verify_password(password, &user.password_hash)
            .context("Failed to verify password")?;

        Ok(valid.then_some(user))
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        let user = self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?;

        Ok(user)
    }

    /// Look up a user by address, normalizing it first
    pub async fn find_by_email(&self, email_address: &str) -> Result<Option<User>, UserServiceError> {
        let user = self
            .user_repo
            .get_by_email(&normalize_email(email_address))
            .await
            .context("Failed to get user by email")?;

        Ok(user)
    }

    /// Create the configured admin account when the users table is empty.
    ///
    /// Returns the new account, or `None` when users already exist.
    pub async fn ensure_bootstrap_admin(
        &self,
        admin: &BootstrapAdmin,
    ) -> Result<Option<User>, UserServiceError> {
        let count = self.user_repo.count().await.context("Failed to count users")?;
        if count > 0 {
            return Ok(None);
        }

        let user = self
            .create_user(CreateUserInput {
                email_address: admin.email_address.clone(),
                password: admin.password.clone(),
                admin: true,
            })
            .await?;

        tracing::info!(email = %user.email_address, "Bootstrap admin account created");
        Ok(Some(user))
    }
}

fn validate_email(raw: &str) -> Result<(), UserServiceError> {
    let email = raw.trim();
    if email.is_empty() {
        return Err(UserServiceError::ValidationError(
            "Email address cannot be empty".to_string(),
        ));
    }

    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(())
        }
        _ => Err(UserServiceError::ValidationError(
            "Invalid email format".to_string(),
        )),
    }
}

/// Passwords only need to be present; there is no strength policy.
pub(crate) fn validate_password(password: &str) -> Result<(), UserServiceError> {
    if password.is_empty() {
        return Err(UserServiceError::ValidationError(
            "Password cannot be empty".to_string(),
        ));
    }
    Ok(())
}
