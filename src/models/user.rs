//! User model
//!
//! A user is an email address, an argon2 password hash and an admin flag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registered user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Email address (unique, stored normalized)
    pub email_address: String,
    /// Password hash (argon2 PHC string)
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Whether the user may manage articles
    pub admin: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new, unsaved user.
    ///
    /// The password must already be hashed; see `services::password::hash_password`.
    pub fn new(email_address: &str, password_hash: String, admin: bool) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by the database
            email_address: normalize_email(email_address),
            password_hash,
            admin,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    /// Short digest of the current password hash.
    ///
    /// Embedded in reset tokens so that a token dies as soon as the
    /// password it was issued against changes.
    pub fn password_fingerprint(&self) -> &str {
        let hash = self.password_hash.as_str();
        let start = hash
            .char_indices()
            .rev()
            .nth(9)
            .map(|(idx, _)| idx)
            .unwrap_or(0);
        &hash[start..]
    }
}

/// Trim and lowercase an email address.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Input for creating a new user (before password hashing)
#[derive(Debug, Clone)]
pub struct CreateUserInput {
    pub email_address: String,
    /// Plaintext password (will be hashed)
    pub password: String,
    pub admin: bool,
}
