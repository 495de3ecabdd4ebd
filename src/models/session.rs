//! Session model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One signed-in browser. Lives until logout or a password reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque session ID
    pub id: String,
    /// Associated user ID
    pub user_id: i64,
    /// Recorded for audit only
    pub user_agent: Option<String>,
    /// Recorded for audit only
    pub ip_address: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// A fresh, unsaved session for `user_id`.
    pub fn new(user_id: i64, client: ClientMetadata) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            user_agent: client.user_agent,
            ip_address: client.ip_address,
            created_at: Utc::now(),
        }
    }
}

/// Request details stored alongside a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientMetadata {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl ClientMetadata {
    /// Key used to group requests from one origin for rate limiting.
    pub fn origin_key(&self) -> String {
        self.ip_address.clone().unwrap_or_else(|| "unknown".to_string())
    }
}
