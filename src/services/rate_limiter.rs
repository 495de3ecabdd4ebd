//! Sliding-window rate limiter
//!
//! Counts requests per key and rejects once `max_requests` have been seen
//! within the trailing window. Used for login attempts and password reset
//! requests, keyed both by client origin and by the targeted account so that
//! rotating forwarded-for headers does not lift the cap.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::RateLimitConfig;
use crate::models::normalize_email;

/// Rate limit key for requests naming `email_address`
pub fn account_key(email_address: &str) -> String {
    format!("account:{}", normalize_email(email_address))
}

/// Per-key sliding-window rate limiter
pub struct RateLimiter {
    name: &'static str,
    max_requests: usize,
    window: Duration,
    attempts: Arc<RwLock<HashMap<String, Vec<DateTime<Utc>>>>>,
}

impl RateLimiter {
    /// Create a limiter allowing `max_requests` per `window`
    pub fn new(name: &'static str, max_requests: usize, window: Duration) -> Self {
        Self {
            name,
            max_requests,
            window,
            attempts: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn from_config(name: &'static str, config: &RateLimitConfig) -> Self {
        Self::new(name, config.max_requests, Duration::seconds(config.window_seconds))
    }

    /// Record a request for `key`. Returns `false` when the key is over the
    /// limit; rejected requests are not counted.
    pub async fn attempt(&self, key: &str) -> bool {
        self.attempt_at(key, Utc::now()).await
    }

    pub async fn attempt_at(&self, key: &str, now: DateTime<Utc>) -> bool {
        let mut attempts = self.attempts.write().await;
        let cutoff = now - self.window;

        let key_attempts = attempts.entry(key.to_string()).or_default();
        key_attempts.retain(|time| *time > cutoff);

        if key_attempts.len() >= self.max_requests {
            tracing::warn!(limiter = self.name, key = %key, "Rate limit exceeded");
            return false;
        }

        key_attempts.push(now);
        true
    }

    /// Record a request against every key. Stops at the first key over the
    /// limit; later keys are not counted then.
    pub async fn attempt_all(&self, keys: &[&str]) -> bool {
        for key in keys {
            if !self.attempt(key).await {
                return false;
            }
        }
        true
    }

    /// Forget all requests for `key`
    pub async fn clear(&self, key: &str) {
        self.attempts.write().await.remove(key);
    }

    /// Drop expired entries (called periodically)
    pub async fn cleanup(&self) {
        let cutoff = Utc::now() - self.window;
        let mut attempts = self.attempts.write().await;
        attempts.retain(|_, times| {
            times.retain(|time| *time > cutoff);
            !times.is_empty()
        });
    }

    #[cfg(test)]
    async fn tracked_keys(&self) -> usize {
        self.attempts.read().await.len()
    }
}
