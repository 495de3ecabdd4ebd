//! Configuration management
//!
//! Configuration is loaded from a `config.yml` file and can be overridden
//! through `QUILLPOST_*` environment variables. Every value has a default,
//! so a missing or empty file yields a runnable development setup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Authentication, session and password reset settings
    #[serde(default)]
    pub auth: AuthConfig,
    /// Article image upload configuration
    #[serde(default)]
    pub upload: UploadConfig,
    /// Outbound mail configuration
    #[serde(default)]
    pub mail: MailConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (for cookie-based auth)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    /// Public base URL, used to build links in outgoing mail
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
            public_url: default_public_url(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/quillpost.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// A sliding-window request cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_max")]
    pub max_requests: usize,
    #[serde(default = "default_rate_limit_window")]
    pub window_seconds: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_rate_limit_max(),
            window_seconds: default_rate_limit_window(),
        }
    }
}

fn default_rate_limit_max() -> usize {
    10
}

fn default_rate_limit_window() -> i64 {
    180
}

/// Authentication configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Secret used to sign cookies and reset tokens.
    ///
    /// When absent an ephemeral key is generated at startup, which means
    /// sessions and reset links do not survive a restart.
    #[serde(default)]
    pub secret_key: Option<String>,
    /// How long a password reset link stays valid
    #[serde(default = "default_reset_token_ttl_minutes")]
    pub reset_token_ttl_minutes: i64,
    /// Cap on password reset requests per client
    #[serde(default)]
    pub reset_rate_limit: RateLimitConfig,
    /// Cap on login attempts per client
    #[serde(default)]
    pub login_rate_limit: RateLimitConfig,
    /// Admin account created on first start when no users exist
    #[serde(default)]
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

fn default_reset_token_ttl_minutes() -> i64 {
    15
}

/// Credentials of the first admin account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapAdmin {
    pub email_address: String,
    pub password: String,
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Upload directory path
    #[serde(default = "default_upload_path")]
    pub path: PathBuf,
    /// Maximum file size in bytes (default: 10MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Allowed image MIME types
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            path: default_upload_path(),
            max_file_size: default_max_file_size(),
            allowed_types: default_allowed_types(),
        }
    }
}

fn default_upload_path() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024 // 10MB
}

fn default_allowed_types() -> Vec<String> {
    vec![
        "image/jpeg".to_string(),
        "image/png".to_string(),
        "image/gif".to_string(),
        "image/webp".to_string(),
    ]
}

impl UploadConfig {
    /// Check if a MIME type is allowed
    pub fn is_type_allowed(&self, mime_type: &str) -> bool {
        self.allowed_types.iter().any(|t| t == mime_type)
    }

    /// Get file extension for a MIME type
    pub fn get_extension(&self, mime_type: &str) -> &'static str {
        match mime_type {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            "image/svg+xml" => "svg",
            _ => "bin",
        }
    }
}

/// Outbound mail configuration.
///
/// With `enabled: false` messages are written to the log instead of sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: String,
    #[serde(default)]
    pub smtp_password: String,
    #[serde(default = "default_mail_from")]
    pub from: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            smtp_username: String::new(),
            smtp_password: String::new(),
            from: default_mail_from(),
        }
    }
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_mail_from() -> String {
    "Quillpost <noreply@localhost>".to_string()
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist or is empty, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - QUILLPOST_SERVER_HOST
    /// - QUILLPOST_SERVER_PORT
    /// - QUILLPOST_SERVER_CORS_ORIGIN
    /// - QUILLPOST_SERVER_PUBLIC_URL
    /// - QUILLPOST_DATABASE_DRIVER
    /// - QUILLPOST_DATABASE_URL
    /// - QUILLPOST_AUTH_SECRET_KEY
    /// - QUILLPOST_MAIL_ENABLED
    /// - QUILLPOST_MAIL_SMTP_HOST
    /// - QUILLPOST_MAIL_SMTP_PASSWORD
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        // Server configuration
        if let Ok(host) = std::env::var("QUILLPOST_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("QUILLPOST_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("QUILLPOST_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }
        if let Ok(public_url) = std::env::var("QUILLPOST_SERVER_PUBLIC_URL") {
            self.server.public_url = public_url;
        }

        // Database configuration
        if let Ok(driver) = std::env::var("QUILLPOST_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("QUILLPOST_DATABASE_URL") {
            self.database.url = url;
        }

        // Auth configuration
        if let Ok(secret) = std::env::var("QUILLPOST_AUTH_SECRET_KEY") {
            if !secret.is_empty() {
                self.auth.secret_key = Some(secret);
            }
        }

        // Mail configuration
        if let Ok(enabled) = std::env::var("QUILLPOST_MAIL_ENABLED") {
            if let Ok(enabled) = enabled.parse::<bool>() {
                self.mail.enabled = enabled;
            }
        }
        if let Ok(host) = std::env::var("QUILLPOST_MAIL_SMTP_HOST") {
            self.mail.smtp_host = host;
        }
        if let Ok(password) = std::env::var("QUILLPOST_MAIL_SMTP_PASSWORD") {
            self.mail.smtp_password = password;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.reset_token_ttl_minutes <= 0 {
            return Err(ConfigError::ValidationError(
                "auth.reset_token_ttl_minutes must be positive".to_string(),
            ));
        }
        for (name, limit) in [
            ("auth.reset_rate_limit", &self.auth.reset_rate_limit),
            ("auth.login_rate_limit", &self.auth.login_rate_limit),
        ] {
            if limit.max_requests == 0 || limit.window_seconds <= 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{} needs a positive max_requests and window_seconds",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
