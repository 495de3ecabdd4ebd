//! Services layer - Business logic
//!
//! Services are responsible for:
//! - Implementing business rules on top of the repositories
//! - Authentication, sessions and the password reset flow
//! - Validation and error classification

pub mod article;
pub mod image_store;
pub mod mailer;
pub mod password;
pub mod password_reset;
pub mod rate_limiter;
pub mod session;
pub mod signing;
pub mod user;
pub mod visibility;

pub use article::{ArticleService, ArticleServiceError, ImageSubmission};
pub use image_store::{FsImageStore, ImageStore, ImageUpload, StoredImage};
pub use mailer::{mailer_from_config, LogMailer, MailQueue, MailSink, Mailer, OutgoingMail, SmtpMailer};
pub use password::{hash_password, verify_password};
pub use password_reset::{PasswordResetError, PasswordResetService};
pub use rate_limiter::RateLimiter;
pub use session::{AuthenticatedSession, SessionManager};
pub use signing::{generate_secret, MessageVerifier};
pub use user::{UserService, UserServiceError};
pub use visibility::VisibilityPolicy;
