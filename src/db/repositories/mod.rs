//! Database repositories
//!
//! One repository per entity, each a trait plus an SQLx implementation that
//! dispatches on the configured backend.

pub mod article;
pub mod session;
pub mod user;

pub use article::{ArticleRepository, ArticleScope, SqlxArticleRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};
