//! Data models
//!
//! Database entities (User, Session, Article), their input types and the
//! article publish state machine.

mod article;
pub mod publish;
mod session;
mod user;
mod validation;

pub use article::{Article, ArticleCounts, CreateArticleInput, UpdateArticleInput};
pub use publish::{ParseError, PublishState, PublishedAtInput};
pub use session::{ClientMetadata, Session};
pub use user::{normalize_email, CreateUserInput, User};
pub use validation::FieldErrors;
