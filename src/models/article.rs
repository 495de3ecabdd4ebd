//! Article model
//!
//! This module provides:
//! - `Article` entity with its [`PublishState`]
//! - Input types for creating and updating articles
//! - `ArticleCounts` for the admin dashboard

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::publish::{PublishState, PublishedAtInput};

/// Article entity
#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    /// Unique identifier
    pub id: i64,
    /// Article title
    pub title: String,
    /// Body text
    pub content: String,
    /// Draft or published-at
    pub publish: PublishState,
    /// Owning user ID
    pub user_id: i64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Article {
    /// A new draft owned by `user_id`, not yet persisted.
    pub fn new(title: String, content: String, user_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            id: 0, // Will be set by database
            title,
            content,
            publish: PublishState::Draft,
            user_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_published(&self) -> bool {
        self.publish.is_published()
    }

    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.publish.published_at()
    }
}

impl Serialize for Article {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Article", 8)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("title", &self.title)?;
        state.serialize_field("content", &self.content)?;
        state.serialize_field("is_published", &self.is_published())?;
        state.serialize_field("published_at", &self.published_at())?;
        state.serialize_field("user_id", &self.user_id)?;
        state.serialize_field("created_at", &self.created_at)?;
        state.serialize_field("updated_at", &self.updated_at)?;
        state.end()
    }
}

/// Input for creating a new article. The owner comes from the session.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateArticleInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub is_published: Option<bool>,
    #[serde(default)]
    pub published_at: Option<PublishedAtInput>,
}

/// Input for updating an existing article.
///
/// Ownership is not part of this type; it only changes through set-owner.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateArticleInput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub is_published: Option<bool>,
    #[serde(default)]
    pub published_at: Option<PublishedAtInput>,
}

impl UpdateArticleInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_is_published(mut self, is_published: bool) -> Self {
        self.is_published = Some(is_published);
        self
    }

    pub fn with_published_at(mut self, published_at: PublishedAtInput) -> Self {
        self.published_at = Some(published_at);
        self
    }
}

impl From<CreateArticleInput> for UpdateArticleInput {
    fn from(input: CreateArticleInput) -> Self {
        Self {
            title: Some(input.title),
            content: Some(input.content),
            is_published: input.is_published,
            published_at: input.published_at,
        }
    }
}

/// Article totals shown on the dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArticleCounts {
    pub total: i64,
    pub published: i64,
    pub drafts: i64,
}

/// Accepts `true`/`false`, `1`/`0` and their string forms, as sent by
/// HTML checkboxes and JSON clients alike.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Str(String),
    }

    match Option::<Flag>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Flag::Bool(b)) => Ok(Some(b)),
        Some(Flag::Int(0)) => Ok(Some(false)),
        Some(Flag::Int(1)) => Ok(Some(true)),
        Some(Flag::Str(s)) => match s.trim() {
            "" => Ok(None),
            "1" | "true" | "on" => Ok(Some(true)),
            "0" | "false" | "off" => Ok(Some(false)),
            other => Err(serde::de::Error::custom(format!(
                "invalid boolean value '{}'",
                other
            ))),
        },
        Some(Flag::Int(n)) => Err(serde::de::Error::custom(format!(
            "invalid boolean value '{}'",
            n
        ))),
    }
}
