//! Article service
//!
//! Implements business logic for article management:
//! - Create, update and delete with validation
//! - Publish state transitions (see [`PublishState::transition`])
//! - Visibility-scoped reads
//! - Ownership changes and image attachments

use crate::config::UploadConfig;
use crate::db::repositories::{ArticleRepository, ArticleScope, UserRepository};
use crate::models::publish::normalize;
use crate::models::{
    Article, ArticleCounts, CreateArticleInput, FieldErrors, PublishState, PublishedAtInput,
    UpdateArticleInput, User,
};
use crate::services::image_store::{ImageStore, ImageUpload, StoredImage};
use crate::services::visibility::VisibilityPolicy;
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Titles are stored in a `VARCHAR(255)` column
const MAX_TITLE_LENGTH: usize = 255;

/// Error types for article service operations
#[derive(Debug, thiserror::Error)]
pub enum ArticleServiceError {
    /// Article not found, or not visible to the viewer
    #[error("Article not found: {0}")]
    NotFound(i64),

    /// Validation error
    #[error("Validation failed: {0}")]
    ValidationError(FieldErrors),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// An image as received from the client, before validation
#[derive(Debug, Clone)]
pub struct ImageSubmission {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Article service for managing blog articles
pub struct ArticleService {
    repo: Arc<dyn ArticleRepository>,
    user_repo: Arc<dyn UserRepository>,
    images: Arc<dyn ImageStore>,
    upload_config: UploadConfig,
}

impl ArticleService {
    pub fn new(
        repo: Arc<dyn ArticleRepository>,
        user_repo: Arc<dyn UserRepository>,
        images: Arc<dyn ImageStore>,
        upload_config: UploadConfig,
    ) -> Self {
        Self {
            repo,
            user_repo,
            images,
            upload_config,
        }
    }

    /// Create an article owned by `owner`.
    ///
    /// Creation counts as a transition out of `Draft`: a published article
    /// without a date is published now.
    ///
    /// # Errors
    ///
    /// - `ValidationError` for a blank title or an unreadable `published_at`
    /// - `InternalError` for database errors
    pub async fn create(
        &self,
        owner: &User,
        input: CreateArticleInput,
    ) -> Result<Article, ArticleServiceError> {
        let now = Utc::now();
        let mut errors = FieldErrors::new();

        validate_title(&input.title, &mut errors);
        let published_at = parse_published_at(input.published_at.as_ref(), now, &mut errors);
        if !errors.is_empty() {
            return Err(ArticleServiceError::ValidationError(errors));
        }

        let mut article = Article::new(input.title, input.content, owner.id, now);
        article.publish = PublishState::Draft.transition(input.is_published, published_at, now);

        let created = self
            .repo
            .create(&article)
            .await
            .context("Failed to create article")?;

        tracing::info!(
            article_id = created.id,
            user_id = owner.id,
            published = created.is_published(),
            "Article created"
        );
        Ok(created)
    }

    /// Apply `input` to an existing article.
    ///
    /// Absent fields stay as they are. Nothing is saved when validation fails.
    pub async fn update(
        &self,
        id: i64,
        input: UpdateArticleInput,
    ) -> Result<Article, ArticleServiceError> {
        let now = Utc::now();
        let mut article = self.get_existing(id).await?;
        let mut errors = FieldErrors::new();

        if let Some(title) = &input.title {
            validate_title(title, &mut errors);
        }
        let published_at = parse_published_at(input.published_at.as_ref(), now, &mut errors);
        if !errors.is_empty() {
            return Err(ArticleServiceError::ValidationError(errors));
        }

        if let Some(title) = input.title {
            article.title = title;
        }
        if let Some(content) = input.content {
            article.content = content;
        }
        article.publish = article.publish.transition(input.is_published, published_at, now);
        article.updated_at = now;

        let updated = self
            .repo
            .update(&article)
            .await
            .context("Failed to update article")?;

        tracing::info!(
            article_id = id,
            published = updated.is_published(),
            "Article updated"
        );
        Ok(updated)
    }

    /// Delete an article and its image
    ///
    /// The row goes first. A failed purge leaves an orphaned file behind and
    /// is only logged.
    pub async fn delete(&self, id: i64) -> Result<(), ArticleServiceError> {
        self.get_existing(id).await?;

        self.repo
            .delete(id)
            .await
            .context("Failed to delete article")?;
        if let Err(e) = self.images.purge(id).await {
            tracing::warn!(article_id = id, error = ?e, "Failed to purge article image");
        }

        tracing::info!(article_id = id, "Article deleted");
        Ok(())
    }

    /// Hand the article over to another user
    pub async fn set_owner(&self, id: i64, user_id: i64) -> Result<Article, ArticleServiceError> {
        self.get_existing(id).await?;

        if self
            .user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to look up new owner")?
            .is_none()
        {
            return Err(ArticleServiceError::ValidationError(FieldErrors::single(
                "user",
                "must exist",
            )));
        }

        self.repo
            .set_owner(id, user_id)
            .await
            .context("Failed to change article owner")?;

        tracing::info!(article_id = id, user_id, "Article owner changed");
        self.get_existing(id).await
    }

    /// Validate and store the article's image, replacing any previous one
    pub async fn attach_image(
        &self,
        id: i64,
        image: ImageSubmission,
    ) -> Result<StoredImage, ArticleServiceError> {
        self.get_existing(id).await?;

        let mut errors = FieldErrors::new();
        if !self.upload_config.is_type_allowed(&image.content_type) {
            errors.add(
                "image",
                format!(
                    "has an unsupported type {}. Allowed types: {}",
                    image.content_type,
                    self.upload_config.allowed_types.join(", ")
                ),
            );
        }
        if image.data.is_empty() {
            errors.add("image", "can't be empty");
        }
        if image.data.len() as u64 > self.upload_config.max_file_size {
            errors.add(
                "image",
                format!(
                    "is too large (maximum is {} MB)",
                    self.upload_config.max_file_size / 1024 / 1024
                ),
            );
        }
        if !errors.is_empty() {
            return Err(ArticleServiceError::ValidationError(errors));
        }

        let upload = ImageUpload {
            extension: self.upload_config.get_extension(&image.content_type),
            filename: image.filename,
            content_type: image.content_type,
            data: image.data,
        };
        let stored = self
            .images
            .attach(id, upload)
            .await
            .context("Failed to store article image")?;

        Ok(stored)
    }

    /// Remove the article's image. Returns whether one was attached.
    pub async fn remove_image(&self, id: i64) -> Result<bool, ArticleServiceError> {
        self.get_existing(id).await?;

        let removed = self
            .images
            .purge(id)
            .await
            .context("Failed to remove article image")?;

        Ok(removed)
    }

    pub async fn has_image(&self, id: i64) -> Result<bool, ArticleServiceError> {
        let attached = self
            .images
            .is_attached(id)
            .await
            .context("Failed to check article image")?;

        Ok(attached)
    }

    /// Every article `viewer` may see, newest first
    pub async fn visible_to(&self, viewer: Option<&User>) -> Result<Vec<Article>, ArticleServiceError> {
        let articles = self
            .repo
            .list(VisibilityPolicy::scope_for(viewer))
            .await
            .context("Failed to list articles")?;

        Ok(articles)
    }

    /// One article, if `viewer` may see it. Hidden drafts are `NotFound`.
    pub async fn find_visible(
        &self,
        id: i64,
        viewer: Option<&User>,
    ) -> Result<Article, ArticleServiceError> {
        self.repo
            .find_in_scope(id, VisibilityPolicy::scope_for(viewer))
            .await
            .context("Failed to get article")?
            .ok_or(ArticleServiceError::NotFound(id))
    }

    /// Totals for the dashboard
    pub async fn counts(&self) -> Result<ArticleCounts, ArticleServiceError> {
        let counts = self
            .repo
            .counts()
            .await
            .context("Failed to count articles")?;

        Ok(counts)
    }

    async fn get_existing(&self, id: i64) -> Result<Article, ArticleServiceError> {
        self.repo
            .find_in_scope(id, ArticleScope::All)
            .await
            .context("Failed to get article")?
            .ok_or(ArticleServiceError::NotFound(id))
    }
}

fn validate_title(title: &str, errors: &mut FieldErrors) {
    if title.trim().is_empty() {
        errors.add("title", "can't be blank");
    } else if title.chars().count() > MAX_TITLE_LENGTH {
        errors.add(
            "title",
            format!("is too long (maximum is {} characters)", MAX_TITLE_LENGTH),
        );
    }
}

fn parse_published_at(
    input: Option<&PublishedAtInput>,
    now: DateTime<Utc>,
    errors: &mut FieldErrors,
) -> Option<DateTime<Utc>> {
    match input.map(|value| normalize(value, now)).transpose() {
        Ok(published_at) => published_at.flatten(),
        Err(e) => {
            tracing::debug!(input = %e.input, "Rejected published_at value");
            errors.add("published_at", "is not a valid date");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxArticleRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::services::image_store::MemoryImageStore;
    use chrono::{Duration, NaiveDate, TimeZone};
    use proptest::prelude::*;

    struct Fixture {
        service: ArticleService,
        images: Arc<MemoryImageStore>,
        admin: User,
        reader: User,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let admin = user_repo
            .create(&User::new("admin@example.com", "hash".to_string(), true))
            .await
            .unwrap();
        let reader = user_repo
            .create(&User::new("reader@example.com", "hash".to_string(), false))
            .await
            .unwrap();

        let images = Arc::new(MemoryImageStore::default());
        let service = ArticleService::new(
            SqlxArticleRepository::boxed(pool.clone()),
            user_repo,
            images.clone(),
            UploadConfig::default(),
        );

        Fixture {
            service,
            images,
            admin,
            reader,
        }
    }

    fn draft(title: &str) -> CreateArticleInput {
        CreateArticleInput {
            title: title.to_string(),
            content: "Body".to_string(),
            is_published: Some(false),
            published_at: None,
        }
    }

    fn published(title: &str) -> CreateArticleInput {
        CreateArticleInput {
            is_published: Some(true),
            ..draft(title)
        }
    }

    fn assert_close_to_now(at: DateTime<Utc>) {
        let delta = (Utc::now() - at).num_seconds().abs();
        assert!(delta < 5, "expected a timestamp close to now, got {}", at);
    }

    fn assert_invariant(article: &Article) {
        assert_eq!(article.is_published(), article.published_at().is_some());
    }

    // ========================================================================
    // Creation
    // ========================================================================

    #[tokio::test]
    async fn test_create_draft() {
        let f = setup().await;

        let article = f.service.create(&f.admin, draft("Hello")).await.unwrap();

        assert!(article.id > 0);
        assert_eq!(article.user_id, f.admin.id);
        assert!(!article.is_published());
        assert_eq!(article.published_at(), None);
    }

    #[tokio::test]
    async fn test_create_draft_ignores_supplied_date() {
        let f = setup().await;
        let input = CreateArticleInput {
            published_at: Some(PublishedAtInput::RawString("2024-03-01".to_string())),
            ..draft("Hello")
        };

        let article = f.service.create(&f.admin, input).await.unwrap();

        assert_eq!(article.published_at(), None);
    }

    #[tokio::test]
    async fn test_create_published_defaults_to_now() {
        let f = setup().await;

        let article = f.service.create(&f.admin, published("Hello")).await.unwrap();

        assert!(article.is_published());
        assert_close_to_now(article.published_at().unwrap());
    }

    #[tokio::test]
    async fn test_create_published_with_date() {
        let f = setup().await;
        let at = Utc.with_ymd_and_hms(2023, 5, 4, 10, 30, 0).unwrap();
        let input = CreateArticleInput {
            published_at: Some(PublishedAtInput::DateTime(at)),
            ..published("Hello")
        };

        let article = f.service.create(&f.admin, input).await.unwrap();

        assert_eq!(article.published_at(), Some(at));
    }

    #[tokio::test]
    async fn test_create_validation() {
        let f = setup().await;
        let input = CreateArticleInput {
            title: "   ".to_string(),
            published_at: Some(PublishedAtInput::RawString("next tuesday".to_string())),
            ..published("")
        };

        let err = f.service.create(&f.admin, input).await.unwrap_err();

        match err {
            ArticleServiceError::ValidationError(errors) => {
                assert!(errors.get("title").is_some());
                assert!(errors.get("published_at").is_some());
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(f.service.visible_to(Some(&f.admin)).await.unwrap().is_empty());
    }

    // ========================================================================
    // Publish transitions
    // ========================================================================

    #[tokio::test]
    async fn test_publishing_a_draft_without_date_uses_now() {
        let f = setup().await;
        let article = f.service.create(&f.admin, draft("Draft")).await.unwrap();

        let updated = f
            .service
            .update(article.id, UpdateArticleInput::new().with_is_published(true))
            .await
            .unwrap();

        assert!(updated.is_published());
        assert_close_to_now(updated.published_at().unwrap());
    }

    #[tokio::test]
    async fn test_republishing_keeps_original_date() {
        let f = setup().await;
        let two_days_ago = Utc::now() - Duration::days(2);
        let input = CreateArticleInput {
            published_at: Some(PublishedAtInput::DateTime(two_days_ago)),
            ..published("Old news")
        };
        let article = f.service.create(&f.admin, input).await.unwrap();

        let updated = f
            .service
            .update(
                article.id,
                UpdateArticleInput::new()
                    .with_is_published(true)
                    .with_published_at(PublishedAtInput::RawString(String::new())),
            )
            .await
            .unwrap();

        assert_eq!(updated.published_at(), Some(two_days_ago));
    }

    #[tokio::test]
    async fn test_unpublishing_clears_date_even_when_one_is_supplied() {
        let f = setup().await;
        let article = f.service.create(&f.admin, published("Live")).await.unwrap();

        let updated = f
            .service
            .update(
                article.id,
                UpdateArticleInput::new()
                    .with_is_published(false)
                    .with_published_at(PublishedAtInput::RawString("2024-01-01 09:00".to_string())),
            )
            .await
            .unwrap();

        assert!(!updated.is_published());
        assert_eq!(updated.published_at(), None);
    }

    #[tokio::test]
    async fn test_redating_a_published_article() {
        let f = setup().await;
        let article = f.service.create(&f.admin, published("Live")).await.unwrap();
        let date = NaiveDate::from_ymd_opt(2022, 12, 24).unwrap();

        let updated = f
            .service
            .update(
                article.id,
                UpdateArticleInput::new().with_published_at(PublishedAtInput::DateOnly(date)),
            )
            .await
            .unwrap();

        assert_eq!(updated.published_at().unwrap().date_naive(), date);
    }

    #[tokio::test]
    async fn test_unparsable_date_is_rejected_and_nothing_changes() {
        let f = setup().await;
        let article = f.service.create(&f.admin, draft("Draft")).await.unwrap();

        let result = f
            .service
            .update(
                article.id,
                UpdateArticleInput::new()
                    .with_title("Changed")
                    .with_is_published(true)
                    .with_published_at(PublishedAtInput::RawString("31/31/2024".to_string())),
            )
            .await;

        assert!(matches!(result, Err(ArticleServiceError::ValidationError(_))));
        let stored = f.service.find_visible(article.id, Some(&f.admin)).await.unwrap();
        assert_eq!(stored.title, "Draft");
        assert!(!stored.is_published());
    }

    #[tokio::test]
    async fn test_update_unknown_article() {
        let f = setup().await;
        let result = f.service.update(404, UpdateArticleInput::new()).await;
        assert!(matches!(result, Err(ArticleServiceError::NotFound(404))));
    }

    // ========================================================================
    // Visibility
    // ========================================================================

    #[tokio::test]
    async fn test_visibility_by_viewer() {
        let f = setup().await;
        let draft = f.service.create(&f.admin, draft("Secret draft")).await.unwrap();
        let live = f.service.create(&f.admin, published("Live")).await.unwrap();

        let admin_view = f.service.visible_to(Some(&f.admin)).await.unwrap();
        assert_eq!(admin_view.len(), 2);

        for viewer in [None, Some(&f.reader)] {
            let view = f.service.visible_to(viewer).await.unwrap();
            assert_eq!(view.iter().map(|a| a.id).collect::<Vec<_>>(), vec![live.id]);

            let hidden = f.service.find_visible(draft.id, viewer).await;
            assert!(matches!(hidden, Err(ArticleServiceError::NotFound(_))));
        }

        assert!(f.service.find_visible(draft.id, Some(&f.admin)).await.is_ok());
    }

    // ========================================================================
    // Ownership, deletion and images
    // ========================================================================

    #[tokio::test]
    async fn test_set_owner() {
        let f = setup().await;
        let article = f.service.create(&f.admin, draft("Mine")).await.unwrap();

        let updated = f.service.set_owner(article.id, f.reader.id).await.unwrap();
        assert_eq!(updated.user_id, f.reader.id);

        let result = f.service.set_owner(article.id, 9999).await;
        assert!(matches!(result, Err(ArticleServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_image_lifecycle() {
        let f = setup().await;
        let article = f.service.create(&f.admin, draft("Pictured")).await.unwrap();
        let png = ImageSubmission {
            filename: "cover.png".to_string(),
            content_type: "image/png".to_string(),
            data: vec![1, 2, 3],
        };

        let stored = f.service.attach_image(article.id, png).await.unwrap();
        assert_eq!(stored.content_type, "image/png");
        assert!(f.service.has_image(article.id).await.unwrap());

        assert!(f.service.remove_image(article.id).await.unwrap());
        assert!(!f.service.remove_image(article.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_attach_image_validation() {
        let f = setup().await;
        let article = f.service.create(&f.admin, draft("Pictured")).await.unwrap();
        let pdf = ImageSubmission {
            filename: "doc.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            data: vec![1],
        };

        let result = f.service.attach_image(article.id, pdf).await;

        assert!(matches!(result, Err(ArticleServiceError::ValidationError(_))));
        assert!(!f.images.is_attached(article.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_purges_image() {
        let f = setup().await;
        let article = f.service.create(&f.admin, draft("Doomed")).await.unwrap();
        f.service
            .attach_image(
                article.id,
                ImageSubmission {
                    filename: "a.gif".to_string(),
                    content_type: "image/gif".to_string(),
                    data: vec![0],
                },
            )
            .await
            .unwrap();

        f.service.delete(article.id).await.unwrap();

        assert!(!f.images.is_attached(article.id).await.unwrap());
        assert!(matches!(
            f.service.find_visible(article.id, Some(&f.admin)).await,
            Err(ArticleServiceError::NotFound(_))
        ));
        assert!(matches!(
            f.service.delete(article.id).await,
            Err(ArticleServiceError::NotFound(_))
        ));
    }

    /// Image store whose purge always fails
    struct BrokenPurge(MemoryImageStore);

    #[async_trait::async_trait]
    impl ImageStore for BrokenPurge {
        async fn attach(&self, article_id: i64, upload: ImageUpload) -> anyhow::Result<StoredImage> {
            self.0.attach(article_id, upload).await
        }

        async fn purge(&self, _article_id: i64) -> anyhow::Result<bool> {
            Err(anyhow::anyhow!("disk unavailable"))
        }

        async fn is_attached(&self, article_id: i64) -> anyhow::Result<bool> {
            self.0.is_attached(article_id).await
        }
    }

    #[tokio::test]
    async fn test_delete_removes_row_even_when_purge_fails() {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let admin = user_repo
            .create(&User::new("admin@example.com", "hash".to_string(), true))
            .await
            .unwrap();
        let service = ArticleService::new(
            SqlxArticleRepository::boxed(pool),
            user_repo,
            Arc::new(BrokenPurge(MemoryImageStore::default())),
            UploadConfig::default(),
        );

        let article = service.create(&admin, draft("Doomed")).await.unwrap();
        service.delete(article.id).await.unwrap();

        assert!(matches!(
            service.find_visible(article.id, Some(&admin)).await,
            Err(ArticleServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_title_length_limit() {
        let f = setup().await;

        let longest = "x".repeat(MAX_TITLE_LENGTH);
        assert!(f.service.create(&f.admin, draft(&longest)).await.is_ok());
        // Counted in characters, not bytes
        let accented = "é".repeat(MAX_TITLE_LENGTH);
        assert!(f.service.create(&f.admin, draft(&accented)).await.is_ok());

        let article = f.service.create(&f.admin, draft("Short")).await.unwrap();
        let too_long = "x".repeat(MAX_TITLE_LENGTH + 1);
        for result in [
            f.service.create(&f.admin, draft(&too_long)).await.map(|_| ()),
            f.service
                .update(
                    article.id,
                    UpdateArticleInput {
                        title: Some(too_long.clone()),
                        ..UpdateArticleInput::new()
                    },
                )
                .await
                .map(|_| ()),
        ] {
            match result {
                Err(ArticleServiceError::ValidationError(errors)) => assert_eq!(
                    errors.get("title").unwrap(),
                    ["is too long (maximum is 255 characters)"]
                ),
                other => panic!("expected validation error, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_counts() {
        let f = setup().await;
        f.service.create(&f.admin, draft("a")).await.unwrap();
        f.service.create(&f.admin, published("b")).await.unwrap();
        f.service.create(&f.admin, published("c")).await.unwrap();

        let counts = f.service.counts().await.unwrap();
        assert_eq!(counts, ArticleCounts { total: 3, published: 2, drafts: 1 });
    }

    // ========================================================================
    // Properties
    // ========================================================================

    fn update_strategy() -> impl Strategy<Value = UpdateArticleInput> {
        (
            proptest::option::of(any::<bool>()),
            proptest::option::of(prop_oneof![
                Just(PublishedAtInput::RawString(String::new())),
                Just(PublishedAtInput::RawString("2021-06-01".to_string())),
                Just(PublishedAtInput::RawString("2020-01-02 03:04:05".to_string())),
            ]),
        )
            .prop_map(|(is_published, published_at)| UpdateArticleInput {
                is_published,
                published_at,
                ..UpdateArticleInput::default()
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// The publish invariant holds after any sequence of updates, and
        /// non-admins never see a draft.
        #[test]
        fn prop_invariant_survives_update_sequences(
            updates in proptest::collection::vec(update_strategy(), 1..6)
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let result: Result<(), TestCaseError> = rt.block_on(async {
                let f = setup().await;
                let article = f.service.create(&f.admin, draft("Prop")).await.unwrap();

                for update in updates {
                    let updated = f.service.update(article.id, update).await.unwrap();
                    assert_invariant(&updated);

                    let public = f.service.visible_to(None).await.unwrap();
                    prop_assert!(public.iter().all(|a| a.is_published()));
                    let all = f.service.visible_to(Some(&f.admin)).await.unwrap();
                    prop_assert_eq!(all.len(), 1);
                }
                Ok(())
            });
            result?;
        }
    }
}
