//! Article repository
//!
//! This module provides:
//! - `ArticleRepository` trait defining the interface for article data access
//! - `SqlxArticleRepository` implementing the trait for SQLite and MySQL
//!
//! Listings are ordered by publication date, falling back to creation time
//! for drafts, newest first.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{Article, ArticleCounts, PublishState};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Which articles a query may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleScope {
    /// Drafts and published articles
    All,
    /// Published articles only
    PublishedOnly,
}

impl ArticleScope {
    fn where_clause(self) -> &'static str {
        match self {
            ArticleScope::All => "1 = 1",
            ArticleScope::PublishedOnly => "is_published = TRUE",
        }
    }
}

/// Article repository trait
#[async_trait]
pub trait ArticleRepository: Send + Sync {
    /// Insert a new article
    async fn create(&self, article: &Article) -> Result<Article>;

    /// Get article by ID regardless of publish state
    async fn get_by_id(&self, id: i64) -> Result<Option<Article>>;

    /// Get article by ID if it falls within `scope`
    async fn find_in_scope(&self, id: i64, scope: ArticleScope) -> Result<Option<Article>>;

    /// All articles within `scope`, newest first
    async fn list(&self, scope: ArticleScope) -> Result<Vec<Article>>;

    /// Save title, content and publish state
    async fn update(&self, article: &Article) -> Result<Article>;

    /// Reassign the owning user
    async fn set_owner(&self, id: i64, user_id: i64) -> Result<()>;

    /// Delete an article
    async fn delete(&self, id: i64) -> Result<()>;

    /// Totals for the dashboard
    async fn counts(&self) -> Result<ArticleCounts>;
}

/// SQLx-based article repository implementation
pub struct SqlxArticleRepository {
    pool: DynDatabasePool,
}

impl SqlxArticleRepository {
    /// Create a new SQLx article repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ArticleRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ArticleRepository for SqlxArticleRepository {
    async fn create(&self, article: &Article) -> Result<Article> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => create_article_sqlite(pool, article).await,
            Backend::Mysql(pool) => create_article_mysql(pool, article).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Article>> {
        self.find_in_scope(id, ArticleScope::All).await
    }

    async fn find_in_scope(&self, id: i64, scope: ArticleScope) -> Result<Option<Article>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => find_article_sqlite(pool, id, scope).await,
            Backend::Mysql(pool) => find_article_mysql(pool, id, scope).await,
        }
    }

    async fn list(&self, scope: ArticleScope) -> Result<Vec<Article>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => list_articles_sqlite(pool, scope).await,
            Backend::Mysql(pool) => list_articles_mysql(pool, scope).await,
        }
    }

    async fn update(&self, article: &Article) -> Result<Article> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => update_article_sqlite(pool, article).await,
            Backend::Mysql(pool) => update_article_mysql(pool, article).await,
        }
    }

    async fn set_owner(&self, id: i64, user_id: i64) -> Result<()> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => set_owner_sqlite(pool, id, user_id).await,
            Backend::Mysql(pool) => set_owner_mysql(pool, id, user_id).await,
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => delete_article_sqlite(pool, id).await,
            Backend::Mysql(pool) => delete_article_mysql(pool, id).await,
        }
    }

    async fn counts(&self) -> Result<ArticleCounts> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => counts_sqlite(pool).await,
            Backend::Mysql(pool) => counts_mysql(pool).await,
        }
    }
}

const SELECT_ARTICLE: &str = r#"
    SELECT id, title, content, is_published, published_at, user_id, created_at, updated_at
    FROM articles
"#;

const ORDER_RECENT: &str = "ORDER BY COALESCE(published_at, created_at) DESC, created_at DESC, id DESC";

const COUNTS_SQL: &str = r#"
    SELECT COUNT(*) AS total,
           COUNT(CASE WHEN is_published THEN 1 END) AS published
    FROM articles
"#;

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_article_sqlite(pool: &SqlitePool, article: &Article) -> Result<Article> {
    let result = sqlx::query(
        r#"
        INSERT INTO articles (title, content, is_published, published_at, user_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&article.title)
    .bind(&article.content)
    .bind(article.is_published())
    .bind(article.published_at())
    .bind(article.user_id)
    .bind(article.created_at)
    .bind(article.updated_at)
    .execute(pool)
    .await
    .context("Failed to create article")?;

    Ok(Article {
        id: result.last_insert_rowid(),
        ..article.clone()
    })
}

async fn find_article_sqlite(
    pool: &SqlitePool,
    id: i64,
    scope: ArticleScope,
) -> Result<Option<Article>> {
    let sql = format!("{} WHERE id = ? AND {}", SELECT_ARTICLE, scope.where_clause());
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get article by ID")?;

    row.as_ref().map(row_to_article_sqlite).transpose()
}

async fn list_articles_sqlite(pool: &SqlitePool, scope: ArticleScope) -> Result<Vec<Article>> {
    let sql = format!("{} WHERE {} {}", SELECT_ARTICLE, scope.where_clause(), ORDER_RECENT);
    let rows = sqlx::query(&sql)
        .fetch_all(pool)
        .await
        .context("Failed to list articles")?;

    rows.iter().map(row_to_article_sqlite).collect()
}

async fn update_article_sqlite(pool: &SqlitePool, article: &Article) -> Result<Article> {
    sqlx::query(
        r#"
        UPDATE articles
        SET title = ?, content = ?, is_published = ?, published_at = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&article.title)
    .bind(&article.content)
    .bind(article.is_published())
    .bind(article.published_at())
    .bind(article.updated_at)
    .bind(article.id)
    .execute(pool)
    .await
    .context("Failed to update article")?;

    Ok(article.clone())
}

async fn set_owner_sqlite(pool: &SqlitePool, id: i64, user_id: i64) -> Result<()> {
    sqlx::query("UPDATE articles SET user_id = ?, updated_at = ? WHERE id = ?")
        .bind(user_id)
        .bind(chrono::Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to set article owner")?;
    Ok(())
}

async fn delete_article_sqlite(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM articles WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete article")?;
    Ok(())
}

async fn counts_sqlite(pool: &SqlitePool) -> Result<ArticleCounts> {
    let row = sqlx::query(COUNTS_SQL)
        .fetch_one(pool)
        .await
        .context("Failed to count articles")?;
    let total: i64 = row.try_get("total")?;
    let published: i64 = row.try_get("published")?;
    Ok(ArticleCounts {
        total,
        published,
        drafts: total - published,
    })
}

fn row_to_article_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Article> {
    let publish = PublishState::from_columns(row.try_get("is_published")?, row.try_get("published_at")?)?;
    Ok(Article {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        publish,
        user_id: row.try_get("user_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_article_mysql(pool: &MySqlPool, article: &Article) -> Result<Article> {
    let result = sqlx::query(
        r#"
        INSERT INTO articles (title, content, is_published, published_at, user_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&article.title)
    .bind(&article.content)
    .bind(article.is_published())
    .bind(article.published_at())
    .bind(article.user_id)
    .bind(article.created_at)
    .bind(article.updated_at)
    .execute(pool)
    .await
    .context("Failed to create article")?;

    Ok(Article {
        id: result.last_insert_id() as i64,
        ..article.clone()
    })
}

async fn find_article_mysql(
    pool: &MySqlPool,
    id: i64,
    scope: ArticleScope,
) -> Result<Option<Article>> {
    let sql = format!("{} WHERE id = ? AND {}", SELECT_ARTICLE, scope.where_clause());
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get article by ID")?;

    row.as_ref().map(row_to_article_mysql).transpose()
}

async fn list_articles_mysql(pool: &MySqlPool, scope: ArticleScope) -> Result<Vec<Article>> {
    let sql = format!("{} WHERE {} {}", SELECT_ARTICLE, scope.where_clause(), ORDER_RECENT);
    let rows = sqlx::query(&sql)
        .fetch_all(pool)
        .await
        .context("Failed to list articles")?;

    rows.iter().map(row_to_article_mysql).collect()
}

async fn update_article_mysql(pool: &MySqlPool, article: &Article) -> Result<Article> {
    sqlx::query(
        r#"
        UPDATE articles
        SET title = ?, content = ?, is_published = ?, published_at = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&article.title)
    .bind(&article.content)
    .bind(article.is_published())
    .bind(article.published_at())
    .bind(article.updated_at)
    .bind(article.id)
    .execute(pool)
    .await
    .context("Failed to update article")?;

    Ok(article.clone())
}

async fn set_owner_mysql(pool: &MySqlPool, id: i64, user_id: i64) -> Result<()> {
    sqlx::query("UPDATE articles SET user_id = ?, updated_at = ? WHERE id = ?")
        .bind(user_id)
        .bind(chrono::Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to set article owner")?;
    Ok(())
}

async fn delete_article_mysql(pool: &MySqlPool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM articles WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete article")?;
    Ok(())
}

async fn counts_mysql(pool: &MySqlPool) -> Result<ArticleCounts> {
    let row = sqlx::query(COUNTS_SQL)
        .fetch_one(pool)
        .await
        .context("Failed to count articles")?;
    let total: i64 = row.try_get("total")?;
    let published: i64 = row.try_get("published")?;
    Ok(ArticleCounts {
        total,
        published,
        drafts: total - published,
    })
}

fn row_to_article_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Article> {
    let publish = PublishState::from_columns(row.try_get("is_published")?, row.try_get("published_at")?)?;
    Ok(Article {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        publish,
        user_id: row.try_get("user_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
