//! User repository
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL

use crate::db::{Backend, DynDatabasePool};
use crate::models::User;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &User) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by (normalized) email address
    async fn get_by_email(&self, email_address: &str) -> Result<Option<User>>;

    /// Count total users
    async fn count(&self) -> Result<i64>;

    /// Replace the password hash and delete every session of the user in
    /// one transaction.
    ///
    /// Only applies while the stored hash still equals `current_hash`.
    /// Returns the number of sessions removed, or `None` when the password
    /// changed in the meantime.
    async fn update_password_and_revoke_sessions(
        &self,
        user_id: i64,
        current_hash: &str,
        password_hash: &str,
    ) -> Result<Option<u64>>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => create_user_sqlite(pool, user).await,
            Backend::Mysql(pool) => create_user_mysql(pool, user).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => get_user_by_id_sqlite(pool, id).await,
            Backend::Mysql(pool) => get_user_by_id_mysql(pool, id).await,
        }
    }

    async fn get_by_email(&self, email_address: &str) -> Result<Option<User>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => get_user_by_email_sqlite(pool, email_address).await,
            Backend::Mysql(pool) => get_user_by_email_mysql(pool, email_address).await,
        }
    }

    async fn count(&self) -> Result<i64> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => count_users_sqlite(pool).await,
            Backend::Mysql(pool) => count_users_mysql(pool).await,
        }
    }

    async fn update_password_and_revoke_sessions(
        &self,
        user_id: i64,
        current_hash: &str,
        password_hash: &str,
    ) -> Result<Option<u64>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                reset_password_sqlite(pool, user_id, current_hash, password_hash).await
            }
            Backend::Mysql(pool) => {
                reset_password_mysql(pool, user_id, current_hash, password_hash).await
            }
        }
    }
}

const SELECT_USER: &str =
    "SELECT id, email_address, password_hash, admin, created_at, updated_at FROM users";

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (email_address, password_hash, admin, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.email_address)
    .bind(&user.password_hash)
    .bind(user.admin)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn get_user_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_USER))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn get_user_by_email_sqlite(pool: &SqlitePool, email_address: &str) -> Result<Option<User>> {
    let row = sqlx::query(&format!("{} WHERE email_address = ?", SELECT_USER))
        .bind(email_address)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by email")?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn count_users_sqlite(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;
    Ok(count)
}

async fn reset_password_sqlite(
    pool: &SqlitePool,
    user_id: i64,
    current_hash: &str,
    password_hash: &str,
) -> Result<Option<u64>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let updated = sqlx::query(
        "UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ? AND password_hash = ?",
    )
    .bind(password_hash)
    .bind(Utc::now())
    .bind(user_id)
    .bind(current_hash)
    .execute(&mut *tx)
    .await
    .context("Failed to update password")?
    .rows_affected();

    if updated == 0 {
        tx.rollback().await.context("Failed to roll back password reset")?;
        return Ok(None);
    }

    let revoked = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete sessions by user")?
        .rows_affected();

    tx.commit().await.context("Failed to commit password reset")?;
    Ok(Some(revoked))
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        email_address: row.try_get("email_address")?,
        password_hash: row.try_get("password_hash")?,
        admin: row.try_get("admin")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (email_address, password_hash, admin, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.email_address)
    .bind(&user.password_hash)
    .bind(user.admin)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_id() as i64,
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn get_user_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_USER))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    row.as_ref().map(row_to_user_mysql).transpose()
}

async fn get_user_by_email_mysql(pool: &MySqlPool, email_address: &str) -> Result<Option<User>> {
    let row = sqlx::query(&format!("{} WHERE email_address = ?", SELECT_USER))
        .bind(email_address)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by email")?;

    row.as_ref().map(row_to_user_mysql).transpose()
}

async fn count_users_mysql(pool: &MySqlPool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;
    Ok(count)
}

async fn reset_password_mysql(
    pool: &MySqlPool,
    user_id: i64,
    current_hash: &str,
    password_hash: &str,
) -> Result<Option<u64>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let updated = sqlx::query(
        "UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ? AND password_hash = ?",
    )
    .bind(password_hash)
    .bind(Utc::now())
    .bind(user_id)
    .bind(current_hash)
    .execute(&mut *tx)
    .await
    .context("Failed to update password")?
    .rows_affected();

    if updated == 0 {
        tx.rollback().await.context("Failed to roll back password reset")?;
        return Ok(None);
    }

    let revoked = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete sessions by user")?
        .rows_affected();

    tx.commit().await.context("Failed to commit password reset")?;
    Ok(Some(revoked))
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        email_address: row.try_get("email_address")?,
        password_hash: row.try_get("password_hash")?,
        admin: row.try_get("admin")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
