//! Database layer
//!
//! SQLite (default, single-file deployment) and MySQL behind the
//! [`DatabasePool`] trait. The driver is picked from configuration.
//!
//! ```ignore
//! use quillpost::config::DatabaseConfig;
//! use quillpost::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, Backend, DatabasePool, DynDatabasePool, MysqlDatabase,
    SqliteDatabase,
};
