//! # SQLite Store
//!
//! The canonical [`Store`]: one `SqlitePool`, runtime-checked queries,
//! split by aggregate the same way the traits are.
//!
//! - [`product`] - inventory rows and stock adjustments
//! - [`recipe`] - recipes and their ingredient lines
//! - [`sale`] - atomic checkout, void and the analytics feed
//! - [`tab`] - running tabs
//! - [`account`] - users, settings, Stripe keys

mod account;
mod product;
mod recipe;
mod sale;
mod tab;

use async_trait::async_trait;
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::error::DbResult;
use crate::store::Store;

/// SQLite-backed [`Store`].
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wraps an already migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        SqliteStore { pool }
    }

    /// The underlying pool, for the seed binary and diagnostics.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Transaction that takes the write lock at BEGIN. A deferred one that
    /// reads first fails its lock upgrade with SQLITE_BUSY, ignoring
    /// `busy_timeout`, when another connection has written since.
    pub(crate) async fn begin_write(&self) -> DbResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}
