//! # Database Handle
//!
//! Pool creation for SQLite and the [`Database`] handle the server shares
//! between requests.
//!
//! ## Startup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  DbConfig::new(path)            ← pool settings                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::sqlite(config)       ← pool + migrations                     │
//! │       │                                                                 │
//! │       │   fails and fallback allowed?                                   │
//! │       ├──────────────────────────► Database::in_memory()                │
//! │       ▼                                                                 │
//! │  Database { Arc<dyn Store> }    ← cloned into every handler             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! File databases use WAL so readers never block the checkout writer.

use std::ops::Deref;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::memory::MemoryStore;
use crate::migrations;
use crate::sqlite::SqliteStore;
use crate::store::Store;

const IN_MEMORY_PATH: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// SQLite pool configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("./data/barback.db").max_connections(8);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the database file, created if missing.
    pub database_path: PathBuf,

    /// Default: 5
    pub max_connections: u32,

    /// Default: 1
    pub min_connections: u32,

    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Default: 10 minutes. Ignored for in-memory databases, which would
    /// lose their data with their last connection.
    pub idle_timeout: Duration,

    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
        }
    }

    /// A private SQLite database that lives as long as the pool. Tests use it.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(IN_MEMORY_PATH),
            // every connection would otherwise get its own empty database
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            run_migrations: true,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == IN_MEMORY_PATH
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }
}

/// Opens a pool for `config` and applies migrations when enabled.
pub async fn connect_pool(config: &DbConfig) -> DbResult<SqlitePool> {
    info!(path = %config.database_path.display(), "Initializing database connection");

    let pool = if config.is_in_memory() {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .foreign_keys(true);

        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
    } else {
        if let Some(dir) = config.database_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // off by default in SQLite
            .foreign_keys(true)
            .create_if_missing(true);

        SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
    };
    debug!(max_connections = config.max_connections, "Database pool created");

    if config.run_migrations {
        migrations::run_migrations(&pool).await?;
    }
    Ok(pool)
}

// =============================================================================
// Database
// =============================================================================

/// Shared handle to whichever [`Store`] the server started with.
///
/// Derefs to `dyn Store`, so handlers call `db.list_products(..)` directly.
#[derive(Clone)]
pub struct Database {
    store: Arc<dyn Store>,
    pool: Option<SqlitePool>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("kind", &self.store.kind()).finish()
    }
}

impl Database {
    /// Connects to SQLite and runs migrations.
    pub async fn sqlite(config: DbConfig) -> DbResult<Self> {
        let pool = connect_pool(&config).await?;
        info!("SQLite store ready");
        Ok(Database {
            store: Arc::new(SqliteStore::new(pool.clone())),
            pool: Some(pool),
        })
    }

    /// A fresh, empty in-process store.
    pub fn in_memory() -> Self {
        Database::new(Arc::new(MemoryStore::new()))
    }

    /// Wraps any store.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Database { store, pool: None }
    }

    /// The SQLite pool, when backed by SQLite.
    pub fn pool(&self) -> Option<&SqlitePool> {
        self.pool.as_ref()
    }

    /// `(embedded, applied)` migration counts; `None` for the memory store.
    pub async fn migration_status(&self) -> DbResult<Option<(usize, usize)>> {
        match &self.pool {
            Some(pool) => Ok(Some(migrations::migration_status(pool).await?)),
            None => Ok(None),
        }
    }

    /// Closes the pool. Further SQLite calls fail.
    pub async fn close(&self) {
        if let Some(pool) = &self.pool {
            info!("Closing database connection pool");
            pool.close().await;
        }
    }
}

impl Deref for Database {
    type Target = dyn Store;

    fn deref(&self) -> &Self::Target {
        self.store.as_ref()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sqlite_in_memory_database() {
        let db = Database::sqlite(DbConfig::in_memory()).await.unwrap();

        assert_eq!(db.kind(), "sqlite");
        assert!(db.health_check().await);
        let (total, applied) = db.migration_status().await.unwrap().unwrap();
        assert_eq!(total, applied);
        assert!(total >= 1);
    }

    #[tokio::test]
    async fn test_memory_database() {
        let db = Database::in_memory();
        assert_eq!(db.kind(), "memory");
        assert!(db.health_check().await);
        assert!(db.migration_status().await.unwrap().is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("/tmp/barback.db")
            .max_connections(10)
            .min_connections(2)
            .run_migrations(false);

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert!(!config.run_migrations);
        assert!(!config.is_in_memory());
        assert!(DbConfig::in_memory().is_in_memory());
    }
}
