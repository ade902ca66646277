//! # barback-db: Storage Layer for Barback
//!
//! Persistence for users, inventory, recipes, tabs, sales, settings and
//! Stripe keys, behind one object-safe [`Store`] trait.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Barback Data Flow                                │
//! │                                                                         │
//! │  HTTP handler (POST /api/sales/checkout)                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                    barback-db (THIS CRATE)                      │    │
//! │  │                                                                 │    │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐    │    │
//! │  │   │   Database    │    │    Stores     │    │  Migrations  │    │    │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │    │    │
//! │  │   │               │───►│ SqliteStore   │    │ 0001_init    │    │    │
//! │  │   │ Arc<dyn Store>│    │ MemoryStore   │    │              │    │    │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘    │    │
//! │  │                                                                 │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file (BARBACK_DB_PATH, default ./data/barback.db)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`store`] - the `Store` trait family and shared helpers
//! - [`sqlite`] - the canonical SQLite implementation
//! - [`memory`] - the in-process implementation
//! - [`pool`] - pool configuration and the shared `Database` handle
//! - [`migrations`] - embedded migrations
//! - [`error`] - database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use barback_db::{Database, DbConfig};
//!
//! let db = Database::sqlite(DbConfig::new("./data/barback.db")).await?;
//! let products = db.list_products(&user.id).await?;
//! ```

pub mod error;
pub mod memory;
pub mod migrations;
pub mod pool;
pub mod sqlite;
pub mod store;


pub use error::{DbError, DbResult};
pub use memory::MemoryStore;
pub use pool::{connect_pool, Database, DbConfig};
pub use sqlite::SqliteStore;
pub use store::{
    receipt_number, DateRange, ProductStore, RecipeStore, SaleStore, SettingsStore, StockDelta, Store,
    StripeKeyStore, TabStore, UserStore,
};
