//! # Store Traits
//!
//! The storage contract. The server only ever talks to `dyn Store`; which
//! implementation sits behind it is decided once at startup.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               Store                                     │
//! │   ProductStore  RecipeStore  SaleStore  TabStore                        │
//! │   UserStore     SettingsStore           StripeKeyStore                  │
//! │                                                                         │
//! │            ┌──────────────┐            ┌──────────────┐                 │
//! │            │ SqliteStore  │            │ MemoryStore  │                 │
//! │            │ (canonical)  │            │ (tests, and  │                 │
//! │            │              │            │  fallback)   │                 │
//! │            └──────────────┘            └──────────────┘                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every owned entity is scoped by `owner_id`; a row owned by somebody
//! else is reported exactly like a missing row.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use barback_core::{
    Product, Recipe, Sale, SaleItem, SaleRecord, SaleWithItems, StripeAccount, Tab, TabItem, TabStatus, User,
};

use crate::error::DbResult;

/// Stock change for one product. Negative takes stock, positive returns it.
#[derive(Debug, Clone, PartialEq)]
pub struct StockDelta {
    pub product_id: String,
    pub delta: f64,
}

/// Inclusive time range; `None` ends are open.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn since(from: DateTime<Utc>) -> Self {
        DateRange {
            from: Some(from),
            to: None,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.map_or(true, |f| at >= f) && self.to.map_or(true, |t| at <= t)
    }
}

/// Formats the `n`th receipt of an owner.
pub fn receipt_number(n: i64) -> String {
    format!("R-{:06}", n)
}

/// Sums deltas per product, keeping first-seen order.
pub(crate) fn merge_deltas(deltas: &[StockDelta]) -> Vec<StockDelta> {
    let mut merged: Vec<StockDelta> = Vec::with_capacity(deltas.len());
    for d in deltas {
        match merged.iter_mut().find(|m| m.product_id == d.product_id) {
            Some(m) => m.delta += d.delta,
            None => merged.push(d.clone()),
        }
    }
    merged
}

/// Whether taking `delta` from `available` would go below zero.
pub(crate) fn would_oversell(available: f64, delta: f64) -> bool {
    delta < 0.0 && available + delta < -1e-9
}

// =============================================================================
// Products
// =============================================================================

#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Active products, by name.
    async fn list_products(&self, owner_id: &str) -> DbResult<Vec<Product>>;

    /// An active product.
    async fn get_product(&self, owner_id: &str, id: &str) -> DbResult<Option<Product>>;

    /// Case-insensitive lookup among active products, for CSV upserts.
    async fn find_product_by_name(&self, owner_id: &str, name: &str) -> DbResult<Option<Product>>;

    async fn insert_product(&self, product: &Product) -> DbResult<()>;

    /// Overwrites every editable field. `NotFound` if the product is gone.
    async fn update_product(&self, product: &Product) -> DbResult<()>;

    /// Soft delete: the product disappears from lists but old sales and
    /// recipes still resolve it.
    async fn delete_product(&self, owner_id: &str, id: &str) -> DbResult<()>;

    async fn set_product_quantity(&self, owner_id: &str, id: &str, quantity: f64) -> DbResult<Product>;

    async fn adjust_product_quantity(&self, owner_id: &str, id: &str, delta: f64) -> DbResult<Product>;
}

// =============================================================================
// Recipes
// =============================================================================

#[async_trait]
pub trait RecipeStore: Send + Sync {
    /// Recipes with their ingredients, by name.
    async fn list_recipes(&self, owner_id: &str) -> DbResult<Vec<Recipe>>;

    async fn get_recipe(&self, owner_id: &str, id: &str) -> DbResult<Option<Recipe>>;

    async fn insert_recipe(&self, recipe: &Recipe) -> DbResult<()>;

    /// Replaces fields and the full ingredient list.
    async fn update_recipe(&self, recipe: &Recipe) -> DbResult<()>;

    async fn delete_recipe(&self, owner_id: &str, id: &str) -> DbResult<()>;
}

// =============================================================================
// Sales
// =============================================================================

#[async_trait]
pub trait SaleStore: Send + Sync {
    /// Records a completed sale in one atomic step:
    ///
    /// 1. assigns the owner's next receipt number (the incoming
    ///    `receipt_number` is ignored)
    /// 2. applies `stock`, failing with `InsufficientStock` when a product
    ///    would drop below zero and `allow_negative_stock` is false
    /// 3. inserts the sale and its items
    /// 4. when `sale.tab_id` is set, closes that tab and links the sale,
    ///    failing with `InvalidState` if the tab is not open
    ///
    /// Nothing is written if any step fails.
    async fn record_sale(
        &self,
        sale: Sale,
        items: Vec<SaleItem>,
        stock: &[StockDelta],
        allow_negative_stock: bool,
    ) -> DbResult<SaleWithItems>;

    async fn get_sale(&self, owner_id: &str, id: &str) -> DbResult<Option<SaleWithItems>>;

    /// Sales of any status in the range, newest first.
    async fn list_sales(&self, owner_id: &str, range: DateRange) -> DbResult<Vec<Sale>>;

    /// Marks a completed sale voided and returns exactly the stock it took.
    async fn void_sale(&self, owner_id: &str, id: &str) -> DbResult<Sale>;

    /// Lines of completed sales in the range, oldest first.
    async fn sale_records(&self, owner_id: &str, range: DateRange) -> DbResult<Vec<SaleRecord>>;
}

// =============================================================================
// Tabs
// =============================================================================

#[async_trait]
pub trait TabStore: Send + Sync {
    async fn open_tab(&self, tab: &Tab) -> DbResult<()>;

    /// Tabs with items, newest first.
    async fn list_tabs(&self, owner_id: &str, status: Option<TabStatus>) -> DbResult<Vec<Tab>>;

    async fn get_tab(&self, owner_id: &str, id: &str) -> DbResult<Option<Tab>>;

    /// Adds a line to an open tab. A line for the same item and unit price
    /// is merged by adding quantities.
    async fn add_tab_item(&self, owner_id: &str, item: TabItem) -> DbResult<Tab>;

    async fn remove_tab_item(&self, owner_id: &str, tab_id: &str, item_id: &str) -> DbResult<Tab>;

    async fn cancel_tab(&self, owner_id: &str, id: &str) -> DbResult<Tab>;
}

// =============================================================================
// Accounts
// =============================================================================

#[async_trait]
pub trait UserStore: Send + Sync {
    /// `UniqueViolation` on a taken username (case-insensitive).
    async fn create_user(&self, user: &User) -> DbResult<()>;

    async fn find_user_by_username(&self, username: &str) -> DbResult<Option<User>>;

    async fn get_user(&self, id: &str) -> DbResult<Option<User>>;

    async fn set_totp(&self, user_id: &str, secret: Option<&str>, enabled: bool) -> DbResult<()>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_settings(&self, owner_id: &str) -> DbResult<BTreeMap<String, String>>;

    /// Upserts the given keys; keys not present are left alone.
    async fn put_settings(&self, owner_id: &str, pairs: &BTreeMap<String, String>) -> DbResult<()>;
}

#[async_trait]
pub trait StripeKeyStore: Send + Sync {
    async fn get_stripe_account(&self, owner_id: &str) -> DbResult<Option<StripeAccount>>;

    async fn put_stripe_account(&self, account: &StripeAccount) -> DbResult<()>;
}

// =============================================================================
// Store
// =============================================================================

/// Everything the server needs from storage.
#[async_trait]
pub trait Store:
    ProductStore + RecipeStore + SaleStore + TabStore + UserStore + SettingsStore + StripeKeyStore
{
    /// `"sqlite"` or `"memory"`, reported by the health endpoint.
    fn kind(&self) -> &'static str;

    async fn health_check(&self) -> bool;
}
