//! # Domain Types
//!
//! Core domain types used throughout Barback.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌───────────────┐   uses    ┌──────────────────┐                       │
//! │  │    Recipe     │──────────►│ RecipeIngredient │──► Product            │
//! │  │  (cocktail)   │           │ product_id, qty  │   (bottle, keg, ..)   │
//! │  └───────┬───────┘           └──────────────────┘         ▲             │
//! │          │ sold as                                         │ sold as     │
//! │          ▼                                                 │             │
//! │  ┌───────────────┐  settles  ┌───────────────┐   ┌─────────┴───────┐    │
//! │  │      Tab      │──────────►│     Sale      │──►│    SaleItem     │    │
//! │  │  TabItem[]    │           │ TaxComponent[]│   │ kind + item_id  │    │
//! │  └───────────────┘           └───────────────┘   └─────────────────┘    │
//! │                                                                         │
//! │  Every row carries owner_id: the user who owns the inventory.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! Sale and tab lines freeze the name, category, price and cost at the time
//! they were rung up, so later menu edits never rewrite history.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::tax::{TaxComponent, TaxRegion, TaxSettings, DEFAULT_FLAT_TAX_RATE};

// =============================================================================
// Item Kind
// =============================================================================

/// What a cart, tab or sale line refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// A stocked inventory item sold as-is (a bottle of beer).
    Product,
    /// A composite item that consumes ingredients (a cocktail).
    Recipe,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Product => "product",
            ItemKind::Recipe => "recipe",
        }
    }
}

// =============================================================================
// Product
// =============================================================================

/// An inventory item.
///
/// `quantity` is fractional because bars count open bottles and kegs in
/// partial units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub category: String,
    /// Selling price per unit, in cents.
    pub price_cents: i64,
    /// Purchase cost per unit, in cents.
    pub cost_cents: i64,
    /// Units on hand.
    pub quantity: f64,
    /// Unit label shown next to quantity ("bottle", "keg", "oz").
    pub unit: String,
    /// Restock threshold; falls back to the owner's default when absent.
    pub par_level: Option<f64>,
    pub sku: Option<String>,
    /// Soft-delete flag.
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    #[inline]
    pub fn cost(&self) -> Money {
        Money::from_cents(self.cost_cents)
    }

    /// Whether stock is at or below the product's par level, or the owner's
    /// default threshold when the product has none.
    pub fn is_low_stock(&self, default_threshold: f64) -> bool {
        self.quantity <= self.par_level.unwrap_or(default_threshold)
    }

    /// Can `required` units be taken from stock?
    pub fn can_supply(&self, required: f64, allow_negative_stock: bool) -> bool {
        allow_negative_stock || self.quantity + f64::EPSILON >= required
    }
}

// =============================================================================
// Recipe
// =============================================================================

/// One ingredient line of a recipe: `quantity` units of `product_id` per
/// recipe sold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RecipeIngredient {
    pub recipe_id: String,
    pub product_id: String,
    pub quantity: f64,
}

/// A composite sellable item (a cocktail, a pitcher, a food plate).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub category: String,
    pub price_cents: i64,
    pub description: Option<String>,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub ingredients: Vec<RecipeIngredient>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Recipe {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Cost of one serving from current ingredient costs, rounded to cents.
    ///
    /// Ingredients whose product is missing from `products` count as free.
    pub fn cost_cents<'a, F>(&self, mut product: F) -> i64
    where
        F: FnMut(&str) -> Option<&'a Product>,
    {
        let cost: f64 = self
            .ingredients
            .iter()
            .filter_map(|ing| product(&ing.product_id).map(|p| p.cost_cents as f64 * ing.quantity))
            .sum();
        cost.round() as i64
    }
}

// =============================================================================
// Sale
// =============================================================================

/// The status of a recorded sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Paid and final.
    Completed,
    /// Cancelled after the fact; stock was returned.
    Voided,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Completed => "completed",
            SaleStatus::Voided => "voided",
        }
    }
}

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash; change is computed from the tendered amount.
    Cash,
    /// Card run on a standalone terminal outside the app.
    Card,
    /// Card collected through Stripe Terminal (carries a payment intent id).
    Terminal,
}

/// A completed (or voided) sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    pub id: String,
    pub owner_id: String,
    pub receipt_number: String,
    pub status: SaleStatus,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub tax_region: TaxRegion,
    /// Named tax components as computed at checkout (unrounded).
    pub tax_breakdown: Vec<TaxComponent>,
    pub payment_method: PaymentMethod,
    pub tendered_cents: Option<i64>,
    pub change_cents: Option<i64>,
    pub payment_intent_id: Option<String>,
    /// Set when the sale settled a tab.
    pub tab_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub voided_at: Option<DateTime<Utc>>,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// A line item in a sale, frozen at the time of sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub kind: ItemKind,
    pub item_id: String,
    pub name_snapshot: String,
    pub category: String,
    pub unit_price_cents: i64,
    /// Unit cost at time of sale; recipe cost is the sum of its ingredients.
    pub unit_cost_cents: i64,
    pub quantity: i64,
    pub line_total_cents: i64,
}

/// A sale with its lines, as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleWithItems {
    #[serde(flatten)]
    pub sale: Sale,
    pub items: Vec<SaleItem>,
}

/// A flattened completed sale line: the input shape for analytics and
/// sales export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleRecord {
    pub sale_id: String,
    pub receipt_number: String,
    pub kind: ItemKind,
    pub item_id: String,
    pub name: String,
    pub category: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub unit_cost_cents: i64,
    pub line_total_cents: i64,
    #[ts(as = "String")]
    pub sold_at: DateTime<Utc>,
}

impl SaleRecord {
    /// Gross profit of the line in cents.
    #[inline]
    pub fn profit_cents(&self) -> i64 {
        self.line_total_cents - self.unit_cost_cents * self.quantity
    }
}

// =============================================================================
// Tabs
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TabStatus {
    /// Running; items can be added.
    Open,
    /// Settled by a sale.
    Closed,
    /// Abandoned without payment.
    Cancelled,
}

impl TabStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TabStatus::Open => "open",
            TabStatus::Closed => "closed",
            TabStatus::Cancelled => "cancelled",
        }
    }

    /// Parses the `?status=` query value.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Some(TabStatus::Open),
            "closed" => Some(TabStatus::Closed),
            "cancelled" | "canceled" => Some(TabStatus::Cancelled),
            _ => None,
        }
    }
}

/// An open, running bill for a named customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: String,
    pub owner_id: String,
    pub customer_name: String,
    pub status: TabStatus,
    /// Sale that settled the tab.
    pub sale_id: Option<String>,
    #[ts(as = "String")]
    pub opened_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub items: Vec<TabItem>,
}

impl Tab {
    #[inline]
    pub fn is_open(&self) -> bool {
        self.status == TabStatus::Open
    }

    /// Running pre-tax total.
    pub fn subtotal(&self) -> Money {
        self.items
            .iter()
            .map(|i| Money::from_cents(i.unit_price_cents).multiply_quantity(i.quantity))
            .sum()
    }
}

/// A line rung up on a tab, price frozen when added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct TabItem {
    pub id: String,
    pub tab_id: String,
    pub kind: ItemKind,
    pub item_id: String,
    pub name: String,
    pub category: String,
    pub unit_price_cents: i64,
    pub quantity: i64,
    #[ts(as = "String")]
    pub added_at: DateTime<Utc>,
}

// =============================================================================
// Users
// =============================================================================

/// An account. Each user owns their own inventory, menu and sales.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    /// Argon2 PHC string. Never serialized.
    #[serde(skip)]
    #[ts(skip)]
    pub password_hash: String,
    /// Base32 TOTP secret, present once 2FA setup has started.
    #[serde(skip)]
    #[ts(skip)]
    pub totp_secret: Option<String>,
    pub totp_enabled: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Per-owner Stripe Terminal credentials.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StripeAccount {
    pub owner_id: String,
    pub secret_key: String,
    pub location_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl StripeAccount {
    /// `sk_live_…abcd` style preview that is safe to show in the UI.
    pub fn masked_key(&self) -> String {
        let key = self.secret_key.as_str();
        let prefix: String = key.chars().take(8).collect();
        let suffix: String = key
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        if key.chars().count() <= 12 {
            return "****".to_string();
        }
        format!("{}…{}", prefix, suffix)
    }
}

// =============================================================================
// Settings
// =============================================================================

/// Settings keys in the key-value store.
pub mod setting_keys {
    pub const TAX_REGION: &str = "tax_region";
    pub const TAX_RATE: &str = "tax_rate";
    pub const CURRENCY: &str = "currency";
    pub const BUSINESS_NAME: &str = "business_name";
    pub const LOW_STOCK_THRESHOLD: &str = "low_stock_threshold";
    pub const ALLOW_NEGATIVE_STOCK: &str = "allow_negative_stock";
    pub const UTC_OFFSET_MINUTES: &str = "utc_offset_minutes";
}

/// Typed view over an owner's key-value settings.
///
/// Unknown keys are ignored and unparsable values fall back to defaults, so
/// a bad write never locks an owner out of checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub tax_region: TaxRegion,
    /// Percent used by the flat-rate region.
    pub tax_rate: f64,
    pub currency: String,
    pub business_name: String,
    /// Low-stock threshold for products without a par level.
    pub low_stock_threshold: f64,
    pub allow_negative_stock: bool,
    /// Offset applied when bucketing sales by hour and weekday.
    pub utc_offset_minutes: i32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            tax_region: TaxRegion::Flat,
            tax_rate: DEFAULT_FLAT_TAX_RATE,
            currency: "CAD".to_string(),
            business_name: "My Bar".to_string(),
            low_stock_threshold: 5.0,
            allow_negative_stock: false,
            utc_offset_minutes: 0,
        }
    }
}

impl Settings {
    /// Builds settings from stored key-value pairs.
    pub fn from_pairs(pairs: &BTreeMap<String, String>) -> Self {
        use setting_keys::*;

        let mut settings = Settings::default();
        if let Some(v) = pairs.get(TAX_REGION) {
            settings.tax_region = TaxRegion::parse(v);
        }
        if let Some(v) = pairs.get(TAX_RATE).and_then(|v| v.parse::<f64>().ok()) {
            if v.is_finite() && (0.0..=100.0).contains(&v) {
                settings.tax_rate = v;
            }
        }
        if let Some(v) = pairs.get(CURRENCY).filter(|v| !v.trim().is_empty()) {
            settings.currency = v.trim().to_uppercase();
        }
        if let Some(v) = pairs.get(BUSINESS_NAME).filter(|v| !v.trim().is_empty()) {
            settings.business_name = v.trim().to_string();
        }
        if let Some(v) = pairs.get(LOW_STOCK_THRESHOLD).and_then(|v| v.parse::<f64>().ok()) {
            if v.is_finite() && v >= 0.0 {
                settings.low_stock_threshold = v;
            }
        }
        if let Some(v) = pairs.get(ALLOW_NEGATIVE_STOCK).and_then(|v| v.parse::<bool>().ok()) {
            settings.allow_negative_stock = v;
        }
        if let Some(v) = pairs.get(UTC_OFFSET_MINUTES).and_then(|v| v.parse::<i32>().ok()) {
            if (-14 * 60..=14 * 60).contains(&v) {
                settings.utc_offset_minutes = v;
            }
        }
        settings
    }

    /// Flattens settings back into key-value pairs for storage.
    pub fn to_pairs(&self) -> BTreeMap<String, String> {
        use setting_keys::*;

        let mut pairs = BTreeMap::new();
        pairs.insert(TAX_REGION.to_string(), self.tax_region.as_str().to_string());
        pairs.insert(TAX_RATE.to_string(), self.tax_rate.to_string());
        pairs.insert(CURRENCY.to_string(), self.currency.clone());
        pairs.insert(BUSINESS_NAME.to_string(), self.business_name.clone());
        pairs.insert(LOW_STOCK_THRESHOLD.to_string(), self.low_stock_threshold.to_string());
        pairs.insert(ALLOW_NEGATIVE_STOCK.to_string(), self.allow_negative_stock.to_string());
        pairs.insert(UTC_OFFSET_MINUTES.to_string(), self.utc_offset_minutes.to_string());
        pairs
    }

    /// The subset the tax calculator needs.
    pub fn tax_settings(&self) -> TaxSettings {
        TaxSettings {
            region: self.tax_region,
            flat_rate_percent: self.tax_rate,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str, cost_cents: i64, quantity: f64, par: Option<f64>) -> Product {
        let now = Utc::now();
        Product {
            id: id.to_string(),
            owner_id: "owner".to_string(),
            name: id.to_string(),
            category: "Spirits".to_string(),
            price_cents: 900,
            cost_cents,
            quantity,
            unit: "bottle".to_string(),
            par_level: par,
            sku: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_low_stock_uses_par_then_default() {
        assert!(product("gin", 100, 2.0, Some(3.0)).is_low_stock(1.0));
        assert!(!product("gin", 100, 4.0, Some(3.0)).is_low_stock(10.0));
        assert!(product("rum", 100, 4.0, None).is_low_stock(5.0));
    }

    #[test]
    fn test_can_supply() {
        let p = product("gin", 100, 1.5, None);
        assert!(p.can_supply(1.5, false));
        assert!(!p.can_supply(2.0, false));
        assert!(p.can_supply(2.0, true));
    }

    #[test]
    fn test_recipe_cost_from_ingredients() {
        let gin = product("gin", 2000, 3.0, None);
        let tonic = product("tonic", 150, 10.0, None);
        let now = Utc::now();
        let recipe = Recipe {
            id: "gt".to_string(),
            owner_id: "owner".to_string(),
            name: "Gin & Tonic".to_string(),
            category: "Cocktails".to_string(),
            price_cents: 1100,
            description: None,
            ingredients: vec![
                RecipeIngredient {
                    recipe_id: "gt".to_string(),
                    product_id: "gin".to_string(),
                    quantity: 0.05,
                },
                RecipeIngredient {
                    recipe_id: "gt".to_string(),
                    product_id: "tonic".to_string(),
                    quantity: 1.0,
                },
                RecipeIngredient {
                    recipe_id: "gt".to_string(),
                    product_id: "missing".to_string(),
                    quantity: 1.0,
                },
            ],
            created_at: now,
            updated_at: now,
        };

        let products = [gin, tonic];
        let cost = recipe.cost_cents(|id| products.iter().find(|p| p.id == id));
        assert_eq!(cost, 250);
    }

    #[test]
    fn test_settings_round_trip_through_pairs() {
        let settings = Settings {
            tax_region: TaxRegion::Quebec,
            tax_rate: 9.5,
            currency: "CAD".to_string(),
            business_name: "Le Zinc".to_string(),
            low_stock_threshold: 2.0,
            allow_negative_stock: true,
            utc_offset_minutes: -300,
        };
        assert_eq!(Settings::from_pairs(&settings.to_pairs()), settings);
    }

    #[test]
    fn test_settings_ignore_bad_values() {
        let mut pairs = BTreeMap::new();
        pairs.insert("tax_rate".to_string(), "lots".to_string());
        pairs.insert("tax_region".to_string(), "atlantis".to_string());
        pairs.insert("utc_offset_minutes".to_string(), "99999".to_string());
        pairs.insert("unknown".to_string(), "x".to_string());

        let settings = Settings::from_pairs(&pairs);
        assert_eq!(settings.tax_rate, DEFAULT_FLAT_TAX_RATE);
        assert_eq!(settings.tax_region, TaxRegion::Flat);
        assert_eq!(settings.utc_offset_minutes, 0);
    }

    #[test]
    fn test_masked_stripe_key() {
        let account = StripeAccount {
            owner_id: "o".to_string(),
            secret_key: "sk_test_51Habcdefghijkl1234".to_string(),
            location_id: None,
            updated_at: Utc::now(),
        };
        assert_eq!(account.masked_key(), "sk_test_…1234");

        let short = StripeAccount {
            secret_key: "sk_x".to_string(),
            ..account
        };
        assert_eq!(short.masked_key(), "****");
    }

    #[test]
    fn test_tab_status_parse() {
        assert_eq!(TabStatus::parse("OPEN"), Some(TabStatus::Open));
        assert_eq!(TabStatus::parse("canceled"), Some(TabStatus::Cancelled));
        assert_eq!(TabStatus::parse("paid"), None);
    }
}
