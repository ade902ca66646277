//! # Reorder Heuristic
//!
//! Flags products that will run out soon and suggests how much to order,
//! from the last [`REORDER_WINDOW_DAYS`] days of consumption.
//!
//! ## Algorithm
//! ```text
//! per product with at least one sale in the window:
//!
//!   days_active        = max(1, ceil((last_sale - first_sale) / 1 day))
//!   daily_consumption  = units_sold / days_active
//!   days_until_empty   = current_stock / daily_consumption
//!   recommended_order  = ceil(daily_consumption * 14)
//!
//!   priority  3 critical   days_until_empty < 3
//!             2 urgent     days_until_empty < 7
//!             1 important  days_until_empty < 14
//!             excluded     otherwise
//!   daily_consumption > 5  ──► priority is at least 2
//! ```
//!
//! Output is sorted by priority, most pressing first.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::{ItemKind, Product, Recipe, SaleRecord};

/// Days of sales history the heuristic looks at.
pub const REORDER_WINDOW_DAYS: i64 = 30;

/// Days of stock a recommended order should cover.
pub const REORDER_COVERAGE_DAYS: f64 = 14.0;

/// Daily consumption above which a product is always at least urgent.
pub const HIGH_VELOCITY_PER_DAY: f64 = 5.0;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

// =============================================================================
// Types
// =============================================================================

/// Units of a product taken out of stock at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumptionRecord {
    pub product_id: String,
    pub quantity: f64,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReorderPriority {
    Important = 1,
    Urgent = 2,
    Critical = 3,
}

impl ReorderPriority {
    /// Numeric level, 1 to 3.
    pub fn level(&self) -> u8 {
        *self as u8
    }

    fn from_days_until_empty(days: f64) -> Option<Self> {
        if days < 3.0 {
            Some(ReorderPriority::Critical)
        } else if days < 7.0 {
            Some(ReorderPriority::Urgent)
        } else if days < REORDER_COVERAGE_DAYS {
            Some(ReorderPriority::Important)
        } else {
            None
        }
    }
}

/// A restock suggestion for one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ReorderRecommendation {
    pub product_id: String,
    pub product_name: String,
    pub category: String,
    pub unit: String,
    pub current_stock: f64,
    pub units_sold: f64,
    pub days_active: i64,
    pub daily_consumption: f64,
    pub days_until_empty: f64,
    pub recommended_order: i64,
    pub priority: ReorderPriority,
    /// Same as `priority` as a number, for clients that sort numerically.
    pub priority_level: u8,
}

// =============================================================================
// Consumption
// =============================================================================

/// Turns sale lines into stock consumption.
///
/// Product lines consume themselves. Recipe lines consume each ingredient
/// (per-serving quantity × servings). Recipe lines whose recipe is unknown
/// are skipped.
pub fn consumption_from_sales(records: &[SaleRecord], recipes: &[Recipe]) -> Vec<ConsumptionRecord> {
    let recipes: HashMap<&str, &Recipe> = recipes.iter().map(|r| (r.id.as_str(), r)).collect();

    let mut out = Vec::with_capacity(records.len());
    for record in records {
        match record.kind {
            ItemKind::Product => out.push(ConsumptionRecord {
                product_id: record.item_id.clone(),
                quantity: record.quantity as f64,
                at: record.sold_at,
            }),
            ItemKind::Recipe => {
                if let Some(recipe) = recipes.get(record.item_id.as_str()) {
                    out.extend(recipe.ingredients.iter().map(|ing| ConsumptionRecord {
                        product_id: ing.product_id.clone(),
                        quantity: ing.quantity * record.quantity as f64,
                        at: record.sold_at,
                    }));
                }
            }
        }
    }
    out
}

// =============================================================================
// Recommendation
// =============================================================================

struct Usage {
    first: DateTime<Utc>,
    last: DateTime<Utc>,
    total: f64,
}

/// Computes reorder recommendations.
///
/// `consumption` should already be limited to the window; products without
/// consumption, unknown products and inactive products are skipped.
///
/// ## Example
/// ```rust
/// use barback_core::reorder::{recommend_reorders, ConsumptionRecord, ReorderPriority};
/// # use barback_core::Product;
/// # use chrono::{Duration, TimeZone, Utc};
/// # let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 18, 0, 0).unwrap();
/// # let product = Product {
/// #     id: "ipa".into(), owner_id: "o".into(), name: "IPA".into(),
/// #     category: "Beer".into(), price_cents: 700, cost_cents: 250,
/// #     quantity: 10.0, unit: "can".into(), par_level: None, sku: None,
/// #     is_active: true, created_at: t0, updated_at: t0,
/// # };
/// let sales = vec![
///     ConsumptionRecord { product_id: "ipa".into(), quantity: 12.0, at: t0 },
///     ConsumptionRecord { product_id: "ipa".into(), quantity: 8.0, at: t0 + Duration::days(10) },
/// ];
/// let recs = recommend_reorders(&[product], &sales);
/// assert_eq!(recs[0].daily_consumption, 2.0);
/// assert_eq!(recs[0].days_until_empty, 5.0);
/// assert_eq!(recs[0].recommended_order, 28);
/// assert_eq!(recs[0].priority, ReorderPriority::Urgent);
/// ```
pub fn recommend_reorders(products: &[Product], consumption: &[ConsumptionRecord]) -> Vec<ReorderRecommendation> {
    let mut usage: HashMap<&str, Usage> = HashMap::new();
    for record in consumption {
        usage
            .entry(record.product_id.as_str())
            .and_modify(|u| {
                u.first = u.first.min(record.at);
                u.last = u.last.max(record.at);
                u.total += record.quantity;
            })
            .or_insert(Usage {
                first: record.at,
                last: record.at,
                total: record.quantity,
            });
    }

    let mut recommendations: Vec<ReorderRecommendation> = products
        .iter()
        .filter(|p| p.is_active)
        .filter_map(|product| {
            let u = usage.get(product.id.as_str())?;
            recommend_one(product, u)
        })
        .collect();

    recommendations.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(a.days_until_empty.total_cmp(&b.days_until_empty))
            .then_with(|| a.product_name.cmp(&b.product_name))
    });
    recommendations
}

fn recommend_one(product: &Product, usage: &Usage) -> Option<ReorderRecommendation> {
    if usage.total <= 0.0 {
        return None;
    }

    let span_days = (usage.last - usage.first).num_milliseconds() as f64 / MILLIS_PER_DAY;
    let days_active = span_days.ceil().max(1.0);
    let daily_consumption = usage.total / days_active;
    let days_until_empty = product.quantity.max(0.0) / daily_consumption;
    let recommended_order = (daily_consumption * REORDER_COVERAGE_DAYS).ceil() as i64;

    let mut priority = ReorderPriority::from_days_until_empty(days_until_empty);
    if daily_consumption > HIGH_VELOCITY_PER_DAY {
        priority = Some(priority.map_or(ReorderPriority::Urgent, |p| p.max(ReorderPriority::Urgent)));
    }
    let priority = priority?;

    Some(ReorderRecommendation {
        product_id: product.id.clone(),
        product_name: product.name.clone(),
        category: product.category.clone(),
        unit: product.unit.clone(),
        current_stock: product.quantity,
        units_sold: usage.total,
        days_active: days_active as i64,
        daily_consumption,
        days_until_empty,
        recommended_order,
        priority,
        priority_level: priority.level(),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecipeIngredient;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 18, 0, 0).unwrap()
    }

    fn product(id: &str, quantity: f64) -> Product {
        Product {
            id: id.to_string(),
            owner_id: "owner".to_string(),
            name: id.to_uppercase(),
            category: "Spirits".to_string(),
            price_cents: 900,
            cost_cents: 300,
            quantity,
            unit: "bottle".to_string(),
            par_level: None,
            sku: None,
            is_active: true,
            created_at: t0(),
            updated_at: t0(),
        }
    }

    fn sold(id: &str, quantity: f64, day: i64) -> ConsumptionRecord {
        ConsumptionRecord {
            product_id: id.to_string(),
            quantity,
            at: t0() + Duration::days(day),
        }
    }

    #[test]
    fn test_ten_day_window_example() {
        let recs = recommend_reorders(
            &[product("vodka", 10.0)],
            &[sold("vodka", 5.0, 0), sold("vodka", 10.0, 4), sold("vodka", 5.0, 10)],
        );

        assert_eq!(recs.len(), 1);
        let r = &recs[0];
        assert_eq!(r.days_active, 10);
        assert_eq!(r.daily_consumption, 2.0);
        assert_eq!(r.days_until_empty, 5.0);
        assert_eq!(r.recommended_order, 28);
        assert_eq!(r.priority, ReorderPriority::Urgent);
        assert_eq!(r.priority_level, 2);
    }

    #[test]
    fn test_products_without_sales_are_excluded() {
        let recs = recommend_reorders(
            &[product("vodka", 1.0), product("gin", 0.0)],
            &[sold("vodka", 1.0, 0)],
        );
        assert!(recs.iter().all(|r| r.product_id != "gin"));
    }

    #[test]
    fn test_same_day_sales_count_one_active_day() {
        let recs = recommend_reorders(&[product("rum", 2.0)], &[sold("rum", 1.0, 0), sold("rum", 1.0, 0)]);
        assert_eq!(recs[0].days_active, 1);
        assert_eq!(recs[0].daily_consumption, 2.0);
        assert_eq!(recs[0].priority, ReorderPriority::Critical);
    }

    #[test]
    fn test_partial_days_round_up() {
        let records = vec![
            sold("rum", 3.0, 0),
            ConsumptionRecord {
                product_id: "rum".to_string(),
                quantity: 3.0,
                at: t0() + Duration::hours(30),
            },
        ];
        let recs = recommend_reorders(&[product("rum", 6.0)], &records);
        assert_eq!(recs[0].days_active, 2);
        assert_eq!(recs[0].daily_consumption, 3.0);
    }

    #[test]
    fn test_priority_thresholds() {
        // 1 unit/day over 10 days, stock decides the band
        let sales = [sold("a", 5.0, 0), sold("a", 5.0, 10)];
        let band = |stock: f64| {
            recommend_reorders(&[product("a", stock)], &sales)
                .first()
                .map(|r| r.priority)
        };
        assert_eq!(band(2.9), Some(ReorderPriority::Critical));
        assert_eq!(band(3.0), Some(ReorderPriority::Urgent));
        assert_eq!(band(6.9), Some(ReorderPriority::Urgent));
        assert_eq!(band(7.0), Some(ReorderPriority::Important));
        assert_eq!(band(13.9), Some(ReorderPriority::Important));
        assert_eq!(band(14.0), None);
    }

    #[test]
    fn test_high_velocity_forces_urgent() {
        // 60 units over 10 days = 6/day, 200 in stock is 33 days of cover
        let recs = recommend_reorders(&[product("lager", 200.0)], &[sold("lager", 30.0, 0), sold("lager", 30.0, 10)]);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].priority, ReorderPriority::Urgent);
        assert_eq!(recs[0].recommended_order, 84);

        // Already critical stays critical
        let recs = recommend_reorders(&[product("lager", 1.0)], &[sold("lager", 30.0, 0), sold("lager", 30.0, 10)]);
        assert_eq!(recs[0].priority, ReorderPriority::Critical);
    }

    #[test]
    fn test_sorted_by_priority_descending() {
        let products = [product("slow", 10.0), product("fast", 1.0), product("mid", 5.0)];
        let sales = [
            sold("slow", 5.0, 0),
            sold("slow", 5.0, 10),
            sold("fast", 5.0, 0),
            sold("fast", 5.0, 10),
            sold("mid", 5.0, 0),
            sold("mid", 5.0, 10),
        ];
        let recs = recommend_reorders(&products, &sales);
        let order: Vec<_> = recs.iter().map(|r| r.product_id.as_str()).collect();
        assert_eq!(order, vec!["fast", "mid", "slow"]);
        assert!(recs.windows(2).all(|w| w[0].priority >= w[1].priority));
    }

    #[test]
    fn test_inactive_products_skipped() {
        let mut p = product("old", 0.0);
        p.is_active = false;
        assert!(recommend_reorders(&[p], &[sold("old", 3.0, 0)]).is_empty());
    }

    #[test]
    fn test_consumption_expands_recipes() {
        let recipe = Recipe {
            id: "mojito".to_string(),
            owner_id: "owner".to_string(),
            name: "Mojito".to_string(),
            category: "Cocktails".to_string(),
            price_cents: 1100,
            description: None,
            ingredients: vec![RecipeIngredient {
                recipe_id: "mojito".to_string(),
                product_id: "rum".to_string(),
                quantity: 0.05,
            }],
            created_at: t0(),
            updated_at: t0(),
        };
        let record = |kind, item_id: &str, quantity| SaleRecord {
            sale_id: "s".to_string(),
            receipt_number: "R-1".to_string(),
            kind,
            item_id: item_id.to_string(),
            name: item_id.to_string(),
            category: "x".to_string(),
            quantity,
            unit_price_cents: 100,
            unit_cost_cents: 10,
            line_total_cents: 100 * quantity,
            sold_at: t0(),
        };

        let out = consumption_from_sales(
            &[
                record(ItemKind::Recipe, "mojito", 4),
                record(ItemKind::Product, "lime", 2),
                record(ItemKind::Recipe, "unknown", 1),
            ],
            &[recipe],
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].product_id, "rum");
        assert!((out[0].quantity - 0.2).abs() < 1e-9);
        assert_eq!(out[1].product_id, "lime");
        assert_eq!(out[1].quantity, 2.0);
    }
}
