//! Stock tools: reorder, slow movers, valuation and low stock.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::{percent, round1, AnalyticsInput};
use crate::reorder::{consumption_from_sales, recommend_reorders, ReorderRecommendation};
use crate::types::SaleRecord;

/// Products that moved this many units or fewer in the window are slow.
pub const SLOW_MOVER_MAX_UNITS: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ReorderReport {
    pub recommendations: Vec<ReorderRecommendation>,
}

/// The reorder heuristic over the window, with recipe sales expanded into
/// ingredient consumption.
pub fn reorder(input: &AnalyticsInput<'_>) -> ReorderReport {
    let records: Vec<SaleRecord> = input.in_window().cloned().collect();
    let consumption = consumption_from_sales(&records, input.recipes);
    ReorderReport {
        recommendations: recommend_reorders(input.products, &consumption),
    }
}

fn consumed_units(input: &AnalyticsInput<'_>) -> HashMap<String, f64> {
    let records: Vec<SaleRecord> = input.in_window().cloned().collect();
    let mut used: HashMap<String, f64> = HashMap::new();
    for c in consumption_from_sales(&records, input.recipes) {
        *used.entry(c.product_id).or_default() += c.quantity;
    }
    used
}

// =============================================================================
// Slow Movers
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SlowMover {
    pub product_id: String,
    pub name: String,
    pub category: String,
    pub quantity: f64,
    pub units_consumed: f64,
    /// Stock on hand at cost.
    pub tied_up_cost_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SlowMoversReport {
    pub total_tied_up_cents: i64,
    /// Most capital tied up first.
    pub items: Vec<SlowMover>,
}

/// Stocked products that barely moved, directly or through recipes.
pub fn slow_movers(input: &AnalyticsInput<'_>) -> SlowMoversReport {
    let used = consumed_units(input);

    let mut items: Vec<SlowMover> = input
        .products
        .iter()
        .filter(|p| p.is_active && p.quantity > 0.0)
        .filter_map(|p| {
            let units = used.get(&p.id).copied().unwrap_or(0.0);
            (units <= SLOW_MOVER_MAX_UNITS).then(|| SlowMover {
                product_id: p.id.clone(),
                name: p.name.clone(),
                category: p.category.clone(),
                quantity: p.quantity,
                units_consumed: units,
                tied_up_cost_cents: (p.quantity * p.cost_cents as f64).round() as i64,
            })
        })
        .collect();
    items.sort_by(|a, b| {
        b.tied_up_cost_cents
            .cmp(&a.tied_up_cost_cents)
            .then_with(|| a.name.cmp(&b.name))
    });

    SlowMoversReport {
        total_tied_up_cents: items.iter().map(|i| i.tied_up_cost_cents).sum(),
        items,
    }
}

// =============================================================================
// Valuation
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CategoryValuation {
    pub category: String,
    pub product_count: i64,
    pub cost_cents: i64,
    pub retail_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct InventoryValuationReport {
    pub product_count: i64,
    pub total_cost_cents: i64,
    pub total_retail_cents: i64,
    /// Retail minus cost, as a share of retail.
    pub potential_margin_pct: f64,
    pub categories: Vec<CategoryValuation>,
}

/// Stock on hand valued at cost and at menu price. Negative stock counts as
/// zero.
pub fn inventory_valuation(input: &AnalyticsInput<'_>) -> InventoryValuationReport {
    let mut by_category: BTreeMap<&str, CategoryValuation> = BTreeMap::new();
    for p in input.products.iter().filter(|p| p.is_active) {
        let on_hand = p.quantity.max(0.0);
        let entry = by_category
            .entry(p.category.as_str())
            .or_insert_with(|| CategoryValuation {
                category: p.category.clone(),
                product_count: 0,
                cost_cents: 0,
                retail_cents: 0,
            });
        entry.product_count += 1;
        entry.cost_cents += (on_hand * p.cost_cents as f64).round() as i64;
        entry.retail_cents += (on_hand * p.price_cents as f64).round() as i64;
    }

    let mut categories: Vec<CategoryValuation> = by_category.into_values().collect();
    categories.sort_by(|a, b| b.cost_cents.cmp(&a.cost_cents).then_with(|| a.category.cmp(&b.category)));

    let total_cost_cents: i64 = categories.iter().map(|c| c.cost_cents).sum();
    let total_retail_cents: i64 = categories.iter().map(|c| c.retail_cents).sum();

    InventoryValuationReport {
        product_count: categories.iter().map(|c| c.product_count).sum(),
        total_cost_cents,
        total_retail_cents,
        potential_margin_pct: round1(percent(
            (total_retail_cents - total_cost_cents) as f64,
            total_retail_cents as f64,
        )),
        categories,
    }
}

// =============================================================================
// Low Stock
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LowStockItem {
    pub product_id: String,
    pub name: String,
    pub category: String,
    pub unit: String,
    pub quantity: f64,
    /// Product par level, or the owner's default threshold.
    pub par_level: f64,
    pub shortfall: f64,
    pub out_of_stock: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LowStockReport {
    pub default_threshold: f64,
    pub items: Vec<LowStockItem>,
}

pub fn low_stock(input: &AnalyticsInput<'_>) -> LowStockReport {
    let mut items: Vec<LowStockItem> = input
        .products
        .iter()
        .filter(|p| p.is_active && p.is_low_stock(input.low_stock_threshold))
        .map(|p| {
            let par = p.par_level.unwrap_or(input.low_stock_threshold);
            LowStockItem {
                product_id: p.id.clone(),
                name: p.name.clone(),
                category: p.category.clone(),
                unit: p.unit.clone(),
                quantity: p.quantity,
                par_level: par,
                shortfall: (par - p.quantity).max(0.0),
                out_of_stock: p.quantity <= 0.0,
            }
        })
        .collect();
    items.sort_by(|a, b| a.quantity.total_cmp(&b.quantity).then_with(|| a.name.cmp(&b.name)));

    LowStockReport {
        default_threshold: input.low_stock_threshold,
        items,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::reorder::ReorderPriority;
    use crate::types::{ItemKind, Recipe, RecipeIngredient};
    use chrono::Duration;

    #[test]
    fn test_reorder_expands_recipes() {
        let gin = product("gin", "Spirits", 3000, 1500, 1.0);
        let recipe = Recipe {
            id: "gt".to_string(),
            owner_id: "owner".to_string(),
            name: "G&T".to_string(),
            category: "Cocktails".to_string(),
            price_cents: 1100,
            description: None,
            ingredients: vec![RecipeIngredient {
                recipe_id: "gt".to_string(),
                product_id: "gin".to_string(),
                quantity: 0.5,
            }],
            created_at: now(),
            updated_at: now(),
        };
        let mut sold = line("1", &gin, 4, now() - Duration::days(2));
        sold.kind = ItemKind::Recipe;
        sold.item_id = "gt".to_string();
        let records = vec![sold];
        let products = [gin];
        let recipes = [recipe];
        let mut inp = input(&records, &products, 30);
        inp.recipes = &recipes;

        let report = reorder(&inp);
        assert_eq!(report.recommendations.len(), 1);
        let rec = &report.recommendations[0];
        assert_eq!(rec.product_id, "gin");
        assert_eq!(rec.units_sold, 2.0);
        assert_eq!(rec.priority, ReorderPriority::Critical);
    }

    #[test]
    fn test_reorder_ignores_sales_outside_window() {
        let beer = product("beer", "Beer", 700, 200, 1.0);
        let records = vec![line("1", &beer, 10, now() - Duration::days(40))];
        let products = [beer];
        assert!(reorder(&input(&records, &products, 30)).recommendations.is_empty());
    }

    #[test]
    fn test_slow_movers() {
        let beer = product("beer", "Beer", 700, 200, 24.0);
        let vermouth = product("vermouth", "Spirits", 900, 1200, 3.0);
        let mezcal = product("mezcal", "Spirits", 1500, 4000, 2.0);
        let empty = product("empty", "Spirits", 1500, 4000, 0.0);
        let records = vec![
            line("1", &beer, 12, now() - Duration::days(1)),
            line("2", &vermouth, 1, now() - Duration::days(1)),
        ];
        let products = [beer, vermouth, mezcal, empty];
        let report = slow_movers(&input(&records, &products, 30));

        let ids: Vec<_> = report.items.iter().map(|i| i.product_id.as_str()).collect();
        assert_eq!(ids, vec!["mezcal", "vermouth"]);
        assert_eq!(report.items[0].tied_up_cost_cents, 8000);
        assert_eq!(report.total_tied_up_cents, 11600);
    }

    #[test]
    fn test_inventory_valuation() {
        let beer = product("beer", "Beer", 700, 200, 10.0);
        let cider = product("cider", "Beer", 800, 300, -2.0);
        let gin = product("gin", "Spirits", 3000, 1500, 1.5);
        let mut gone = product("gone", "Spirits", 3000, 1500, 100.0);
        gone.is_active = false;
        let products = [beer, cider, gin, gone];
        let report = inventory_valuation(&input(&[], &products, 30));

        assert_eq!(report.product_count, 3);
        assert_eq!(report.total_cost_cents, 2000 + 2250);
        assert_eq!(report.total_retail_cents, 7000 + 4500);
        assert_eq!(report.categories[0].category, "Spirits");
        assert_eq!(report.categories[1].product_count, 2);
    }

    #[test]
    fn test_low_stock_uses_par_level_then_default() {
        let mut limes = product("limes", "Produce", 0, 10, 8.0);
        limes.par_level = Some(10.0);
        let beer = product("beer", "Beer", 700, 200, 6.0);
        let rum = product("rum", "Spirits", 3000, 1500, 0.0);
        let products = [limes, beer, rum];
        let report = low_stock(&input(&[], &products, 30));

        let ids: Vec<_> = report.items.iter().map(|i| i.product_id.as_str()).collect();
        assert_eq!(ids, vec!["rum", "limes"]);
        assert!(report.items[0].out_of_stock);
        assert_eq!(report.items[0].shortfall, 5.0);
        assert_eq!(report.items[1].shortfall, 2.0);
    }
}
