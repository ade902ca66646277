//! Menu tools: profitability, price suggestions, menu engineering and
//! category performance.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::{group_by_item, percent, round1, AnalyticsInput};
use crate::types::ItemKind;

/// Margin (percent of price) the price suggestions aim for.
pub const TARGET_MARGIN_PCT: f64 = 60.0;

/// Margin above which a slow seller has room for a price cut.
pub const HEADROOM_MARGIN_PCT: f64 = 80.0;

/// Suggested prices are rounded to this many cents.
pub const PRICE_STEP_CENTS: i64 = 25;

/// Share of the fair popularity share an item needs to count as popular
/// (the Kasavana-Smith 70% rule).
pub const POPULARITY_FACTOR: f64 = 0.7;

// =============================================================================
// Profitability
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ItemProfit {
    pub kind: ItemKind,
    pub item_id: String,
    pub name: String,
    pub category: String,
    pub units: i64,
    pub revenue_cents: i64,
    pub cost_cents: i64,
    pub profit_cents: i64,
    pub margin_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ProfitabilityReport {
    /// Most profitable first.
    pub items: Vec<ItemProfit>,
    pub total_revenue_cents: i64,
    pub total_cost_cents: i64,
    pub total_profit_cents: i64,
    pub overall_margin_pct: f64,
}

/// Revenue, cost and margin per item, using the cost frozen on each sale.
pub fn profitability(input: &AnalyticsInput<'_>) -> ProfitabilityReport {
    let mut items: Vec<ItemProfit> = group_by_item(input.in_window())
        .into_iter()
        .map(|i| ItemProfit {
            margin_pct: round1(i.margin_pct()),
            profit_cents: i.profit_cents(),
            kind: i.kind,
            item_id: i.item_id,
            name: i.name,
            category: i.category,
            units: i.units,
            revenue_cents: i.revenue_cents,
            cost_cents: i.cost_cents,
        })
        .collect();
    items.sort_by(|a, b| b.profit_cents.cmp(&a.profit_cents).then_with(|| a.name.cmp(&b.name)));

    let total_revenue_cents: i64 = items.iter().map(|i| i.revenue_cents).sum();
    let total_cost_cents: i64 = items.iter().map(|i| i.cost_cents).sum();
    let total_profit_cents = total_revenue_cents - total_cost_cents;

    ProfitabilityReport {
        overall_margin_pct: round1(percent(total_profit_cents as f64, total_revenue_cents as f64)),
        items,
        total_revenue_cents,
        total_cost_cents,
        total_profit_cents,
    }
}

// =============================================================================
// Price Optimization
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PriceSuggestion {
    pub kind: ItemKind,
    pub item_id: String,
    pub name: String,
    pub current_price_cents: i64,
    pub suggested_price_cents: i64,
    pub change_pct: f64,
    pub margin_pct: f64,
    pub daily_units: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PriceOptimizationReport {
    pub target_margin_pct: f64,
    pub median_daily_units: f64,
    pub suggestions: Vec<PriceSuggestion>,
}

/// Rule-based price suggestions.
///
/// ```text
/// margin < 60%  and  volume >= median        ──► +10%  busy but thin
/// margin < 60%  and  volume <  median        ──► +5%   below target
/// margin >= 80% and  volume <  median / 2    ──► -5%   slow, has headroom
/// ```
///
/// Current price and cost come from the live menu; items no longer on the
/// menu are skipped.
pub fn price_optimization(input: &AnalyticsInput<'_>) -> PriceOptimizationReport {
    let days = input.window_days.max(1) as f64;
    let sold = group_by_item(input.in_window());

    let mut volumes: Vec<f64> = sold.iter().map(|i| i.units as f64 / days).collect();
    let median_daily_units = median(&mut volumes);

    let mut suggestions: Vec<PriceSuggestion> = sold
        .iter()
        .filter_map(|item| {
            let (price, cost) = input.current_price_and_cost(item.kind, &item.item_id)?;
            if price <= 0 {
                return None;
            }
            let daily_units = item.units as f64 / days;
            let margin = percent((price - cost) as f64, price as f64);

            let (change, reason) = if margin < TARGET_MARGIN_PCT && daily_units >= median_daily_units {
                (0.10, "High demand with a margin below target")
            } else if margin < TARGET_MARGIN_PCT {
                (0.05, "Margin below target")
            } else if margin >= HEADROOM_MARGIN_PCT && daily_units < median_daily_units / 2.0 {
                (-0.05, "Slow seller with margin headroom")
            } else {
                return None;
            };

            let suggested = round_to_step(price as f64 * (1.0 + change));
            if suggested == price {
                return None;
            }
            Some(PriceSuggestion {
                kind: item.kind,
                item_id: item.item_id.clone(),
                name: item.name.clone(),
                current_price_cents: price,
                suggested_price_cents: suggested,
                change_pct: round1(percent((suggested - price) as f64, price as f64)),
                margin_pct: round1(margin),
                daily_units: (daily_units * 100.0).round() / 100.0,
                reason: reason.to_string(),
            })
        })
        .collect();
    suggestions.sort_by(|a, b| {
        b.change_pct
            .total_cmp(&a.change_pct)
            .then_with(|| a.name.cmp(&b.name))
    });

    PriceOptimizationReport {
        target_margin_pct: TARGET_MARGIN_PCT,
        median_daily_units: (median_daily_units * 100.0).round() / 100.0,
        suggestions,
    }
}

fn round_to_step(cents: f64) -> i64 {
    (cents / PRICE_STEP_CENTS as f64).round() as i64 * PRICE_STEP_CENTS
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

// =============================================================================
// Menu Engineering
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MenuClass {
    /// Popular and profitable.
    Star,
    /// Popular, low contribution.
    Plowhorse,
    /// Profitable, unpopular.
    Puzzle,
    /// Neither.
    Dog,
}

impl MenuClass {
    fn recommendation(&self) -> &'static str {
        match self {
            MenuClass::Star => "Keep prominent and protect quality",
            MenuClass::Plowhorse => "Raise price slightly or lower pour cost",
            MenuClass::Puzzle => "Promote it: better placement or staff suggestion",
            MenuClass::Dog => "Consider removing or reworking",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct MenuItemAnalysis {
    pub kind: ItemKind,
    pub item_id: String,
    pub name: String,
    pub category: String,
    pub units: i64,
    pub popularity_pct: f64,
    /// Average profit per unit.
    pub contribution_margin_cents: i64,
    pub class: MenuClass,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct MenuEngineeringReport {
    pub popularity_threshold_pct: f64,
    pub average_contribution_cents: i64,
    pub items: Vec<MenuItemAnalysis>,
}

/// Classifies every sold item on popularity (menu mix share against 70% of
/// an even share) and contribution margin (against the unit-weighted
/// average).
pub fn menu_engineering(input: &AnalyticsInput<'_>) -> MenuEngineeringReport {
    let sold: Vec<_> = group_by_item(input.in_window())
        .into_iter()
        .filter(|i| i.units > 0)
        .collect();
    let total_units: i64 = sold.iter().map(|i| i.units).sum();
    let total_profit: i64 = sold.iter().map(|i| i.profit_cents()).sum();

    if sold.is_empty() || total_units == 0 {
        return MenuEngineeringReport {
            popularity_threshold_pct: 0.0,
            average_contribution_cents: 0,
            items: Vec::new(),
        };
    }

    let threshold_pct = 100.0 / sold.len() as f64 * POPULARITY_FACTOR;
    let average_cm = total_profit as f64 / total_units as f64;

    let mut items: Vec<MenuItemAnalysis> = sold
        .into_iter()
        .map(|i| {
            let popularity = percent(i.units as f64, total_units as f64);
            let cm = i.profit_cents() as f64 / i.units as f64;
            let class = match (popularity >= threshold_pct, cm >= average_cm) {
                (true, true) => MenuClass::Star,
                (true, false) => MenuClass::Plowhorse,
                (false, true) => MenuClass::Puzzle,
                (false, false) => MenuClass::Dog,
            };
            MenuItemAnalysis {
                popularity_pct: round1(popularity),
                contribution_margin_cents: cm.round() as i64,
                recommendation: class.recommendation().to_string(),
                class,
                kind: i.kind,
                item_id: i.item_id,
                name: i.name,
                category: i.category,
                units: i.units,
            }
        })
        .collect();
    items.sort_by_key(|i| {
        (
            match i.class {
                MenuClass::Star => 0,
                MenuClass::Puzzle => 1,
                MenuClass::Plowhorse => 2,
                MenuClass::Dog => 3,
            },
            -i.units,
        )
    });

    MenuEngineeringReport {
        popularity_threshold_pct: round1(threshold_pct),
        average_contribution_cents: average_cm.round() as i64,
        items,
    }
}

// =============================================================================
// Category Performance
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStat {
    pub category: String,
    pub units: i64,
    pub revenue_cents: i64,
    pub profit_cents: i64,
    pub revenue_share_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CategoryReport {
    pub total_revenue_cents: i64,
    /// Highest revenue first.
    pub categories: Vec<CategoryStat>,
}

pub fn category_performance(input: &AnalyticsInput<'_>) -> CategoryReport {
    let mut by_category: BTreeMap<&str, (i64, i64, i64)> = BTreeMap::new();
    for r in input.in_window() {
        let category = if r.category.trim().is_empty() {
            "Uncategorized"
        } else {
            r.category.as_str()
        };
        let entry = by_category.entry(category).or_default();
        entry.0 += r.quantity;
        entry.1 += r.line_total_cents;
        entry.2 += r.profit_cents();
    }

    let total_revenue_cents: i64 = by_category.values().map(|v| v.1).sum();
    let mut categories: Vec<CategoryStat> = by_category
        .into_iter()
        .map(|(category, (units, revenue_cents, profit_cents))| CategoryStat {
            category: category.to_string(),
            units,
            revenue_cents,
            profit_cents,
            revenue_share_pct: round1(percent(revenue_cents as f64, total_revenue_cents as f64)),
        })
        .collect();
    categories.sort_by(|a, b| b.revenue_cents.cmp(&a.revenue_cents).then_with(|| a.category.cmp(&b.category)));

    CategoryReport {
        total_revenue_cents,
        categories,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
