//! # Analytics
//!
//! The dashboard's fourteen tools. Every tool is a pure aggregation over
//! completed sale lines, the product list and the recipe list.
//!
//! ## Shape of a Tool
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SaleRecord[] ─┐                                                        │
//! │  Product[]    ─┼──► AnalyticsInput { now, window_days, utc offset }     │
//! │  Recipe[]     ─┘               │                                        │
//! │                                ▼                                        │
//! │                     run(tool, &input) ──► AnalyticsData (serializable)  │
//! │                                                                         │
//! │  The server may hand the serialized data to an LLM for a narrative;     │
//! │  this module never does I/O and never reads the clock.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Tools
//! | slug                   | module        |
//! |------------------------|---------------|
//! | `insights`             | [`sales`]     |
//! | `anomalies`            | [`sales`]     |
//! | `revenue-forecast`     | [`sales`]     |
//! | `peak-hours`           | [`sales`]     |
//! | `day-of-week`          | [`sales`]     |
//! | `sales-trends`         | [`sales`]     |
//! | `profitability`        | [`menu`]      |
//! | `price-optimization`   | [`menu`]      |
//! | `menu-optimization`    | [`menu`]      |
//! | `category-performance` | [`menu`]      |
//! | `reorder`              | [`inventory`] |
//! | `slow-movers`          | [`inventory`] |
//! | `inventory-valuation`  | [`inventory`] |
//! | `low-stock`            | [`inventory`] |

pub mod inventory;
pub mod menu;
pub mod sales;

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::{ItemKind, Product, Recipe, SaleRecord};

pub use inventory::{InventoryValuationReport, LowStockReport, ReorderReport, SlowMoversReport};
pub use menu::{CategoryReport, MenuEngineeringReport, PriceOptimizationReport, ProfitabilityReport};
pub use sales::{
    AnomalyReport, DayOfWeekReport, ForecastReport, InsightsReport, PeakHoursReport, SalesTrendsReport,
};

/// Largest `?days=` window accepted.
pub const MAX_WINDOW_DAYS: i64 = 365;

// =============================================================================
// Tool Registry
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "kebab-case")]
pub enum AnalyticsTool {
    Insights,
    Reorder,
    Profitability,
    PriceOptimization,
    Anomalies,
    MenuOptimization,
    RevenueForecast,
    PeakHours,
    DayOfWeek,
    CategoryPerformance,
    SlowMovers,
    InventoryValuation,
    LowStock,
    SalesTrends,
}

impl AnalyticsTool {
    pub const ALL: [AnalyticsTool; 14] = [
        AnalyticsTool::Insights,
        AnalyticsTool::Reorder,
        AnalyticsTool::Profitability,
        AnalyticsTool::PriceOptimization,
        AnalyticsTool::Anomalies,
        AnalyticsTool::MenuOptimization,
        AnalyticsTool::RevenueForecast,
        AnalyticsTool::PeakHours,
        AnalyticsTool::DayOfWeek,
        AnalyticsTool::CategoryPerformance,
        AnalyticsTool::SlowMovers,
        AnalyticsTool::InventoryValuation,
        AnalyticsTool::LowStock,
        AnalyticsTool::SalesTrends,
    ];

    /// URL slug, e.g. `price-optimization`.
    pub fn slug(&self) -> &'static str {
        match self {
            AnalyticsTool::Insights => "insights",
            AnalyticsTool::Reorder => "reorder",
            AnalyticsTool::Profitability => "profitability",
            AnalyticsTool::PriceOptimization => "price-optimization",
            AnalyticsTool::Anomalies => "anomalies",
            AnalyticsTool::MenuOptimization => "menu-optimization",
            AnalyticsTool::RevenueForecast => "revenue-forecast",
            AnalyticsTool::PeakHours => "peak-hours",
            AnalyticsTool::DayOfWeek => "day-of-week",
            AnalyticsTool::CategoryPerformance => "category-performance",
            AnalyticsTool::SlowMovers => "slow-movers",
            AnalyticsTool::InventoryValuation => "inventory-valuation",
            AnalyticsTool::LowStock => "low-stock",
            AnalyticsTool::SalesTrends => "sales-trends",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        AnalyticsTool::ALL.into_iter().find(|t| t.slug() == slug)
    }

    /// Window used when the request does not pass `?days=`.
    pub fn default_window_days(&self) -> i64 {
        match self {
            AnalyticsTool::Anomalies => 60,
            AnalyticsTool::RevenueForecast => 28,
            AnalyticsTool::DayOfWeek => 90,
            AnalyticsTool::SalesTrends => 56,
            _ => 30,
        }
    }

    /// Days of sales history to load for a window. Insights compares
    /// against the previous window of equal length.
    pub fn history_days(&self, window_days: i64) -> i64 {
        match self {
            AnalyticsTool::Insights => window_days * 2,
            _ => window_days,
        }
    }

    /// Whether the tool's result is worth narrating with an LLM.
    pub fn supports_narrative(&self) -> bool {
        matches!(
            self,
            AnalyticsTool::Insights
                | AnalyticsTool::Profitability
                | AnalyticsTool::PriceOptimization
                | AnalyticsTool::Anomalies
                | AnalyticsTool::MenuOptimization
                | AnalyticsTool::RevenueForecast
        )
    }
}

/// Clamps a requested window to `1..=MAX_WINDOW_DAYS`, or the tool default.
pub fn resolve_window(tool: AnalyticsTool, requested: Option<i64>) -> i64 {
    requested
        .map(|d| d.clamp(1, MAX_WINDOW_DAYS))
        .unwrap_or_else(|| tool.default_window_days())
}

// =============================================================================
// Input
// =============================================================================

/// Everything a tool may read.
#[derive(Debug, Clone, Copy)]
pub struct AnalyticsInput<'a> {
    pub records: &'a [SaleRecord],
    pub products: &'a [Product],
    pub recipes: &'a [Recipe],
    pub now: DateTime<Utc>,
    pub window_days: i64,
    pub utc_offset_minutes: i32,
    pub low_stock_threshold: f64,
}

impl<'a> AnalyticsInput<'a> {
    pub fn window_start(&self) -> DateTime<Utc> {
        self.now - Duration::days(self.window_days)
    }

    /// Records sold inside `(now - window, now]`.
    pub fn in_window(&self) -> impl Iterator<Item = &'a SaleRecord> + '_ {
        let start = self.window_start();
        let now = self.now;
        self.records
            .iter()
            .filter(move |r| r.sold_at > start && r.sold_at <= now)
    }

    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    /// Calendar date of an instant in the owner's local time.
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset()).date_naive()
    }

    /// Local date of `now`.
    pub fn today(&self) -> NaiveDate {
        self.local_date(self.now)
    }

    /// The `window_days` local dates ending today, oldest first.
    pub fn window_dates(&self) -> Vec<NaiveDate> {
        let today = self.today();
        (0..self.window_days.max(1))
            .rev()
            .map(|back| today - Duration::days(back))
            .collect()
    }

    /// Zero-filled revenue per local date over [`Self::window_dates`].
    pub fn daily_revenue(&self) -> Vec<DailyRevenue> {
        let mut by_date: BTreeMap<NaiveDate, (i64, Vec<&str>)> = self
            .window_dates()
            .into_iter()
            .map(|d| (d, (0, Vec::new())))
            .collect();

        for r in self.in_window() {
            if let Some(entry) = by_date.get_mut(&self.local_date(r.sold_at)) {
                entry.0 += r.line_total_cents;
                if !entry.1.contains(&r.sale_id.as_str()) {
                    entry.1.push(r.sale_id.as_str());
                }
            }
        }

        by_date
            .into_iter()
            .map(|(date, (revenue_cents, sales))| DailyRevenue {
                date: date.format("%Y-%m-%d").to_string(),
                revenue_cents,
                transactions: sales.len() as i64,
            })
            .collect()
    }

    pub fn product(&self, id: &str) -> Option<&'a Product> {
        self.products.iter().find(|p| p.id == id)
    }

    pub fn recipe(&self, id: &str) -> Option<&'a Recipe> {
        self.recipes.iter().find(|r| r.id == id)
    }

    /// Current price and cost of a sellable item, if it still exists.
    pub fn current_price_and_cost(&self, kind: ItemKind, id: &str) -> Option<(i64, i64)> {
        match kind {
            ItemKind::Product => self.product(id).map(|p| (p.price_cents, p.cost_cents)),
            ItemKind::Recipe => self
                .recipe(id)
                .map(|r| (r.price_cents, r.cost_cents(|pid| self.product(pid)))),
        }
    }
}

// =============================================================================
// Shared Output Types
// =============================================================================

/// Revenue of one local calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DailyRevenue {
    /// `YYYY-MM-DD`
    pub date: String,
    pub revenue_cents: i64,
    pub transactions: i64,
}

/// Per-item sales totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ItemSales {
    pub kind: ItemKind,
    pub item_id: String,
    pub name: String,
    pub category: String,
    pub units: i64,
    pub revenue_cents: i64,
    pub cost_cents: i64,
}

impl ItemSales {
    pub fn profit_cents(&self) -> i64 {
        self.revenue_cents - self.cost_cents
    }

    /// Profit as a percentage of revenue; 0 for zero revenue.
    pub fn margin_pct(&self) -> f64 {
        percent(self.profit_cents() as f64, self.revenue_cents as f64)
    }
}

/// Groups sale lines by `(kind, item_id)`, sorted by revenue, highest first.
///
/// The most recent name and category win when an item was renamed.
pub fn group_by_item<'r, I>(records: I) -> Vec<ItemSales>
where
    I: IntoIterator<Item = &'r SaleRecord>,
{
    let mut grouped: HashMap<(ItemKind, &str), (ItemSales, DateTime<Utc>)> = HashMap::new();
    for r in records {
        let entry = grouped
            .entry((r.kind, r.item_id.as_str()))
            .or_insert_with(|| {
                (
                    ItemSales {
                        kind: r.kind,
                        item_id: r.item_id.clone(),
                        name: r.name.clone(),
                        category: r.category.clone(),
                        units: 0,
                        revenue_cents: 0,
                        cost_cents: 0,
                    },
                    r.sold_at,
                )
            });
        entry.0.units += r.quantity;
        entry.0.revenue_cents += r.line_total_cents;
        entry.0.cost_cents += r.unit_cost_cents * r.quantity;
        if r.sold_at > entry.1 {
            entry.0.name = r.name.clone();
            entry.0.category = r.category.clone();
            entry.1 = r.sold_at;
        }
    }

    let mut items: Vec<ItemSales> = grouped.into_values().map(|(item, _)| item).collect();
    items.sort_by(|a, b| {
        b.revenue_cents
            .cmp(&a.revenue_cents)
            .then_with(|| a.name.cmp(&b.name))
    });
    items
}

/// `part / whole * 100`, or 0 when `whole` is 0.
pub fn percent(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        0.0
    } else {
        part / whole * 100.0
    }
}

/// Rounds to one decimal place for display-friendly percentages.
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// =============================================================================
// Dispatch
// =============================================================================

/// Result of any tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(untagged)]
pub enum AnalyticsData {
    Insights(InsightsReport),
    Reorder(ReorderReport),
    Profitability(ProfitabilityReport),
    PriceOptimization(PriceOptimizationReport),
    Anomalies(AnomalyReport),
    MenuOptimization(MenuEngineeringReport),
    RevenueForecast(ForecastReport),
    PeakHours(PeakHoursReport),
    DayOfWeek(DayOfWeekReport),
    CategoryPerformance(CategoryReport),
    SlowMovers(SlowMoversReport),
    InventoryValuation(InventoryValuationReport),
    LowStock(LowStockReport),
    SalesTrends(SalesTrendsReport),
}

/// Runs one tool.
pub fn run(tool: AnalyticsTool, input: &AnalyticsInput<'_>) -> AnalyticsData {
    match tool {
        AnalyticsTool::Insights => AnalyticsData::Insights(sales::insights(input)),
        AnalyticsTool::Reorder => AnalyticsData::Reorder(inventory::reorder(input)),
        AnalyticsTool::Profitability => AnalyticsData::Profitability(menu::profitability(input)),
        AnalyticsTool::PriceOptimization => AnalyticsData::PriceOptimization(menu::price_optimization(input)),
        AnalyticsTool::Anomalies => AnalyticsData::Anomalies(sales::anomalies(input)),
        AnalyticsTool::MenuOptimization => AnalyticsData::MenuOptimization(menu::menu_engineering(input)),
        AnalyticsTool::RevenueForecast => AnalyticsData::RevenueForecast(sales::revenue_forecast(input)),
        AnalyticsTool::PeakHours => AnalyticsData::PeakHours(sales::peak_hours(input)),
        AnalyticsTool::DayOfWeek => AnalyticsData::DayOfWeek(sales::day_of_week(input)),
        AnalyticsTool::CategoryPerformance => AnalyticsData::CategoryPerformance(menu::category_performance(input)),
        AnalyticsTool::SlowMovers => AnalyticsData::SlowMovers(inventory::slow_movers(input)),
        AnalyticsTool::InventoryValuation => AnalyticsData::InventoryValuation(inventory::inventory_valuation(input)),
        AnalyticsTool::LowStock => AnalyticsData::LowStock(inventory::low_stock(input)),
        AnalyticsTool::SalesTrends => AnalyticsData::SalesTrends(sales::sales_trends(input)),
    }
}

// =============================================================================
// Test Fixtures
// =============================================================================

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    /// Friday 2024-03-15 23:00 UTC.
    pub fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 23, 0, 0).unwrap()
    }

    pub fn product(id: &str, category: &str, price: i64, cost: i64, quantity: f64) -> Product {
        Product {
            id: id.to_string(),
            owner_id: "owner".to_string(),
            name: id.to_string(),
            category: category.to_string(),
            price_cents: price,
            cost_cents: cost,
            quantity,
            unit: "unit".to_string(),
            par_level: None,
            sku: None,
            is_active: true,
            created_at: now(),
            updated_at: now(),
        }
    }

    /// A product sale line sold at `at`.
    pub fn line(sale_id: &str, p: &Product, quantity: i64, at: DateTime<Utc>) -> SaleRecord {
        SaleRecord {
            sale_id: sale_id.to_string(),
            receipt_number: format!("R-{}", sale_id),
            kind: ItemKind::Product,
            item_id: p.id.clone(),
            name: p.name.clone(),
            category: p.category.clone(),
            quantity,
            unit_price_cents: p.price_cents,
            unit_cost_cents: p.cost_cents,
            line_total_cents: p.price_cents * quantity,
            sold_at: at,
        }
    }

    pub fn input<'a>(records: &'a [SaleRecord], products: &'a [Product], window_days: i64) -> AnalyticsInput<'a> {
        AnalyticsInput {
            records,
            products,
            recipes: &[],
            now: now(),
            window_days,
            utc_offset_minutes: 0,
            low_stock_threshold: 5.0,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_slug_round_trip_covers_all_tools() {
        assert_eq!(AnalyticsTool::ALL.len(), 14);
        for tool in AnalyticsTool::ALL {
            assert_eq!(AnalyticsTool::from_slug(tool.slug()), Some(tool));
            let json = serde_json::to_string(&tool).unwrap();
            assert_eq!(json, format!("\"{}\"", tool.slug()));
        }
        assert_eq!(AnalyticsTool::from_slug("crystal-ball"), None);
    }

    #[test]
    fn test_resolve_window() {
        assert_eq!(resolve_window(AnalyticsTool::Anomalies, None), 60);
        assert_eq!(resolve_window(AnalyticsTool::Insights, Some(0)), 1);
        assert_eq!(resolve_window(AnalyticsTool::Insights, Some(5000)), MAX_WINDOW_DAYS);
        assert_eq!(AnalyticsTool::Insights.history_days(30), 60);
    }

    #[test]
    fn test_daily_revenue_is_zero_filled() {
        let beer = product("beer", "Beer", 700, 200, 10.0);
        let records = vec![
            line("s1", &beer, 2, now() - Duration::hours(1)),
            line("s2", &beer, 1, now() - Duration::days(2)),
            line("old", &beer, 1, now() - Duration::days(10)),
        ];
        let products = [beer];
        let input = input(&records, &products, 3);

        let days = input.daily_revenue();
        assert_eq!(days.len(), 3);
        assert_eq!(days[0].date, "2024-03-13");
        assert_eq!(days[0].revenue_cents, 700);
        assert_eq!(days[1].revenue_cents, 0);
        assert_eq!(days[2].date, "2024-03-15");
        assert_eq!(days[2].revenue_cents, 1400);
        assert_eq!(days[2].transactions, 1);
    }

    #[test]
    fn test_local_date_uses_offset() {
        let records: Vec<SaleRecord> = Vec::new();
        let products: Vec<Product> = Vec::new();
        let mut input = input(&records, &products, 7);
        input.utc_offset_minutes = 120;
        // 23:00 UTC is already Saturday in UTC+2
        assert_eq!(input.today().to_string(), "2024-03-16");
    }

    #[test]
    fn test_group_by_item_sorted_by_revenue() {
        let beer = product("beer", "Beer", 700, 200, 10.0);
        let wine = product("wine", "Wine", 1200, 400, 10.0);
        let records = vec![
            line("s1", &beer, 2, now()),
            line("s2", &wine, 2, now()),
            line("s3", &beer, 1, now()),
        ];
        let items = group_by_item(&records);
        assert_eq!(items[0].item_id, "wine");
        assert_eq!(items[0].revenue_cents, 2400);
        assert_eq!(items[1].units, 3);
        assert_eq!(items[1].cost_cents, 600);
        assert_eq!(items[1].profit_cents(), 1500);
    }

    #[test]
    fn test_run_dispatches_every_tool() {
        let beer = product("beer", "Beer", 700, 200, 10.0);
        let records = vec![line("s1", &beer, 2, now() - Duration::days(1))];
        let products = [beer];
        let input = input(&records, &products, 30);
        for tool in AnalyticsTool::ALL {
            let data = run(tool, &input);
            assert!(serde_json::to_value(&data).unwrap().is_object(), "{}", tool.slug());
        }
    }
}
