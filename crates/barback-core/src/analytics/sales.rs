//! Time-series tools: insights, anomalies, revenue forecast, peak hours,
//! day-of-week and weekly trends.

use std::collections::{BTreeMap, HashSet};

use chrono::{Datelike, Duration, NaiveDate, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::{group_by_item, percent, round1, AnalyticsInput, DailyRevenue, ItemSales};

/// |z| at or above which a day is reported as an anomaly.
pub const ANOMALY_Z_THRESHOLD: f64 = 2.0;

const TOP_ITEMS: usize = 5;
const TOP_HOURS: usize = 3;
const FORECAST_DAYS: i64 = 7;

// =============================================================================
// Insights
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct InsightsReport {
    pub revenue_cents: i64,
    pub transactions: i64,
    pub items_sold: i64,
    pub average_ticket_cents: i64,
    pub gross_profit_cents: i64,
    /// Revenue of the equal-length window before this one.
    pub previous_revenue_cents: i64,
    /// `None` when the previous window had no revenue.
    pub revenue_change_pct: Option<f64>,
    pub top_items: Vec<ItemSales>,
    pub daily_revenue: Vec<DailyRevenue>,
}

/// Headline numbers, best sellers and daily revenue, compared to the
/// previous window of equal length.
pub fn insights(input: &AnalyticsInput<'_>) -> InsightsReport {
    let current: Vec<_> = input.in_window().collect();

    let revenue_cents: i64 = current.iter().map(|r| r.line_total_cents).sum();
    let transactions = current
        .iter()
        .map(|r| r.sale_id.as_str())
        .collect::<HashSet<_>>()
        .len() as i64;
    let items_sold = current.iter().map(|r| r.quantity).sum();
    let gross_profit_cents = current.iter().map(|r| r.profit_cents()).sum();

    let prev_start = input.window_start() - Duration::days(input.window_days);
    let prev_end = input.window_start();
    let previous_revenue_cents: i64 = input
        .records
        .iter()
        .filter(|r| r.sold_at > prev_start && r.sold_at <= prev_end)
        .map(|r| r.line_total_cents)
        .sum();

    let revenue_change_pct = (previous_revenue_cents > 0).then(|| {
        round1(percent(
            (revenue_cents - previous_revenue_cents) as f64,
            previous_revenue_cents as f64,
        ))
    });

    let mut top_items = group_by_item(current.iter().copied());
    top_items.truncate(TOP_ITEMS);

    InsightsReport {
        revenue_cents,
        transactions,
        items_sold,
        average_ticket_cents: if transactions > 0 {
            revenue_cents / transactions
        } else {
            0
        },
        gross_profit_cents,
        previous_revenue_cents,
        revenue_change_pct,
        top_items,
        daily_revenue: input.daily_revenue(),
    }
}

// =============================================================================
// Anomalies
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    Spike,
    Drop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    pub date: String,
    pub revenue_cents: i64,
    pub z_score: f64,
    pub kind: AnomalyKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyReport {
    pub mean_daily_revenue_cents: f64,
    pub std_dev_cents: f64,
    pub threshold_z: f64,
    pub days: Vec<DailyRevenue>,
    pub anomalies: Vec<Anomaly>,
}

/// Days whose revenue is at least [`ANOMALY_Z_THRESHOLD`] population
/// standard deviations from the window mean. A flat series has none.
pub fn anomalies(input: &AnalyticsInput<'_>) -> AnomalyReport {
    let days = input.daily_revenue();
    let values: Vec<f64> = days.iter().map(|d| d.revenue_cents as f64).collect();
    let (mean, std_dev) = mean_and_std_dev(&values);

    let anomalies = if std_dev > 0.0 {
        days.iter()
            .filter_map(|d| {
                let z = (d.revenue_cents as f64 - mean) / std_dev;
                (z.abs() >= ANOMALY_Z_THRESHOLD).then(|| Anomaly {
                    date: d.date.clone(),
                    revenue_cents: d.revenue_cents,
                    z_score: (z * 100.0).round() / 100.0,
                    kind: if z > 0.0 { AnomalyKind::Spike } else { AnomalyKind::Drop },
                })
            })
            .collect()
    } else {
        Vec::new()
    };

    AnomalyReport {
        mean_daily_revenue_cents: mean,
        std_dev_cents: std_dev,
        threshold_z: ANOMALY_Z_THRESHOLD,
        days,
        anomalies,
    }
}

/// Mean and population standard deviation; `(0, 0)` for an empty slice.
pub fn mean_and_std_dev(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

// =============================================================================
// Revenue Forecast
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ForecastDay {
    pub date: String,
    pub weekday: String,
    pub expected_revenue_cents: i64,
    /// How many past days of the same weekday the estimate averages.
    pub samples: i64,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ForecastReport {
    pub history_days: i64,
    pub days: Vec<ForecastDay>,
    pub total_expected_cents: i64,
}

/// Next seven days, each the mean revenue of the same weekday in the
/// history window (zero days included).
pub fn revenue_forecast(input: &AnalyticsInput<'_>) -> ForecastReport {
    let mut by_weekday: BTreeMap<u32, (i64, i64)> = BTreeMap::new();
    for day in input.daily_revenue() {
        if let Ok(date) = NaiveDate::parse_from_str(&day.date, "%Y-%m-%d") {
            let entry = by_weekday
                .entry(date.weekday().num_days_from_monday())
                .or_insert((0, 0));
            entry.0 += day.revenue_cents;
            entry.1 += 1;
        }
    }

    let today = input.today();
    let days: Vec<ForecastDay> = (1..=FORECAST_DAYS)
        .map(|ahead| {
            let date = today + Duration::days(ahead);
            let (total, samples) = by_weekday
                .get(&date.weekday().num_days_from_monday())
                .copied()
                .unwrap_or((0, 0));
            ForecastDay {
                date: date.format("%Y-%m-%d").to_string(),
                weekday: weekday_name(date.weekday()).to_string(),
                expected_revenue_cents: if samples > 0 { total / samples } else { 0 },
                samples,
                confidence: match samples {
                    s if s >= 4 => Confidence::High,
                    s if s >= 2 => Confidence::Medium,
                    _ => Confidence::Low,
                },
            }
        })
        .collect();

    ForecastReport {
        history_days: input.window_days,
        total_expected_cents: days.iter().map(|d| d.expected_revenue_cents).sum(),
        days,
    }
}

// =============================================================================
// Peak Hours
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct HourBucket {
    /// Local hour, 0-23.
    pub hour: u32,
    pub revenue_cents: i64,
    pub transactions: i64,
    pub units: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PeakHoursReport {
    pub hours: Vec<HourBucket>,
    /// Up to three busiest hours by revenue.
    pub top_hours: Vec<u32>,
}

pub fn peak_hours(input: &AnalyticsInput<'_>) -> PeakHoursReport {
    let offset = input.offset();
    let mut hours: Vec<HourBucket> = (0..24)
        .map(|hour| HourBucket {
            hour,
            revenue_cents: 0,
            transactions: 0,
            units: 0,
        })
        .collect();
    let mut seen: HashSet<(u32, &str)> = HashSet::new();

    for r in input.in_window() {
        let hour = r.sold_at.with_timezone(&offset).hour();
        let bucket = &mut hours[hour as usize];
        bucket.revenue_cents += r.line_total_cents;
        bucket.units += r.quantity;
        if seen.insert((hour, r.sale_id.as_str())) {
            bucket.transactions += 1;
        }
    }

    let mut ranked: Vec<&HourBucket> = hours.iter().filter(|h| h.revenue_cents > 0).collect();
    ranked.sort_by(|a, b| b.revenue_cents.cmp(&a.revenue_cents).then(a.hour.cmp(&b.hour)));
    let top_hours = ranked.iter().take(TOP_HOURS).map(|h| h.hour).collect();

    PeakHoursReport { hours, top_hours }
}

// =============================================================================
// Day of Week
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct WeekdayBucket {
    pub weekday: String,
    pub revenue_cents: i64,
    pub transactions: i64,
    /// Days of this weekday inside the window.
    pub occurrences: i64,
    pub average_revenue_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DayOfWeekReport {
    /// Monday first.
    pub days: Vec<WeekdayBucket>,
    pub best_day: Option<String>,
    pub slowest_day: Option<String>,
}

pub fn day_of_week(input: &AnalyticsInput<'_>) -> DayOfWeekReport {
    let mut buckets: Vec<WeekdayBucket> = WEEKDAYS
        .iter()
        .map(|wd| WeekdayBucket {
            weekday: weekday_name(*wd).to_string(),
            revenue_cents: 0,
            transactions: 0,
            occurrences: 0,
            average_revenue_cents: 0,
        })
        .collect();

    for day in input.daily_revenue() {
        if let Ok(date) = NaiveDate::parse_from_str(&day.date, "%Y-%m-%d") {
            let bucket = &mut buckets[date.weekday().num_days_from_monday() as usize];
            bucket.revenue_cents += day.revenue_cents;
            bucket.transactions += day.transactions;
            bucket.occurrences += 1;
        }
    }
    for bucket in &mut buckets {
        if bucket.occurrences > 0 {
            bucket.average_revenue_cents = bucket.revenue_cents / bucket.occurrences;
        }
    }

    let with_sales: Vec<&WeekdayBucket> = buckets.iter().filter(|b| b.occurrences > 0).collect();
    let any_revenue = with_sales.iter().any(|b| b.revenue_cents > 0);
    let best_day = with_sales
        .iter()
        .filter(|_| any_revenue)
        .max_by_key(|b| b.average_revenue_cents)
        .map(|b| b.weekday.clone());
    let slowest_day = with_sales
        .iter()
        .filter(|_| any_revenue)
        .min_by_key(|b| b.average_revenue_cents)
        .map(|b| b.weekday.clone());

    DayOfWeekReport {
        days: buckets,
        best_day,
        slowest_day,
    }
}

// =============================================================================
// Sales Trends
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct WeekBucket {
    /// First local date of the 7-day bucket.
    pub week_start: String,
    pub revenue_cents: i64,
    pub transactions: i64,
    /// Change vs. the previous bucket; `None` for the first or after a zero week.
    pub growth_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SalesTrendsReport {
    pub weeks: Vec<WeekBucket>,
    pub average_weekly_growth_pct: Option<f64>,
}

/// Rolling 7-day buckets ending today, oldest first. A trailing partial
/// bucket is not produced: the window is cut to whole weeks.
pub fn sales_trends(input: &AnalyticsInput<'_>) -> SalesTrendsReport {
    let daily = input.daily_revenue();
    let whole_weeks = (daily.len() / 7).max(1);
    let skip = daily.len().saturating_sub(whole_weeks * 7);

    let mut weeks: Vec<WeekBucket> = daily[skip..]
        .chunks(7)
        .map(|chunk| WeekBucket {
            week_start: chunk.first().map(|d| d.date.clone()).unwrap_or_default(),
            revenue_cents: chunk.iter().map(|d| d.revenue_cents).sum(),
            transactions: chunk.iter().map(|d| d.transactions).sum(),
            growth_pct: None,
        })
        .collect();

    for i in 1..weeks.len() {
        let prev = weeks[i - 1].revenue_cents;
        if prev > 0 {
            weeks[i].growth_pct = Some(round1(percent((weeks[i].revenue_cents - prev) as f64, prev as f64)));
        }
    }

    let growths: Vec<f64> = weeks.iter().filter_map(|w| w.growth_pct).collect();
    let average_weekly_growth_pct =
        (!growths.is_empty()).then(|| round1(growths.iter().sum::<f64>() / growths.len() as f64));

    SalesTrendsReport {
        weeks,
        average_weekly_growth_pct,
    }
}

// =============================================================================
// Helpers
// =============================================================================

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

fn weekday_name(wd: Weekday) -> &'static str {
    match wd {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;

    #[test]
    fn test_insights_compares_previous_window() {
        let beer = product("beer", "Beer", 1000, 300, 50.0);
        let records = vec![
            line("a", &beer, 2, now() - Duration::days(1)),
            line("a", &beer, 1, now() - Duration::days(1)),
            line("b", &beer, 1, now() - Duration::days(3)),
            line("old", &beer, 2, now() - Duration::days(10)),
        ];
        let products = [beer];
        let report = insights(&input(&records, &products, 7));

        assert_eq!(report.revenue_cents, 4000);
        assert_eq!(report.transactions, 2);
        assert_eq!(report.items_sold, 4);
        assert_eq!(report.average_ticket_cents, 2000);
        assert_eq!(report.gross_profit_cents, 2800);
        assert_eq!(report.previous_revenue_cents, 2000);
        assert_eq!(report.revenue_change_pct, Some(100.0));
        assert_eq!(report.top_items.len(), 1);
        assert_eq!(report.daily_revenue.len(), 7);
    }

    #[test]
    fn test_insights_empty_history() {
        let report = insights(&input(&[], &[], 30));
        assert_eq!(report.revenue_cents, 0);
        assert_eq!(report.average_ticket_cents, 0);
        assert_eq!(report.revenue_change_pct, None);
    }

    #[test]
    fn test_anomaly_spike_detected() {
        let beer = product("beer", "Beer", 1000, 300, 50.0);
        let mut records: Vec<_> = (1..10)
            .map(|d| line(&format!("s{d}"), &beer, 1, now() - Duration::days(d)))
            .collect();
        records.push(line("party", &beer, 20, now() - Duration::hours(2)));
        let products = [beer];

        let report = anomalies(&input(&records, &products, 10));
        assert_eq!(report.days.len(), 10);
        assert_eq!(report.anomalies.len(), 1);
        assert_eq!(report.anomalies[0].kind, AnomalyKind::Spike);
        assert_eq!(report.anomalies[0].date, "2024-03-15");
        assert!(report.anomalies[0].z_score >= ANOMALY_Z_THRESHOLD);
    }

    #[test]
    fn test_flat_series_has_no_anomalies() {
        let beer = product("beer", "Beer", 1000, 300, 50.0);
        let records: Vec<_> = (0..5)
            .map(|d| line(&format!("s{d}"), &beer, 1, now() - Duration::days(d)))
            .collect();
        let products = [beer];
        let report = anomalies(&input(&records, &products, 5));
        assert_eq!(report.std_dev_cents, 0.0);
        assert!(report.anomalies.is_empty());
    }

    #[test]
    fn test_mean_and_std_dev() {
        let (mean, sd) = mean_and_std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(mean, 5.0);
        assert_eq!(sd, 2.0);
        assert_eq!(mean_and_std_dev(&[]), (0.0, 0.0));
    }

    #[test]
    fn test_forecast_uses_weekday_means() {
        // now is Friday 2024-03-15; history has two Fridays and two Saturdays
        let beer = product("beer", "Beer", 1000, 300, 50.0);
        let records = vec![
            line("f1", &beer, 3, now() - Duration::hours(1)),
            line("f2", &beer, 1, now() - Duration::days(7)),
            line("s1", &beer, 4, now() - Duration::days(6)),
            line("s2", &beer, 2, now() - Duration::days(13)),
        ];
        let products = [beer];
        let report = revenue_forecast(&input(&records, &products, 14));

        assert_eq!(report.days.len(), 7);
        let saturday = &report.days[0];
        assert_eq!(saturday.weekday, "Saturday");
        assert_eq!(saturday.date, "2024-03-16");
        assert_eq!(saturday.expected_revenue_cents, 3000);
        assert_eq!(saturday.samples, 2);
        assert_eq!(saturday.confidence, Confidence::Medium);

        let friday = &report.days[6];
        assert_eq!(friday.weekday, "Friday");
        assert_eq!(friday.expected_revenue_cents, 2000);
        assert_eq!(report.total_expected_cents, 5000);
    }

    #[test]
    fn test_peak_hours_buckets_by_local_hour() {
        let beer = product("beer", "Beer", 1000, 300, 50.0);
        let at = |h: u32| now().date_naive().and_hms_opt(h, 30, 0).unwrap().and_utc();
        let records = vec![
            line("a", &beer, 1, at(21)),
            line("a", &beer, 1, at(21)),
            line("b", &beer, 3, at(22)),
            line("c", &beer, 1, at(18)),
        ];
        let products = [beer];
        let mut inp = input(&records, &products, 1);

        let report = peak_hours(&inp);
        assert_eq!(report.hours.len(), 24);
        assert_eq!(report.hours[21].transactions, 1);
        assert_eq!(report.hours[21].units, 2);
        assert_eq!(report.top_hours, vec![22, 21, 18]);

        inp.utc_offset_minutes = -240;
        let shifted = peak_hours(&inp);
        assert_eq!(shifted.top_hours[0], 18);
    }

    #[test]
    fn test_day_of_week_averages_by_occurrence() {
        let beer = product("beer", "Beer", 1000, 300, 50.0);
        let records = vec![
            line("f1", &beer, 2, now() - Duration::hours(1)),
            line("t1", &beer, 1, now() - Duration::days(1)),
        ];
        let products = [beer];
        let report = day_of_week(&input(&records, &products, 14));

        let friday = &report.days[4];
        assert_eq!(friday.weekday, "Friday");
        assert_eq!(friday.occurrences, 2);
        assert_eq!(friday.average_revenue_cents, 1000);
        assert_eq!(report.best_day.as_deref(), Some("Friday"));
    }

    #[test]
    fn test_sales_trends_weekly_growth() {
        let beer = product("beer", "Beer", 1000, 300, 50.0);
        let records = vec![
            line("w1", &beer, 1, now() - Duration::days(10)),
            line("w2", &beer, 2, now() - Duration::days(2)),
        ];
        let products = [beer];
        let report = sales_trends(&input(&records, &products, 14));

        assert_eq!(report.weeks.len(), 2);
        assert_eq!(report.weeks[0].revenue_cents, 1000);
        assert_eq!(report.weeks[1].revenue_cents, 2000);
        assert_eq!(report.weeks[0].growth_pct, None);
        assert_eq!(report.weeks[1].growth_pct, Some(100.0));
        assert_eq!(report.average_weekly_growth_pct, Some(100.0));
    }
}
