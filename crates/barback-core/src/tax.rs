//! # Tax Calculator
//!
//! Turns a pre-tax subtotal and a configured region into a named breakdown.
//!
//! ## Region Rules
//! ```text
//! ┌──────────────────────────┬──────────────────────────────────────────────┐
//! │ Region                   │ Components                                   │
//! ├──────────────────────────┼──────────────────────────────────────────────┤
//! │ Quebec                   │ TPS 5%      TVQ 9.975% of (subtotal + TPS)   │
//! │ Ontario                  │ HST 13%                                      │
//! │ NS / NB / PEI / NL       │ HST 15%                                      │
//! │ Alberta                  │ GST 5%                                       │
//! │ British Columbia         │ GST 5%      PST 10% of (subtotal + GST)      │
//! │ Saskatchewan             │ GST 5%      PST 6% of (subtotal + GST)       │
//! │ Manitoba                 │ GST 5%      TVD 7% of (subtotal + GST)       │
//! │ anything else            │ Tax at the owner's flat rate (default 8%)    │
//! └──────────────────────────┴──────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//! [`calculate_tax`] is a pure function of its arguments. No rounding is
//! applied here; amounts are raw `f64` dollars and the caller decides when
//! to round (see [`crate::money::Money::from_dollars_rounded`]).
//!
//! ## Invariants
//! - `total == components.iter().map(|c| c.amount).sum()`
//! - `grand_total == subtotal + total`

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Flat rate, in percent, used when the owner has not configured one.
pub const DEFAULT_FLAT_TAX_RATE: f64 = 8.0;

const GST_RATE: f64 = 0.05;
const TVQ_RATE: f64 = 0.09975;
const HST_ONTARIO_RATE: f64 = 0.13;
const HST_ATLANTIC_RATE: f64 = 0.15;
const PST_BC_RATE: f64 = 0.10;
const PST_SK_RATE: f64 = 0.06;
const TVD_MB_RATE: f64 = 0.07;

// =============================================================================
// Tax Region
// =============================================================================

/// Which tax formula applies to a sale.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TaxRegion {
    Quebec,
    Ontario,
    NovaScotia,
    NewBrunswick,
    PrinceEdwardIsland,
    Newfoundland,
    Alberta,
    BritishColumbia,
    Saskatchewan,
    Manitoba,
    /// Single flat rate from settings.
    #[default]
    Flat,
}

impl TaxRegion {
    /// Parses a region from user input. Never fails.
    ///
    /// Case, spaces, hyphens and underscores are ignored; full names and
    /// two-letter province codes are accepted. Anything unrecognised is
    /// [`TaxRegion::Flat`].
    ///
    /// ## Example
    /// ```rust
    /// use barback_core::tax::TaxRegion;
    ///
    /// assert_eq!(TaxRegion::parse("Quebec"), TaxRegion::Quebec);
    /// assert_eq!(TaxRegion::parse("british_columbia"), TaxRegion::BritishColumbia);
    /// assert_eq!(TaxRegion::parse("PE"), TaxRegion::PrinceEdwardIsland);
    /// assert_eq!(TaxRegion::parse("texas"), TaxRegion::Flat);
    /// ```
    pub fn parse(input: &str) -> Self {
        let key: String = input
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_' | '.'))
            .flat_map(char::to_lowercase)
            .collect();

        match key.as_str() {
            "quebec" | "québec" | "qc" => TaxRegion::Quebec,
            "ontario" | "on" => TaxRegion::Ontario,
            "novascotia" | "ns" => TaxRegion::NovaScotia,
            "newbrunswick" | "nb" => TaxRegion::NewBrunswick,
            "princeedwardisland" | "pei" | "pe" => TaxRegion::PrinceEdwardIsland,
            "newfoundland" | "newfoundlandandlabrador" | "nl" => TaxRegion::Newfoundland,
            "alberta" | "ab" => TaxRegion::Alberta,
            "britishcolumbia" | "bc" => TaxRegion::BritishColumbia,
            "saskatchewan" | "sk" => TaxRegion::Saskatchewan,
            "manitoba" | "mb" => TaxRegion::Manitoba,
            _ => TaxRegion::Flat,
        }
    }

    /// Stable storage key (matches the serde representation).
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxRegion::Quebec => "quebec",
            TaxRegion::Ontario => "ontario",
            TaxRegion::NovaScotia => "nova_scotia",
            TaxRegion::NewBrunswick => "new_brunswick",
            TaxRegion::PrinceEdwardIsland => "prince_edward_island",
            TaxRegion::Newfoundland => "newfoundland",
            TaxRegion::Alberta => "alberta",
            TaxRegion::BritishColumbia => "british_columbia",
            TaxRegion::Saskatchewan => "saskatchewan",
            TaxRegion::Manitoba => "manitoba",
            TaxRegion::Flat => "flat",
        }
    }
}

/// Region plus the flat rate it may need.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct TaxSettings {
    pub region: TaxRegion,
    /// Percent, e.g. `8.0` for 8%.
    pub flat_rate_percent: f64,
}

impl Default for TaxSettings {
    fn default() -> Self {
        TaxSettings {
            region: TaxRegion::Flat,
            flat_rate_percent: DEFAULT_FLAT_TAX_RATE,
        }
    }
}

// =============================================================================
// Tax Result
// =============================================================================

/// One named tax line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct TaxComponent {
    /// Label shown on the receipt ("TPS", "HST", ...).
    pub name: String,
    /// Fraction applied, e.g. `0.05`.
    pub rate: f64,
    /// Amount the rate was applied to.
    pub base: f64,
    pub amount: f64,
}

impl TaxComponent {
    fn new(name: &str, rate: f64, base: f64) -> Self {
        TaxComponent {
            name: name.to_string(),
            rate,
            base,
            amount: base * rate,
        }
    }
}

/// Full breakdown for one subtotal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct TaxResult {
    pub region: TaxRegion,
    pub subtotal: f64,
    pub components: Vec<TaxComponent>,
    /// Sum of component amounts.
    pub total: f64,
    /// `subtotal + total`.
    pub grand_total: f64,
}

impl TaxResult {
    fn from_components(region: TaxRegion, subtotal: f64, components: Vec<TaxComponent>) -> Self {
        let total: f64 = components.iter().map(|c| c.amount).sum();
        TaxResult {
            region,
            subtotal,
            components,
            total,
            grand_total: subtotal + total,
        }
    }

    /// Amount of the named component, if present.
    pub fn component(&self, name: &str) -> Option<f64> {
        self.components.iter().find(|c| c.name == name).map(|c| c.amount)
    }
}

// =============================================================================
// Calculation
// =============================================================================

/// Computes the tax breakdown for `subtotal` (dollars) in `region`.
///
/// `flat_rate_percent` is only read for [`TaxRegion::Flat`].
///
/// ## Example
/// ```rust
/// use barback_core::tax::{calculate_tax, TaxRegion};
///
/// let qc = calculate_tax(100.0, TaxRegion::Quebec, 8.0);
/// assert_eq!(qc.component("TPS"), Some(5.0));
/// assert_eq!(qc.component("TVQ"), Some((100.0 + 5.0) * 0.09975));
/// ```
pub fn calculate_tax(subtotal: f64, region: TaxRegion, flat_rate_percent: f64) -> TaxResult {
    let components = match region {
        TaxRegion::Quebec => compounding(subtotal, "TPS", "TVQ", TVQ_RATE),
        TaxRegion::Ontario => vec![TaxComponent::new("HST", HST_ONTARIO_RATE, subtotal)],
        TaxRegion::NovaScotia
        | TaxRegion::NewBrunswick
        | TaxRegion::PrinceEdwardIsland
        | TaxRegion::Newfoundland => vec![TaxComponent::new("HST", HST_ATLANTIC_RATE, subtotal)],
        TaxRegion::Alberta => vec![TaxComponent::new("GST", GST_RATE, subtotal)],
        TaxRegion::BritishColumbia => compounding(subtotal, "GST", "PST", PST_BC_RATE),
        TaxRegion::Saskatchewan => compounding(subtotal, "GST", "PST", PST_SK_RATE),
        TaxRegion::Manitoba => compounding(subtotal, "GST", "TVD", TVD_MB_RATE),
        TaxRegion::Flat => vec![TaxComponent::new("Tax", flat_rate_percent / 100.0, subtotal)],
    };

    TaxResult::from_components(region, subtotal, components)
}

/// Same as [`calculate_tax`], reading region and rate from settings.
pub fn calculate_tax_for(subtotal: f64, settings: &TaxSettings) -> TaxResult {
    calculate_tax(subtotal, settings.region, settings.flat_rate_percent)
}

/// Region names the region string as typed by the user; see [`TaxRegion::parse`].
pub fn calculate_tax_str(subtotal: f64, region: &str, flat_rate_percent: f64) -> TaxResult {
    calculate_tax(subtotal, TaxRegion::parse(region), flat_rate_percent)
}

/// Federal 5% first, then a provincial rate on (subtotal + federal).
fn compounding(subtotal: f64, federal: &str, provincial: &str, provincial_rate: f64) -> Vec<TaxComponent> {
    let first = TaxComponent::new(federal, GST_RATE, subtotal);
    let second = TaxComponent::new(provincial, provincial_rate, subtotal + first.amount);
    vec![first, second]
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SUBTOTALS: &[f64] = &[0.0, 0.01, 1.0, 7.5, 12.34, 99.99, 100.0, 1234.56, 98765.43];

    #[test]
    fn test_quebec_compounds_tvq_on_tps() {
        for &subtotal in SUBTOTALS {
            let result = calculate_tax_str(subtotal, "quebec", 8.0);
            let tps = subtotal * 0.05;
            let tvq = (subtotal + subtotal * 0.05) * 0.09975;

            assert_eq!(result.components.len(), 2);
            assert_eq!(result.component("TPS"), Some(tps));
            assert_eq!(result.component("TVQ"), Some(tvq));
            assert_eq!(result.total, subtotal * 0.05 + tvq);
        }
    }

    #[test]
    fn test_ontario_single_hst_component() {
        for &subtotal in SUBTOTALS {
            let result = calculate_tax_str(subtotal, "ontario", 8.0);
            assert_eq!(result.components.len(), 1);
            assert_eq!(result.components[0].name, "HST");
            assert_eq!(result.total, subtotal * 0.13);
        }
    }

    #[test]
    fn test_atlantic_provinces_use_15_percent_hst() {
        for region in ["nova scotia", "new-brunswick", "PEI", "newfoundland"] {
            let result = calculate_tax_str(200.0, region, 8.0);
            assert_eq!(result.components.len(), 1, "{region}");
            assert_eq!(result.components[0].name, "HST");
            assert_eq!(result.total, 200.0 * 0.15);
        }
    }

    #[test]
    fn test_alberta_scenario() {
        let result = calculate_tax_str(100.0, "alberta", 8.0);
        assert_eq!(result.components.len(), 1);
        assert_eq!(result.components[0].name, "GST");
        assert_eq!(result.components[0].amount, 5.0);
        assert_eq!(result.total, 5.0);
        assert_eq!(result.grand_total, 105.0);
    }

    #[test]
    fn test_western_compounding_regions() {
        let cases = [
            (TaxRegion::BritishColumbia, "PST", 0.10),
            (TaxRegion::Saskatchewan, "PST", 0.06),
            (TaxRegion::Manitoba, "TVD", 0.07),
        ];
        for (region, second, rate) in cases {
            let result = calculate_tax(50.0, region, 8.0);
            assert_eq!(result.components[0].name, "GST");
            assert_eq!(result.components[0].amount, 50.0 * 0.05);
            assert_eq!(result.components[1].name, second);
            assert_eq!(result.components[1].base, 50.0 + 50.0 * 0.05);
            assert_eq!(result.components[1].amount, (50.0 + 50.0 * 0.05) * rate);
        }
    }

    #[test]
    fn test_unknown_region_uses_flat_rate() {
        let result = calculate_tax_str(100.0, "narnia", 8.0);
        assert_eq!(result.region, TaxRegion::Flat);
        assert_eq!(result.components.len(), 1);
        assert_eq!(result.total, 100.0 * 0.08);

        let custom = calculate_tax_str(100.0, "", 12.5);
        assert_eq!(custom.total, 100.0 * 0.125);
        assert_eq!(TaxRegion::default(), TaxRegion::Flat);
    }

    #[test]
    fn test_zero_subtotal_gives_zero_components() {
        for region in ["quebec", "ontario", "alberta", "bc", "sk", "mb", "other"] {
            let result = calculate_tax_str(0.0, region, 8.0);
            assert!(result.components.iter().all(|c| c.amount == 0.0), "{region}");
            assert_eq!(result.total, 0.0);
            assert_eq!(result.grand_total, 0.0);
        }
    }

    #[test]
    fn test_totals_are_sum_of_components() {
        for region in ["quebec", "ontario", "ns", "alberta", "bc", "sk", "mb", "flat"] {
            for &subtotal in SUBTOTALS {
                let result = calculate_tax_str(subtotal, region, 8.0);
                let sum: f64 = result.components.iter().map(|c| c.amount).sum();
                assert_eq!(result.total, sum);
                assert_eq!(result.grand_total, subtotal + result.total);
            }
        }
    }

    #[test]
    fn test_calculation_is_bit_identical_across_calls() {
        for region in ["quebec", "manitoba", "flat"] {
            let a = calculate_tax_str(123.45, region, 7.25);
            let b = calculate_tax_str(123.45, region, 7.25);
            assert_eq!(a.total.to_bits(), b.total.to_bits());
            assert_eq!(a.grand_total.to_bits(), b.grand_total.to_bits());
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_region_parse_round_trips_storage_key() {
        let all = [
            TaxRegion::Quebec,
            TaxRegion::Ontario,
            TaxRegion::NovaScotia,
            TaxRegion::NewBrunswick,
            TaxRegion::PrinceEdwardIsland,
            TaxRegion::Newfoundland,
            TaxRegion::Alberta,
            TaxRegion::BritishColumbia,
            TaxRegion::Saskatchewan,
            TaxRegion::Manitoba,
            TaxRegion::Flat,
        ];
        for region in all {
            assert_eq!(TaxRegion::parse(region.as_str()), region);
        }
    }
}
