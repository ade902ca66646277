//! # Settings Routes
//!
//! Per-owner key-value settings, read and written as one typed object.
//! `PUT` is a partial update: omitted fields keep their stored value.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::info;

use barback_core::tax::TaxRegion;
use barback_core::validation::{validate_tax_rate, validate_utc_offset};
use barback_core::{Settings, ValidationError};

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::routes::AppJson;
use crate::services::checkout::load_settings;
use crate::AppState;

const MAX_BUSINESS_NAME_LENGTH: usize = 100;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/settings", get(get_settings).put(update_settings))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub tax_region: Option<String>,
    pub tax_rate: Option<f64>,
    pub currency: Option<String>,
    pub business_name: Option<String>,
    pub low_stock_threshold: Option<f64>,
    pub allow_negative_stock: Option<bool>,
    pub utc_offset_minutes: Option<i32>,
}

impl SettingsUpdate {
    /// Validates every present field and merges it into `settings`.
    pub fn apply(self, settings: &mut Settings) -> Result<(), ValidationError> {
        if let Some(raw) = self.tax_region {
            settings.tax_region = parse_region(&raw)?;
        }
        if let Some(rate) = self.tax_rate {
            validate_tax_rate(rate)?;
            settings.tax_rate = rate;
        }
        if let Some(currency) = self.currency {
            let currency = currency.trim();
            if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(ValidationError::InvalidFormat {
                    field: "currency".to_string(),
                    reason: "must be a three-letter ISO code".to_string(),
                });
            }
            settings.currency = currency.to_ascii_uppercase();
        }
        if let Some(name) = self.business_name {
            let name = name.trim();
            if name.is_empty() {
                return Err(ValidationError::Required {
                    field: "businessName".to_string(),
                });
            }
            if name.chars().count() > MAX_BUSINESS_NAME_LENGTH {
                return Err(ValidationError::TooLong {
                    field: "businessName".to_string(),
                    max: MAX_BUSINESS_NAME_LENGTH,
                });
            }
            settings.business_name = name.to_string();
        }
        if let Some(threshold) = self.low_stock_threshold {
            if !threshold.is_finite() || threshold < 0.0 {
                return Err(ValidationError::Negative {
                    field: "lowStockThreshold".to_string(),
                });
            }
            settings.low_stock_threshold = threshold;
        }
        if let Some(allow) = self.allow_negative_stock {
            settings.allow_negative_stock = allow;
        }
        if let Some(offset) = self.utc_offset_minutes {
            validate_utc_offset(offset)?;
            settings.utc_offset_minutes = offset;
        }
        Ok(())
    }
}

/// Strict variant of [`TaxRegion::parse`]: only `flat` itself maps to flat.
fn parse_region(raw: &str) -> Result<TaxRegion, ValidationError> {
    let region = TaxRegion::parse(raw);
    if region == TaxRegion::Flat && !raw.trim().eq_ignore_ascii_case("flat") {
        return Err(ValidationError::NotAllowed {
            field: "taxRegion".to_string(),
            allowed: REGIONS.iter().map(|r| r.as_str().to_string()).collect(),
        });
    }
    Ok(region)
}

const REGIONS: [TaxRegion; 11] = [
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

/// GET /api/settings
pub async fn get_settings(State(state): State<Arc<AppState>>, user: AuthUser) -> ApiResult<Json<Settings>> {
    Ok(Json(load_settings(&state.db, &user.id).await?))
}

/// PUT /api/settings
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppJson(body): AppJson<SettingsUpdate>,
) -> ApiResult<Json<Settings>> {
    let mut settings = load_settings(&state.db, &user.id).await?;
    body.apply(&mut settings)?;

    state.db.put_settings(&user.id, &settings.to_pairs()).await?;
    info!(
        region = settings.tax_region.as_str(),
        currency = %settings.currency,
        "Settings updated"
    );
    Ok(Json(settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let mut settings = Settings::default();
        SettingsUpdate {
            tax_region: Some("QC".to_string()),
            currency: Some("usd".to_string()),
            ..SettingsUpdate::default()
        }
        .apply(&mut settings)
        .unwrap();

        assert_eq!(settings.tax_region, TaxRegion::Quebec);
        assert_eq!(settings.currency, "USD");
        assert_eq!(settings.business_name, Settings::default().business_name);
    }

    #[test]
    fn test_unknown_region_is_rejected() {
        let mut settings = Settings::default();
        let err = SettingsUpdate {
            tax_region: Some("texas".to_string()),
            ..SettingsUpdate::default()
        }
        .apply(&mut settings)
        .unwrap_err();
        assert_eq!(err.field(), "taxRegion");

        assert_eq!(parse_region(" Flat ").unwrap(), TaxRegion::Flat);
    }

    #[test]
    fn test_invalid_fields_are_rejected() {
        let cases = [
            SettingsUpdate {
                tax_rate: Some(120.0),
                ..SettingsUpdate::default()
            },
            SettingsUpdate {
                currency: Some("dollars".to_string()),
                ..SettingsUpdate::default()
            },
            SettingsUpdate {
                business_name: Some("   ".to_string()),
                ..SettingsUpdate::default()
            },
            SettingsUpdate {
                low_stock_threshold: Some(-1.0),
                ..SettingsUpdate::default()
            },
            SettingsUpdate {
                utc_offset_minutes: Some(900),
                ..SettingsUpdate::default()
            },
        ];
        for update in cases {
            assert!(update.apply(&mut Settings::default()).is_err());
        }
    }
}
