//! # Sales Routes
//!
//! ```text
//! POST /quote     items ──► priced cart + tax breakdown      (nothing saved)
//! POST /checkout  items ──► priced cart ──► record_sale      (stock taken)
//! POST /{id}/void          ──► voided sale                   (stock returned)
//! ```

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use barback_core::cart::{CartItem, CartTotals};
use barback_core::checkout::Payment;
use barback_core::csv_io::write_sales_csv;
use barback_core::{PaymentMethod, Sale, SaleWithItems, ValidationError};
use barback_db::DateRange;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::routes::{csv_download, AppJson, AppQuery};
use crate::services::checkout::{cart_from_lines, complete_sale, load_settings, LineRequest, OwnerCatalog};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sales", get(list_sales))
        .route("/sales/quote", post(quote))
        .route("/sales/checkout", post(checkout))
        .route("/sales/export", get(export_sales))
        .route("/sales/{id}", get(get_sale))
        .route("/sales/{id}/void", post(void_sale))
}

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub items: Vec<LineRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub items: Vec<CartItem>,
    pub totals: CartTotals,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub items: Vec<LineRequest>,
    pub payment_method: PaymentMethod,
    pub tendered_cents: Option<i64>,
    pub payment_intent_id: Option<String>,
}

/// `?from=&to=`, each an RFC 3339 timestamp or a `YYYY-MM-DD` date.
#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

impl RangeQuery {
    /// A bare date covers the whole UTC day: `from` its start, `to` its end.
    pub fn to_range(&self) -> ApiResult<DateRange> {
        let range = DateRange {
            from: self.from.as_deref().map(|v| parse_bound("from", v, NaiveTime::default())).transpose()?,
            to: self
                .to
                .as_deref()
                .map(|v| parse_bound("to", v, end_of_day()))
                .transpose()?,
        };
        if let (Some(from), Some(to)) = (range.from, range.to) {
            if from > to {
                return Err(ApiError::validation("from must not be after to"));
            }
        }
        Ok(range)
    }
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or_default()
}

fn parse_bound(field: &str, value: &str, time_of_day: NaiveTime) -> ApiResult<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|date| date.and_time(time_of_day).and_utc())
        .map_err(|_| {
            ValidationError::InvalidFormat {
                field: field.to_string(),
                reason: "expected YYYY-MM-DD or an RFC 3339 timestamp".to_string(),
            }
            .into()
        })
}

/// POST /api/sales/quote
pub async fn quote(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppJson(body): AppJson<QuoteRequest>,
) -> ApiResult<Json<Quote>> {
    let settings = load_settings(&state.db, &user.id).await?;
    let owner_catalog = OwnerCatalog::load(&state.db, &user.id).await?;
    let cart = cart_from_lines(&owner_catalog.catalog(), &body.items)?;

    let totals = cart.totals(&settings.tax_settings());
    Ok(Json(Quote {
        items: cart.items,
        totals,
    }))
}

/// POST /api/sales/checkout
pub async fn checkout(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppJson(body): AppJson<CheckoutRequest>,
) -> ApiResult<(StatusCode, Json<SaleWithItems>)> {
    let settings = load_settings(&state.db, &user.id).await?;
    let owner_catalog = OwnerCatalog::load(&state.db, &user.id).await?;
    let catalog = owner_catalog.catalog();
    let cart = cart_from_lines(&catalog, &body.items)?;

    let payment = Payment {
        method: body.payment_method,
        tendered_cents: body.tendered_cents,
        payment_intent_id: body.payment_intent_id,
    };
    let sale = complete_sale(&state.db, &user.id, &catalog, &cart, &settings, payment, None).await?;
    Ok((StatusCode::CREATED, Json(sale)))
}

/// GET /api/sales
pub async fn list_sales(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppQuery(query): AppQuery<RangeQuery>,
) -> ApiResult<Json<Vec<Sale>>> {
    Ok(Json(state.db.list_sales(&user.id, query.to_range()?).await?))
}

/// GET /api/sales/{id}
pub async fn get_sale(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<SaleWithItems>> {
    state
        .db
        .get_sale(&user.id, &id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Sale", &id))
}

/// POST /api/sales/{id}/void
pub async fn void_sale(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Sale>> {
    let sale = state.db.void_sale(&user.id, &id).await?;
    info!(sale_id = %sale.id, receipt = %sale.receipt_number, "Sale voided");
    Ok(Json(sale))
}

/// GET /api/sales/export
pub async fn export_sales(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppQuery(query): AppQuery<RangeQuery>,
) -> ApiResult<Response> {
    let records = state.db.sale_records(&user.id, query.to_range()?).await?;
    Ok(csv_download("sales.csv", write_sales_csv(&records)?))
}
