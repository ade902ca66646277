//! # Product Routes
//!
//! Inventory CRUD, stock adjustments and CSV import/export.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use barback_core::csv_io::{parse_products_csv, write_products_csv, ImportError, ProductImportRow};
use barback_core::validation::{
    validate_category, validate_non_negative, validate_price_cents, validate_product_name, validate_stock_quantity,
    validate_unit,
};
use barback_core::Product;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::routes::{csv_download, AppJson};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/products/import", post(import_products))
        .route("/products/export", get(export_products))
        .route(
            "/products/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/products/{id}/quantity", patch(update_quantity))
}

/// Body of create and update.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    pub name: String,
    #[serde(default)]
    pub category: String,
    pub price_cents: i64,
    #[serde(default)]
    pub cost_cents: i64,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub unit: String,
    pub par_level: Option<f64>,
    pub sku: Option<String>,
}

/// Editable fields after validation.
struct ProductFields {
    name: String,
    category: String,
    price_cents: i64,
    cost_cents: i64,
    quantity: f64,
    unit: String,
    par_level: Option<f64>,
    sku: Option<String>,
}

impl ProductInput {
    fn validate(self) -> ApiResult<ProductFields> {
        validate_price_cents("priceCents", self.price_cents)?;
        validate_price_cents("costCents", self.cost_cents)?;
        validate_stock_quantity("quantity", self.quantity)?;
        if let Some(par) = self.par_level {
            validate_non_negative("parLevel", par)?;
        }

        Ok(ProductFields {
            name: validate_product_name(&self.name)?,
            category: validate_category(&self.category)?,
            price_cents: self.price_cents,
            cost_cents: self.cost_cents,
            quantity: self.quantity,
            unit: validate_unit(&self.unit)?,
            par_level: self.par_level,
            sku: self.sku.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        })
    }
}

impl ProductFields {
    fn apply(self, product: &mut Product) {
        product.name = self.name;
        product.category = self.category;
        product.price_cents = self.price_cents;
        product.cost_cents = self.cost_cents;
        product.quantity = self.quantity;
        product.unit = self.unit;
        product.par_level = self.par_level;
        product.sku = self.sku;
    }
}

fn new_product(owner_id: &str, fields: ProductFields) -> Product {
    let now = Utc::now();
    let mut product = Product {
        id: Uuid::new_v4().to_string(),
        owner_id: owner_id.to_string(),
        name: String::new(),
        category: String::new(),
        price_cents: 0,
        cost_cents: 0,
        quantity: 0.0,
        unit: String::new(),
        par_level: None,
        sku: None,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    fields.apply(&mut product);
    product
}

async fn load_product(state: &AppState, owner_id: &str, id: &str) -> ApiResult<Product> {
    state
        .db
        .get_product(owner_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product", id))
}

/// GET /api/products
pub async fn list_products(State(state): State<Arc<AppState>>, user: AuthUser) -> ApiResult<Json<Vec<Product>>> {
    let products = state.db.list_products(&user.id).await?;
    debug!(count = products.len(), "Listed products");
    Ok(Json(products))
}

/// POST /api/products
pub async fn create_product(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppJson(body): AppJson<ProductInput>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    let product = new_product(&user.id, body.validate()?);
    state.db.insert_product(&product).await?;

    info!(product_id = %product.id, name = %product.name, "Product created");
    Ok((StatusCode::CREATED, Json(product)))
}

/// GET /api/products/{id}
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Product>> {
    Ok(Json(load_product(&state, &user.id, &id).await?))
}

/// PUT /api/products/{id}
pub async fn update_product(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    AppJson(body): AppJson<ProductInput>,
) -> ApiResult<Json<Product>> {
    let fields = body.validate()?;
    let mut product = load_product(&state, &user.id, &id).await?;
    fields.apply(&mut product);
    product.updated_at = Utc::now();

    state.db.update_product(&product).await?;
    info!(product_id = %product.id, "Product updated");
    Ok(Json(product))
}

/// DELETE /api/products/{id}
pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.db.delete_product(&user.id, &id).await?;
    info!(product_id = %id, "Product deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct QuantityUpdate {
    pub quantity: Option<f64>,
    pub delta: Option<f64>,
}

/// PATCH /api/products/{id}/quantity
///
/// `{ "quantity": 12 }` sets the level, `{ "delta": -1.5 }` adjusts it.
pub async fn update_quantity(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    AppJson(body): AppJson<QuantityUpdate>,
) -> ApiResult<Json<Product>> {
    let product = match (body.quantity, body.delta) {
        (Some(quantity), None) => {
            validate_stock_quantity("quantity", quantity)?;
            state.db.set_product_quantity(&user.id, &id, quantity).await?
        }
        (None, Some(delta)) => {
            validate_stock_quantity("delta", delta)?;
            state.db.adjust_product_quantity(&user.id, &id, delta).await?
        }
        _ => return Err(ApiError::validation("Provide exactly one of quantity or delta")),
    };

    debug!(product_id = %id, quantity = product.quantity, "Stock level changed");
    Ok(Json(product))
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub created: usize,
    pub updated: usize,
    pub errors: Vec<ImportError>,
}

impl From<ProductImportRow> for ProductFields {
    fn from(row: ProductImportRow) -> Self {
        ProductFields {
            name: row.name,
            category: row.category,
            price_cents: row.price_cents,
            cost_cents: row.cost_cents,
            quantity: row.quantity,
            unit: row.unit,
            par_level: row.par_level,
            sku: row.sku,
        }
    }
}

/// POST /api/products/import
///
/// Body is the CSV file. Rows upsert by case-insensitive name; bad rows are
/// reported by line and skipped.
pub async fn import_products(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    body: String,
) -> ApiResult<Json<ImportSummary>> {
    let parsed = parse_products_csv(body.as_bytes())?;
    let mut summary = ImportSummary {
        errors: parsed.errors,
        ..ImportSummary::default()
    };

    for row in parsed.rows {
        match state.db.find_product_by_name(&user.id, &row.name).await? {
            Some(mut existing) => {
                ProductFields::from(row).apply(&mut existing);
                existing.updated_at = Utc::now();
                state.db.update_product(&existing).await?;
                summary.updated += 1;
            }
            None => {
                state.db.insert_product(&new_product(&user.id, row.into())).await?;
                summary.created += 1;
            }
        }
    }

    info!(
        created = summary.created,
        updated = summary.updated,
        errors = summary.errors.len(),
        "Products imported"
    );
    Ok(Json(summary))
}

/// GET /api/products/export
pub async fn export_products(State(state): State<Arc<AppState>>, user: AuthUser) -> ApiResult<Response> {
    let products = state.db.list_products(&user.id).await?;
    Ok(csv_download("products.csv", write_products_csv(&products)?))
}
