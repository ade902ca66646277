//! # Tab Routes
//!
//! ```text
//!   POST /tabs ──► open ──┬── POST /{id}/items, DELETE /{id}/items/{itemId}
//!                         │
//!                         ├── POST /{id}/close  ──► sale recorded, tab closed
//!                         └── POST /{id}/cancel ──► cancelled, nothing sold
//! ```
//!
//! Closed and cancelled tabs are read-only; touching them is a 409.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use barback_core::checkout::Payment;
use barback_core::validation::{validate_customer_name, validate_sale_quantity};
use barback_core::{
    CoreError, ItemKind, PaymentMethod, SaleWithItems, Tab, TabItem, TabStatus, ValidationError, MAX_CART_ITEMS,
    MAX_ITEM_QUANTITY,
};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::routes::{AppJson, AppQuery};
use crate::services::checkout::{cart_from_tab, complete_sale, load_settings, OwnerCatalog};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tabs", get(list_tabs).post(open_tab))
        .route("/tabs/{id}", get(get_tab))
        .route("/tabs/{id}/items", post(add_item))
        .route("/tabs/{id}/items/{item_id}", delete(remove_item))
        .route("/tabs/{id}/close", post(close_tab))
        .route("/tabs/{id}/cancel", post(cancel_tab))
}

/// A tab with its running pre-tax total.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabView {
    #[serde(flatten)]
    pub tab: Tab,
    pub subtotal_cents: i64,
}

impl From<Tab> for TabView {
    fn from(tab: Tab) -> Self {
        TabView {
            subtotal_cents: tab.subtotal().cents(),
            tab,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenTabRequest {
    pub customer_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub kind: ItemKind,
    pub item_id: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseTabRequest {
    pub payment_method: PaymentMethod,
    pub tendered_cents: Option<i64>,
    pub payment_intent_id: Option<String>,
}

async fn load_tab(state: &AppState, owner_id: &str, id: &str) -> ApiResult<Tab> {
    state
        .db
        .get_tab(owner_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Tab", id))
}

/// An open tab, or a 409 naming its status.
async fn load_open_tab(state: &AppState, owner_id: &str, id: &str) -> ApiResult<Tab> {
    let tab = load_tab(state, owner_id, id).await?;
    if !tab.is_open() {
        return Err(CoreError::TabNotOpen {
            tab_id: tab.id,
            current_status: tab.status.as_str().to_string(),
        }
        .into());
    }
    Ok(tab)
}

/// GET /api/tabs?status=open
pub async fn list_tabs(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppQuery(query): AppQuery<StatusQuery>,
) -> ApiResult<Json<Vec<TabView>>> {
    let status = match query.status.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(raw) => Some(TabStatus::parse(raw).ok_or_else(|| ValidationError::NotAllowed {
            field: "status".to_string(),
            allowed: vec!["open".to_string(), "closed".to_string(), "cancelled".to_string()],
        })?),
        None => None,
    };

    let tabs = state.db.list_tabs(&user.id, status).await?;
    Ok(Json(tabs.into_iter().map(TabView::from).collect()))
}

/// POST /api/tabs
pub async fn open_tab(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppJson(body): AppJson<OpenTabRequest>,
) -> ApiResult<(StatusCode, Json<TabView>)> {
    let tab = Tab {
        id: Uuid::new_v4().to_string(),
        owner_id: user.id.clone(),
        customer_name: validate_customer_name(&body.customer_name)?,
        status: TabStatus::Open,
        sale_id: None,
        opened_at: Utc::now(),
        closed_at: None,
        items: Vec::new(),
    };
    state.db.open_tab(&tab).await?;

    info!(tab_id = %tab.id, customer = %tab.customer_name, "Tab opened");
    Ok((StatusCode::CREATED, Json(tab.into())))
}

/// GET /api/tabs/{id}
pub async fn get_tab(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<TabView>> {
    Ok(Json(load_tab(&state, &user.id, &id).await?.into()))
}

/// POST /api/tabs/{id}/items
///
/// The line is priced now; later price changes do not touch it.
pub async fn add_item(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    AppJson(body): AppJson<AddItemRequest>,
) -> ApiResult<Json<TabView>> {
    validate_sale_quantity(body.quantity)?;
    let tab = load_open_tab(&state, &user.id, &id).await?;

    let (name, category, unit_price_cents) = match body.kind {
        ItemKind::Product => {
            let product = state
                .db
                .get_product(&user.id, &body.item_id)
                .await?
                .ok_or_else(|| ApiError::not_found("Product", &body.item_id))?;
            (product.name, product.category, product.price_cents)
        }
        ItemKind::Recipe => {
            let recipe = state
                .db
                .get_recipe(&user.id, &body.item_id)
                .await?
                .ok_or_else(|| ApiError::not_found("Recipe", &body.item_id))?;
            (recipe.name, recipe.category, recipe.price_cents)
        }
    };

    // lines merge on item and price, mirroring the store
    match tab
        .items
        .iter()
        .find(|i| i.kind == body.kind && i.item_id == body.item_id && i.unit_price_cents == unit_price_cents)
    {
        Some(existing) if existing.quantity + body.quantity > MAX_ITEM_QUANTITY => {
            return Err(CoreError::QuantityTooLarge {
                requested: existing.quantity + body.quantity,
                max: MAX_ITEM_QUANTITY,
            }
            .into());
        }
        None if tab.items.len() >= MAX_CART_ITEMS => {
            return Err(CoreError::CartTooLarge { max: MAX_CART_ITEMS }.into());
        }
        _ => {}
    }

    let item = TabItem {
        id: Uuid::new_v4().to_string(),
        tab_id: tab.id.clone(),
        kind: body.kind,
        item_id: body.item_id,
        name,
        category,
        unit_price_cents,
        quantity: body.quantity,
        added_at: Utc::now(),
    };
    let tab = state.db.add_tab_item(&user.id, item).await?;
    Ok(Json(tab.into()))
}

/// DELETE /api/tabs/{id}/items/{item_id}
pub async fn remove_item(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((id, item_id)): Path<(String, String)>,
) -> ApiResult<Json<TabView>> {
    let tab = state.db.remove_tab_item(&user.id, &id, &item_id).await?;
    Ok(Json(tab.into()))
}

/// POST /api/tabs/{id}/close
///
/// Runs checkout over the tab's lines. The sale and the tab's closing are
/// one store transaction.
pub async fn close_tab(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    AppJson(body): AppJson<CloseTabRequest>,
) -> ApiResult<(StatusCode, Json<SaleWithItems>)> {
    let tab = load_open_tab(&state, &user.id, &id).await?;
    let cart = cart_from_tab(&tab)?;

    let settings = load_settings(&state.db, &user.id).await?;
    let owner_catalog = OwnerCatalog::load(&state.db, &user.id).await?;
    let payment = Payment {
        method: body.payment_method,
        tendered_cents: body.tendered_cents,
        payment_intent_id: body.payment_intent_id,
    };

    let sale = complete_sale(
        &state.db,
        &user.id,
        &owner_catalog.catalog(),
        &cart,
        &settings,
        payment,
        Some(tab.id.clone()),
    )
    .await?;

    info!(tab_id = %tab.id, sale_id = %sale.sale.id, "Tab closed");
    Ok((StatusCode::CREATED, Json(sale)))
}

/// POST /api/tabs/{id}/cancel
pub async fn cancel_tab(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<TabView>> {
    let tab = state.db.cancel_tab(&user.id, &id).await?;
    info!(tab_id = %tab.id, "Tab cancelled");
    Ok(Json(tab.into()))
}
