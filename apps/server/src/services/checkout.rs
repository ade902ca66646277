//! Cart to recorded sale.
//!
//! Shared by `POST /api/sales/checkout` and `POST /api/tabs/{id}/close`.
//! Prices always come from the server: checkout prices lines from the
//! current catalog, tab close uses the prices frozen when each line was
//! rung up.

use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use barback_core::cart::{Cart, CartItem};
use barback_core::checkout::{prepare_sale, Catalog, Payment};
use barback_core::validation::validate_sale_quantity;
use barback_core::{ItemKind, Product, Recipe, SaleWithItems, Settings, Tab};
use barback_db::{Database, StockDelta};

use crate::error::ApiResult;

/// A requested line: what to sell and how many.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineRequest {
    pub kind: ItemKind,
    pub item_id: String,
    pub quantity: i64,
}

/// An owner's products and recipes, loaded once per request.
#[derive(Debug, Clone)]
pub struct OwnerCatalog {
    products: Vec<Product>,
    recipes: Vec<Recipe>,
}

impl OwnerCatalog {
    pub async fn load(db: &Database, owner_id: &str) -> ApiResult<Self> {
        Ok(OwnerCatalog {
            products: db.list_products(owner_id).await?,
            recipes: db.list_recipes(owner_id).await?,
        })
    }

    pub fn catalog(&self) -> Catalog<'_> {
        Catalog::new(&self.products, &self.recipes)
    }
}

/// Prices `lines` from the catalog.
pub fn cart_from_lines(catalog: &Catalog<'_>, lines: &[LineRequest]) -> ApiResult<Cart> {
    let mut cart = Cart::new();
    for line in lines {
        validate_sale_quantity(line.quantity)?;
        cart.add_item(catalog.cart_item(line.kind, &line.item_id, line.quantity)?)?;
    }
    Ok(cart)
}

/// The tab's lines at the prices they were rung up at.
pub fn cart_from_tab(tab: &Tab) -> ApiResult<Cart> {
    let mut cart = Cart::new();
    for item in &tab.items {
        cart.add_item(CartItem {
            kind: item.kind,
            item_id: item.item_id.clone(),
            name: item.name.clone(),
            category: item.category.clone(),
            unit_price_cents: item.unit_price_cents,
            quantity: item.quantity,
        })?;
    }
    Ok(cart)
}

pub async fn load_settings(db: &Database, owner_id: &str) -> ApiResult<Settings> {
    Ok(Settings::from_pairs(&db.get_settings(owner_id).await?))
}

/// Taxes, settles and records `cart` in one store transaction.
///
/// When `tab_id` is set the tab is closed by the same transaction.
pub async fn complete_sale(
    db: &Database,
    owner_id: &str,
    catalog: &Catalog<'_>,
    cart: &Cart,
    settings: &Settings,
    payment: Payment,
    tab_id: Option<String>,
) -> ApiResult<SaleWithItems> {
    let draft = prepare_sale(
        owner_id,
        cart,
        catalog,
        &settings.tax_settings(),
        payment,
        tab_id,
        Utc::now(),
    )?;

    let stock: Vec<StockDelta> = draft
        .stock
        .iter()
        .map(|(product_id, units)| StockDelta {
            product_id: product_id.clone(),
            delta: -units,
        })
        .collect();

    let recorded = db
        .record_sale(draft.sale, draft.items, &stock, settings.allow_negative_stock)
        .await?;

    info!(
        sale_id = %recorded.sale.id,
        receipt = %recorded.sale.receipt_number,
        total_cents = recorded.sale.total_cents,
        lines = recorded.items.len(),
        tab_id = ?recorded.sale.tab_id,
        "Sale recorded"
    );
    Ok(recorded)
}
