//! # Checkout Assembly
//!
//! Turns a priced [`Cart`] into the rows a store persists: the [`Sale`],
//! its [`SaleItem`] snapshots and the stock each product loses.
//!
//! Pure: no I/O, no clock. The caller passes `now` and fresh ids come from
//! `uuid`, so the same cart always produces the same totals.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::cart::{settle_payment, Cart, CartItem, CartTotals};
use crate::error::{CoreError, CoreResult};
use crate::tax::TaxSettings;
use crate::types::{ItemKind, PaymentMethod, Product, Recipe, Sale, SaleItem, SaleStatus};

/// Products and recipes of one owner, indexed by id.
#[derive(Debug, Clone, Default)]
pub struct Catalog<'a> {
    products: HashMap<&'a str, &'a Product>,
    recipes: HashMap<&'a str, &'a Recipe>,
}

impl<'a> Catalog<'a> {
    pub fn new(products: &'a [Product], recipes: &'a [Recipe]) -> Self {
        Catalog {
            products: products.iter().map(|p| (p.id.as_str(), p)).collect(),
            recipes: recipes.iter().map(|r| (r.id.as_str(), r)).collect(),
        }
    }

    pub fn product(&self, id: &str) -> Option<&'a Product> {
        self.products.get(id).copied()
    }

    pub fn recipe(&self, id: &str) -> Option<&'a Recipe> {
        self.recipes.get(id).copied()
    }

    /// A cart line priced from the catalog. Inactive products are not sold.
    pub fn cart_item(&self, kind: ItemKind, id: &str, quantity: i64) -> CoreResult<CartItem> {
        match kind {
            ItemKind::Product => self
                .product(id)
                .filter(|p| p.is_active)
                .map(|p| CartItem::from_product(p, quantity))
                .ok_or_else(|| CoreError::ProductNotFound(id.to_string())),
            ItemKind::Recipe => self
                .recipe(id)
                .map(|r| CartItem::from_recipe(r, quantity))
                .ok_or_else(|| CoreError::RecipeNotFound(id.to_string())),
        }
    }

    /// Current unit cost; a recipe costs the sum of its ingredients.
    pub fn unit_cost_cents(&self, kind: ItemKind, id: &str) -> i64 {
        match kind {
            ItemKind::Product => self.product(id).map_or(0, |p| p.cost_cents),
            ItemKind::Recipe => self
                .recipe(id)
                .map_or(0, |r| r.cost_cents(|pid| self.products.get(pid).copied())),
        }
    }
}

/// How the sale is being paid.
#[derive(Debug, Clone, PartialEq)]
pub struct Payment {
    pub method: PaymentMethod,
    pub tendered_cents: Option<i64>,
    pub payment_intent_id: Option<String>,
}

/// Everything needed to record one sale.
#[derive(Debug, Clone, PartialEq)]
pub struct SaleDraft {
    pub sale: Sale,
    pub items: Vec<SaleItem>,
    /// Units each product loses, by product id.
    pub stock: BTreeMap<String, f64>,
    pub totals: CartTotals,
}

/// Prices, taxes and settles `cart`.
///
/// `receipt_number` is left empty; the store assigns it.
pub fn prepare_sale(
    owner_id: &str,
    cart: &Cart,
    catalog: &Catalog<'_>,
    tax: &TaxSettings,
    payment: Payment,
    tab_id: Option<String>,
    now: DateTime<Utc>,
) -> CoreResult<SaleDraft> {
    if cart.is_empty() {
        return Err(CoreError::EmptyCart);
    }

    let totals = cart.totals(tax);
    let tender = settle_payment(payment.method, totals.total_cents, payment.tendered_cents)?;
    let stock = cart.stock_requirements(|id| catalog.recipe(id))?;

    let sale_id = Uuid::new_v4().to_string();
    let items = cart
        .items
        .iter()
        .map(|line| SaleItem {
            id: Uuid::new_v4().to_string(),
            sale_id: sale_id.clone(),
            kind: line.kind,
            item_id: line.item_id.clone(),
            name_snapshot: line.name.clone(),
            category: line.category.clone(),
            unit_price_cents: line.unit_price_cents,
            unit_cost_cents: catalog.unit_cost_cents(line.kind, &line.item_id),
            quantity: line.quantity,
            line_total_cents: line.line_total().cents(),
        })
        .collect();

    let sale = Sale {
        id: sale_id,
        owner_id: owner_id.to_string(),
        receipt_number: String::new(),
        status: SaleStatus::Completed,
        subtotal_cents: totals.subtotal_cents,
        tax_cents: totals.tax_cents,
        total_cents: totals.total_cents,
        tax_region: tax.region,
        tax_breakdown: totals.tax.components.clone(),
        payment_method: payment.method,
        tendered_cents: tender.tendered_cents,
        change_cents: tender.change_cents,
        payment_intent_id: payment.payment_intent_id.filter(|_| payment.method == PaymentMethod::Terminal),
        tab_id,
        created_at: now,
        voided_at: None,
    };

    Ok(SaleDraft {
        sale,
        items,
        stock,
        totals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tax::TaxRegion;
    use crate::types::RecipeIngredient;

    fn product(id: &str, price_cents: i64, cost_cents: i64) -> Product {
        let now = Utc::now();
        Product {
            id: id.to_string(),
            owner_id: "owner".to_string(),
            name: id.to_uppercase(),
            category: "Spirits".to_string(),
            price_cents,
            cost_cents,
            quantity: 10.0,
            unit: "bottle".to_string(),
            par_level: None,
            sku: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn negroni() -> Recipe {
        let now = Utc::now();
        let ing = |pid: &str| RecipeIngredient {
            recipe_id: "negroni".to_string(),
            product_id: pid.to_string(),
            quantity: 0.04,
        };
        Recipe {
            id: "negroni".to_string(),
            owner_id: "owner".to_string(),
            name: "Negroni".to_string(),
            category: "Cocktails".to_string(),
            price_cents: 1400,
            description: None,
            ingredients: vec![ing("gin"), ing("campari")],
            created_at: now,
            updated_at: now,
        }
    }

    fn cash(tendered: i64) -> Payment {
        Payment {
            method: PaymentMethod::Cash,
            tendered_cents: Some(tendered),
            payment_intent_id: None,
        }
    }

    #[test]
    fn test_prepare_sale_snapshots_prices_and_costs() {
        let products = vec![product("gin", 900, 2500), product("campari", 800, 2000)];
        let recipes = vec![negroni()];
        let catalog = Catalog::new(&products, &recipes);

        let mut cart = Cart::new();
        cart.add_item(catalog.cart_item(ItemKind::Recipe, "negroni", 2).unwrap()).unwrap();
        cart.add_item(catalog.cart_item(ItemKind::Product, "gin", 1).unwrap()).unwrap();

        let tax = TaxSettings {
            region: TaxRegion::Alberta,
            flat_rate_percent: 0.0,
        };
        let draft = prepare_sale("owner", &cart, &catalog, &tax, cash(5000), None, Utc::now()).unwrap();

        assert_eq!(draft.sale.subtotal_cents, 3700);
        assert_eq!(draft.sale.tax_cents, 185);
        assert_eq!(draft.sale.total_cents, 3885);
        assert_eq!(draft.sale.change_cents, Some(1115));
        assert_eq!(draft.sale.tax_breakdown[0].name, "GST");

        // 0.04 * 2500 + 0.04 * 2000
        assert_eq!(draft.items[0].unit_cost_cents, 180);
        assert_eq!(draft.items[0].line_total_cents, 2800);
        assert!(draft.items.iter().all(|i| i.sale_id == draft.sale.id));

        assert!((draft.stock["gin"] - 1.08).abs() < 1e-9);
        assert!((draft.stock["campari"] - 0.08).abs() < 1e-9);
    }

    #[test]
    fn test_prepare_sale_rejects_empty_and_short_cash() {
        let products = vec![product("gin", 900, 2500)];
        let catalog = Catalog::new(&products, &[]);
        let tax = TaxSettings::default();

        let empty = prepare_sale("owner", &Cart::new(), &catalog, &tax, cash(100), None, Utc::now());
        assert!(matches!(empty, Err(CoreError::EmptyCart)));

        let mut cart = Cart::new();
        cart.add_item(catalog.cart_item(ItemKind::Product, "gin", 1).unwrap()).unwrap();
        let short = prepare_sale("owner", &cart, &catalog, &tax, cash(100), None, Utc::now());
        assert!(matches!(short, Err(CoreError::InvalidPaymentAmount { .. })));
    }

    #[test]
    fn test_catalog_hides_inactive_products() {
        let mut gone = product("gin", 900, 2500);
        gone.is_active = false;
        let products = vec![gone];
        let catalog = Catalog::new(&products, &[]);

        assert!(matches!(
            catalog.cart_item(ItemKind::Product, "gin", 1),
            Err(CoreError::ProductNotFound(_))
        ));
        assert!(matches!(
            catalog.cart_item(ItemKind::Recipe, "gin", 1),
            Err(CoreError::RecipeNotFound(_))
        ));
        // cost still resolves for historical lines
        assert_eq!(catalog.unit_cost_cents(ItemKind::Product, "gin"), 2500);
    }
}
