//! # Cart
//!
//! The lines being rung up for one checkout, or the contents of a tab when
//! it is settled.
//!
//! ## Checkout Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Client cart (ids + quantities)                                         │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  Server rebuilds Cart from stored prices   CartItem::from_product/recipe│
//! │        │                                                                │
//! │        ├──► totals(&TaxSettings) ──► CartTotals (tax breakdown)         │
//! │        │                                                                │
//! │        ├──► stock_requirements() ──► product_id → units to deduct       │
//! │        │                                                                │
//! │        └──► settle_payment() ──────► tendered / change                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Prices sent by the client are never trusted: every [`CartItem`] is built
//! from a stored product or recipe.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::tax::{calculate_tax_for, TaxResult, TaxSettings};
use crate::types::{ItemKind, PaymentMethod, Product, Recipe};
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

// =============================================================================
// Cart Item
// =============================================================================

/// One line in the cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub kind: ItemKind,
    pub item_id: String,
    /// Name at the time the line was added.
    pub name: String,
    pub category: String,
    /// Price at the time the line was added.
    pub unit_price_cents: i64,
    pub quantity: i64,
}

impl CartItem {
    pub fn from_product(product: &Product, quantity: i64) -> Self {
        CartItem {
            kind: ItemKind::Product,
            item_id: product.id.clone(),
            name: product.name.clone(),
            category: product.category.clone(),
            unit_price_cents: product.price_cents,
            quantity,
        }
    }

    pub fn from_recipe(recipe: &Recipe, quantity: i64) -> Self {
        CartItem {
            kind: ItemKind::Recipe,
            item_id: recipe.id.clone(),
            name: recipe.name.clone(),
            category: recipe.category.clone(),
            unit_price_cents: recipe.price_cents,
            quantity,
        }
    }

    /// Unit price × quantity.
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.unit_price_cents).multiply_quantity(self.quantity)
    }
}

// =============================================================================
// Cart
// =============================================================================

/// The cart.
///
/// ## Invariants
/// - Lines are unique by `(kind, item_id)`; adding again raises quantity
/// - Quantity is in `1..=MAX_ITEM_QUANTITY`; setting 0 removes the line
/// - At most `MAX_CART_ITEMS` lines
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub items: Vec<CartItem>,
}

impl Cart {
    pub fn new() -> Self {
        Cart::default()
    }

    /// Adds a line, or raises the quantity of an identical line.
    pub fn add_item(&mut self, item: CartItem) -> CoreResult<()> {
        if item.quantity <= 0 {
            return Err(CoreError::Validation(crate::ValidationError::MustBePositive {
                field: "quantity".to_string(),
            }));
        }

        if let Some(existing) = self
            .items
            .iter_mut()
            .find(|i| i.kind == item.kind && i.item_id == item.item_id)
        {
            let new_qty = existing.quantity + item.quantity;
            if new_qty > MAX_ITEM_QUANTITY {
                return Err(CoreError::QuantityTooLarge {
                    requested: new_qty,
                    max: MAX_ITEM_QUANTITY,
                });
            }
            existing.quantity = new_qty;
            return Ok(());
        }

        if item.quantity > MAX_ITEM_QUANTITY {
            return Err(CoreError::QuantityTooLarge {
                requested: item.quantity,
                max: MAX_ITEM_QUANTITY,
            });
        }
        if self.items.len() >= MAX_CART_ITEMS {
            return Err(CoreError::CartTooLarge { max: MAX_CART_ITEMS });
        }

        self.items.push(item);
        Ok(())
    }

    /// Sets the quantity of a line. Zero removes it.
    ///
    /// ## Returns
    /// `Ok(false)` when no such line exists.
    pub fn update_quantity(&mut self, kind: ItemKind, item_id: &str, quantity: i64) -> CoreResult<bool> {
        if quantity == 0 {
            return Ok(self.remove_item(kind, item_id));
        }
        if !(1..=MAX_ITEM_QUANTITY).contains(&quantity) {
            return Err(CoreError::QuantityTooLarge {
                requested: quantity,
                max: MAX_ITEM_QUANTITY,
            });
        }

        match self
            .items
            .iter_mut()
            .find(|i| i.kind == kind && i.item_id == item_id)
        {
            Some(item) => {
                item.quantity = quantity;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Removes a line. Returns whether anything was removed.
    pub fn remove_item(&mut self, kind: ItemKind, item_id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|i| !(i.kind == kind && i.item_id == item_id));
        self.items.len() != before
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Number of distinct lines.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn subtotal(&self) -> Money {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Subtotal, tax breakdown and grand total.
    ///
    /// The breakdown is unrounded; `tax_cents` rounds its total once.
    pub fn totals(&self, tax: &TaxSettings) -> CartTotals {
        let subtotal = self.subtotal();
        let breakdown = calculate_tax_for(subtotal.as_dollars(), tax);
        let tax_cents = Money::from_dollars_rounded(breakdown.total).cents();

        CartTotals {
            item_count: self.item_count(),
            total_quantity: self.total_quantity(),
            subtotal_cents: subtotal.cents(),
            tax_cents,
            total_cents: subtotal.cents() + tax_cents,
            tax: breakdown,
        }
    }

    /// Units of each product this cart takes out of stock.
    ///
    /// Product lines deduct their quantity; recipe lines deduct each
    /// ingredient's per-serving quantity times the servings sold. Recipes
    /// are looked up through `recipe`.
    pub fn stock_requirements<'a, F>(&self, mut recipe: F) -> CoreResult<BTreeMap<String, f64>>
    where
        F: FnMut(&str) -> Option<&'a Recipe>,
    {
        let mut required: BTreeMap<String, f64> = BTreeMap::new();
        for item in &self.items {
            match item.kind {
                ItemKind::Product => {
                    *required.entry(item.item_id.clone()).or_default() += item.quantity as f64;
                }
                ItemKind::Recipe => {
                    let r = recipe(&item.item_id)
                        .ok_or_else(|| CoreError::RecipeNotFound(item.item_id.clone()))?;
                    for ing in &r.ingredients {
                        *required.entry(ing.product_id.clone()).or_default() +=
                            ing.quantity * item.quantity as f64;
                    }
                }
            }
        }
        Ok(required)
    }
}

/// Cart totals summary for API responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    pub item_count: usize,
    pub total_quantity: i64,
    pub subtotal_cents: i64,
    /// Tax total rounded to cents.
    pub tax_cents: i64,
    pub total_cents: i64,
    /// Unrounded breakdown with named components.
    pub tax: TaxResult,
}

// =============================================================================
// Payment
// =============================================================================

/// Amount handed over and change due for a settled sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tender {
    pub tendered_cents: Option<i64>,
    pub change_cents: Option<i64>,
}

/// Validates the tendered amount for a payment method.
///
/// ## Rules
/// - Cash needs `tendered >= total` and yields change
/// - Card and terminal payments are for the exact total; any tendered
///   amount is ignored
pub fn settle_payment(method: PaymentMethod, total_cents: i64, tendered_cents: Option<i64>) -> CoreResult<Tender> {
    match method {
        PaymentMethod::Cash => {
            let tendered = tendered_cents.ok_or_else(|| CoreError::InvalidPaymentAmount {
                reason: "cash payments need a tendered amount".to_string(),
            })?;
            if tendered < total_cents {
                return Err(CoreError::InvalidPaymentAmount {
                    reason: format!(
                        "tendered {} is less than total {}",
                        Money::from_cents(tendered),
                        Money::from_cents(total_cents)
                    ),
                });
            }
            Ok(Tender {
                tendered_cents: Some(tendered),
                change_cents: Some(tendered - total_cents),
            })
        }
        PaymentMethod::Card | PaymentMethod::Terminal => Ok(Tender {
            tendered_cents: None,
            change_cents: None,
        }),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tax::TaxRegion;
    use crate::types::RecipeIngredient;
    use chrono::Utc;

    fn product(id: &str, price_cents: i64) -> Product {
        let now = Utc::now();
        Product {
            id: id.to_string(),
            owner_id: "owner".to_string(),
            name: format!("Product {}", id),
            category: "Beer".to_string(),
            price_cents,
            cost_cents: price_cents / 3,
            quantity: 24.0,
            unit: "bottle".to_string(),
            par_level: None,
            sku: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn margarita() -> Recipe {
        let now = Utc::now();
        Recipe {
            id: "marg".to_string(),
            owner_id: "owner".to_string(),
            name: "Margarita".to_string(),
            category: "Cocktails".to_string(),
            price_cents: 1200,
            description: None,
            ingredients: vec![
                RecipeIngredient {
                    recipe_id: "marg".to_string(),
                    product_id: "tequila".to_string(),
                    quantity: 0.06,
                },
                RecipeIngredient {
                    recipe_id: "marg".to_string(),
                    product_id: "lime".to_string(),
                    quantity: 1.0,
                },
            ],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_cart_add_item() {
        let mut cart = Cart::new();
        cart.add_item(CartItem::from_product(&product("1", 999), 2)).unwrap();

        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.total_quantity(), 2);
        assert_eq!(cart.subtotal().cents(), 1998);
    }

    #[test]
    fn test_cart_add_same_line_increases_quantity() {
        let mut cart = Cart::new();
        let p = product("1", 999);
        cart.add_item(CartItem::from_product(&p, 2)).unwrap();
        cart.add_item(CartItem::from_product(&p, 3)).unwrap();

        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.total_quantity(), 5);
    }

    #[test]
    fn test_product_and_recipe_with_same_id_are_distinct_lines() {
        let mut cart = Cart::new();
        let mut p = product("marg", 500);
        p.name = "Margarita mix".to_string();
        cart.add_item(CartItem::from_product(&p, 1)).unwrap();
        cart.add_item(CartItem::from_recipe(&margarita(), 1)).unwrap();
        assert_eq!(cart.item_count(), 2);
    }

    #[test]
    fn test_quantity_limits() {
        let mut cart = Cart::new();
        let p = product("1", 100);
        assert!(cart.add_item(CartItem::from_product(&p, 0)).is_err());
        assert!(cart.add_item(CartItem::from_product(&p, MAX_ITEM_QUANTITY + 1)).is_err());

        cart.add_item(CartItem::from_product(&p, MAX_ITEM_QUANTITY)).unwrap();
        let err = cart.add_item(CartItem::from_product(&p, 1)).unwrap_err();
        assert!(matches!(err, CoreError::QuantityTooLarge { .. }));
    }

    #[test]
    fn test_update_and_remove() {
        let mut cart = Cart::new();
        cart.add_item(CartItem::from_product(&product("1", 100), 1)).unwrap();

        assert!(cart.update_quantity(ItemKind::Product, "1", 4).unwrap());
        assert_eq!(cart.total_quantity(), 4);
        assert!(!cart.update_quantity(ItemKind::Product, "nope", 4).unwrap());

        assert!(cart.update_quantity(ItemKind::Product, "1", 0).unwrap());
        assert!(cart.is_empty());
        assert!(!cart.remove_item(ItemKind::Product, "1"));
    }

    #[test]
    fn test_totals_use_region_breakdown() {
        let mut cart = Cart::new();
        cart.add_item(CartItem::from_product(&product("1", 10000), 1)).unwrap();

        let totals = cart.totals(&TaxSettings {
            region: TaxRegion::Alberta,
            flat_rate_percent: 8.0,
        });
        assert_eq!(totals.subtotal_cents, 10000);
        assert_eq!(totals.tax_cents, 500);
        assert_eq!(totals.total_cents, 10500);
        assert_eq!(totals.tax.components[0].name, "GST");
    }

    #[test]
    fn test_totals_round_quebec_tax_once() {
        let mut cart = Cart::new();
        cart.add_item(CartItem::from_product(&product("1", 1000), 1)).unwrap();

        let totals = cart.totals(&TaxSettings {
            region: TaxRegion::Quebec,
            flat_rate_percent: 8.0,
        });
        // 0.50 + 1.047375 = 1.547375
        assert_eq!(totals.tax_cents, 155);
        assert_eq!(totals.total_cents, 1155);
    }

    #[test]
    fn test_stock_requirements_expand_recipes() {
        let recipe = margarita();
        let mut cart = Cart::new();
        cart.add_item(CartItem::from_recipe(&recipe, 3)).unwrap();
        cart.add_item(CartItem::from_product(&product("lime", 50), 2)).unwrap();

        let required = cart
            .stock_requirements(|id| (id == recipe.id).then_some(&recipe))
            .unwrap();
        assert!((required["tequila"] - 0.18).abs() < 1e-9);
        assert_eq!(required["lime"], 5.0);
    }

    #[test]
    fn test_stock_requirements_unknown_recipe() {
        let recipe = margarita();
        let mut cart = Cart::new();
        cart.add_item(CartItem::from_recipe(&recipe, 1)).unwrap();

        let err = cart.stock_requirements(|_| None).unwrap_err();
        assert!(matches!(err, CoreError::RecipeNotFound(_)));
    }

    #[test]
    fn test_settle_cash_payment() {
        let tender = settle_payment(PaymentMethod::Cash, 1155, Some(2000)).unwrap();
        assert_eq!(tender.change_cents, Some(845));

        assert!(settle_payment(PaymentMethod::Cash, 1155, Some(1000)).is_err());
        assert!(settle_payment(PaymentMethod::Cash, 1155, None).is_err());
    }

    #[test]
    fn test_settle_card_payment_ignores_tendered() {
        let tender = settle_payment(PaymentMethod::Terminal, 1155, Some(5)).unwrap();
        assert_eq!(tender.tendered_cents, None);
        assert_eq!(tender.change_cents, None);
    }
}
