//! # In-Memory Store
//!
//! A [`Store`] kept entirely in process memory behind one
//! `tokio::sync::RwLock`. Used by tests and, when configured, as the
//! fallback when the SQLite file cannot be opened.
//!
//! Every multi-step write takes the write lock once, validates everything,
//! then mutates, so a failed checkout leaves no partial state behind (the
//! same guarantee the SQLite transaction gives).

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use barback_core::{
    Product, Recipe, Sale, SaleItem, SaleRecord, SaleStatus, SaleWithItems, StripeAccount, Tab, TabItem, TabStatus,
    User,
};

use crate::error::{DbError, DbResult};
use crate::store::{
    merge_deltas, receipt_number, would_oversell, DateRange, ProductStore, RecipeStore, SaleStore, SettingsStore,
    StockDelta, Store, StripeKeyStore, TabStore, UserStore,
};

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<String, User>,
    products: HashMap<String, Product>,
    recipes: HashMap<String, Recipe>,
    sales: HashMap<String, SaleWithItems>,
    movements: HashMap<String, Vec<StockDelta>>,
    tabs: HashMap<String, Tab>,
    settings: HashMap<String, BTreeMap<String, String>>,
    stripe: HashMap<String, StripeAccount>,
}

impl MemoryState {
    fn active_product(&self, owner_id: &str, id: &str) -> Option<&Product> {
        self.products
            .get(id)
            .filter(|p| p.owner_id == owner_id && p.is_active)
    }

    fn active_product_mut(&mut self, owner_id: &str, id: &str) -> DbResult<&mut Product> {
        self.products
            .get_mut(id)
            .filter(|p| p.owner_id == owner_id && p.is_active)
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    fn owned_tab_mut(&mut self, owner_id: &str, id: &str) -> DbResult<&mut Tab> {
        self.tabs
            .get_mut(id)
            .filter(|t| t.owner_id == owner_id)
            .ok_or_else(|| DbError::not_found("Tab", id))
    }

    fn open_tab_mut(&mut self, owner_id: &str, id: &str) -> DbResult<&mut Tab> {
        let tab = self.owned_tab_mut(owner_id, id)?;
        if !tab.is_open() {
            return Err(DbError::invalid_state("Tab", id, tab.status.as_str()));
        }
        Ok(tab)
    }
}

/// In-memory [`Store`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

// =============================================================================
// Products
// =============================================================================

#[async_trait]
impl ProductStore for MemoryStore {
    async fn list_products(&self, owner_id: &str) -> DbResult<Vec<Product>> {
        let state = self.state.read().await;
        let mut products: Vec<Product> = state
            .products
            .values()
            .filter(|p| p.owner_id == owner_id && p.is_active)
            .cloned()
            .collect();
        products.sort_by_key(|p| (p.name.to_lowercase(), p.id.clone()));
        Ok(products)
    }

    async fn get_product(&self, owner_id: &str, id: &str) -> DbResult<Option<Product>> {
        Ok(self.state.read().await.active_product(owner_id, id).cloned())
    }

    async fn find_product_by_name(&self, owner_id: &str, name: &str) -> DbResult<Option<Product>> {
        let state = self.state.read().await;
        let wanted = name.trim().to_lowercase();
        Ok(state
            .products
            .values()
            .filter(|p| p.owner_id == owner_id && p.is_active && p.name.to_lowercase() == wanted)
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
            .cloned())
    }

    async fn insert_product(&self, product: &Product) -> DbResult<()> {
        let mut state = self.state.write().await;
        if state.products.contains_key(&product.id) {
            return Err(DbError::duplicate("id", &product.id));
        }
        state.products.insert(product.id.clone(), product.clone());
        Ok(())
    }

    async fn update_product(&self, product: &Product) -> DbResult<()> {
        let mut state = self.state.write().await;
        let existing = state.active_product_mut(&product.owner_id, &product.id)?;
        let created_at = existing.created_at;
        *existing = Product {
            created_at,
            is_active: true,
            ..product.clone()
        };
        Ok(())
    }

    async fn delete_product(&self, owner_id: &str, id: &str) -> DbResult<()> {
        let mut state = self.state.write().await;
        let product = state.active_product_mut(owner_id, id)?;
        product.is_active = false;
        product.updated_at = Utc::now();
        Ok(())
    }

    async fn set_product_quantity(&self, owner_id: &str, id: &str, quantity: f64) -> DbResult<Product> {
        let mut state = self.state.write().await;
        let product = state.active_product_mut(owner_id, id)?;
        product.quantity = quantity;
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn adjust_product_quantity(&self, owner_id: &str, id: &str, delta: f64) -> DbResult<Product> {
        let mut state = self.state.write().await;
        let product = state.active_product_mut(owner_id, id)?;
        product.quantity += delta;
        product.updated_at = Utc::now();
        Ok(product.clone())
    }
}

// =============================================================================
// Recipes
// =============================================================================

#[async_trait]
impl RecipeStore for MemoryStore {
    async fn list_recipes(&self, owner_id: &str) -> DbResult<Vec<Recipe>> {
        let state = self.state.read().await;
        let mut recipes: Vec<Recipe> = state
            .recipes
            .values()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        recipes.sort_by_key(|r| (r.name.to_lowercase(), r.id.clone()));
        Ok(recipes)
    }

    async fn get_recipe(&self, owner_id: &str, id: &str) -> DbResult<Option<Recipe>> {
        let state = self.state.read().await;
        Ok(state.recipes.get(id).filter(|r| r.owner_id == owner_id).cloned())
    }

    async fn insert_recipe(&self, recipe: &Recipe) -> DbResult<()> {
        let mut state = self.state.write().await;
        if state.recipes.contains_key(&recipe.id) {
            return Err(DbError::duplicate("id", &recipe.id));
        }
        if let Some(missing) = recipe
            .ingredients
            .iter()
            .find(|ing| !state.products.contains_key(&ing.product_id))
        {
            return Err(DbError::ForeignKeyViolation {
                message: format!("unknown product {}", missing.product_id),
            });
        }
        state.recipes.insert(recipe.id.clone(), recipe.clone());
        Ok(())
    }

    async fn update_recipe(&self, recipe: &Recipe) -> DbResult<()> {
        let mut state = self.state.write().await;
        if let Some(missing) = recipe
            .ingredients
            .iter()
            .find(|ing| !state.products.contains_key(&ing.product_id))
        {
            return Err(DbError::ForeignKeyViolation {
                message: format!("unknown product {}", missing.product_id),
            });
        }
        let existing = state
            .recipes
            .get_mut(&recipe.id)
            .filter(|r| r.owner_id == recipe.owner_id)
            .ok_or_else(|| DbError::not_found("Recipe", &recipe.id))?;
        let created_at = existing.created_at;
        *existing = Recipe {
            created_at,
            ..recipe.clone()
        };
        Ok(())
    }

    async fn delete_recipe(&self, owner_id: &str, id: &str) -> DbResult<()> {
        let mut state = self.state.write().await;
        match state.recipes.get(id) {
            Some(r) if r.owner_id == owner_id => {
                state.recipes.remove(id);
                Ok(())
            }
            _ => Err(DbError::not_found("Recipe", id)),
        }
    }
}

// =============================================================================
// Sales
// =============================================================================

#[async_trait]
impl SaleStore for MemoryStore {
    async fn record_sale(
        &self,
        mut sale: Sale,
        items: Vec<SaleItem>,
        stock: &[StockDelta],
        allow_negative_stock: bool,
    ) -> DbResult<SaleWithItems> {
        let mut state = self.state.write().await;

        // validate everything before the first mutation
        if let Some(tab_id) = &sale.tab_id {
            state.open_tab_mut(&sale.owner_id, tab_id)?;
        }
        let stock = merge_deltas(stock);
        for d in &stock {
            let product = state
                .products
                .get(&d.product_id)
                .filter(|p| p.owner_id == sale.owner_id)
                .ok_or_else(|| DbError::not_found("Product", &d.product_id))?;
            if !allow_negative_stock && would_oversell(product.quantity, d.delta) {
                return Err(DbError::InsufficientStock {
                    product_id: product.id.clone(),
                    name: product.name.clone(),
                    available: product.quantity,
                    required: -d.delta,
                });
            }
        }

        let count = state.sales.values().filter(|s| s.sale.owner_id == sale.owner_id).count() as i64;
        sale.receipt_number = receipt_number(count + 1);
        sale.status = SaleStatus::Completed;

        let now = sale.created_at;
        for d in &stock {
            if let Some(p) = state.products.get_mut(&d.product_id) {
                p.quantity += d.delta;
                p.updated_at = now;
            }
        }
        if let Some(tab_id) = sale.tab_id.clone() {
            let tab = state.owned_tab_mut(&sale.owner_id, &tab_id)?;
            tab.status = TabStatus::Closed;
            tab.sale_id = Some(sale.id.clone());
            tab.closed_at = Some(now);
        }

        let recorded = SaleWithItems { sale, items };
        state.movements.insert(recorded.sale.id.clone(), stock);
        state.sales.insert(recorded.sale.id.clone(), recorded.clone());
        Ok(recorded)
    }

    async fn get_sale(&self, owner_id: &str, id: &str) -> DbResult<Option<SaleWithItems>> {
        let state = self.state.read().await;
        Ok(state.sales.get(id).filter(|s| s.sale.owner_id == owner_id).cloned())
    }

    async fn list_sales(&self, owner_id: &str, range: DateRange) -> DbResult<Vec<Sale>> {
        let state = self.state.read().await;
        let mut sales: Vec<Sale> = state
            .sales
            .values()
            .filter(|s| s.sale.owner_id == owner_id && range.contains(s.sale.created_at))
            .map(|s| s.sale.clone())
            .collect();
        sales.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.receipt_number.cmp(&a.receipt_number)));
        Ok(sales)
    }

    async fn void_sale(&self, owner_id: &str, id: &str) -> DbResult<Sale> {
        let mut state = self.state.write().await;
        let status = state
            .sales
            .get(id)
            .filter(|s| s.sale.owner_id == owner_id)
            .map(|s| s.sale.status)
            .ok_or_else(|| DbError::not_found("Sale", id))?;
        if status == SaleStatus::Voided {
            return Err(DbError::invalid_state("Sale", id, status.as_str()));
        }

        let now = Utc::now();
        let movements = state.movements.get(id).cloned().unwrap_or_default();
        for m in &movements {
            if let Some(p) = state.products.get_mut(&m.product_id) {
                p.quantity -= m.delta;
                p.updated_at = now;
            }
        }

        let sale = state
            .sales
            .get_mut(id)
            .map(|s| &mut s.sale)
            .ok_or_else(|| DbError::not_found("Sale", id))?;
        sale.status = SaleStatus::Voided;
        sale.voided_at = Some(now);
        Ok(sale.clone())
    }

    async fn sale_records(&self, owner_id: &str, range: DateRange) -> DbResult<Vec<SaleRecord>> {
        let state = self.state.read().await;
        let mut records: Vec<SaleRecord> = state
            .sales
            .values()
            .filter(|s| {
                s.sale.owner_id == owner_id
                    && s.sale.status == SaleStatus::Completed
                    && range.contains(s.sale.created_at)
            })
            .flat_map(|s| {
                s.items.iter().map(move |i| SaleRecord {
                    sale_id: s.sale.id.clone(),
                    receipt_number: s.sale.receipt_number.clone(),
                    kind: i.kind,
                    item_id: i.item_id.clone(),
                    name: i.name_snapshot.clone(),
                    category: i.category.clone(),
                    quantity: i.quantity,
                    unit_price_cents: i.unit_price_cents,
                    unit_cost_cents: i.unit_cost_cents,
                    line_total_cents: i.line_total_cents,
                    sold_at: s.sale.created_at,
                })
            })
            .collect();
        records.sort_by(|a, b| a.sold_at.cmp(&b.sold_at).then_with(|| a.receipt_number.cmp(&b.receipt_number)));
        Ok(records)
    }
}

// =============================================================================
// Tabs
// =============================================================================

#[async_trait]
impl TabStore for MemoryStore {
    async fn open_tab(&self, tab: &Tab) -> DbResult<()> {
        let mut state = self.state.write().await;
        if state.tabs.contains_key(&tab.id) {
            return Err(DbError::duplicate("id", &tab.id));
        }
        state.tabs.insert(tab.id.clone(), tab.clone());
        Ok(())
    }

    async fn list_tabs(&self, owner_id: &str, status: Option<TabStatus>) -> DbResult<Vec<Tab>> {
        let state = self.state.read().await;
        let mut tabs: Vec<Tab> = state
            .tabs
            .values()
            .filter(|t| t.owner_id == owner_id && status.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        tabs.sort_by(|a, b| b.opened_at.cmp(&a.opened_at).then_with(|| a.id.cmp(&b.id)));
        Ok(tabs)
    }

    async fn get_tab(&self, owner_id: &str, id: &str) -> DbResult<Option<Tab>> {
        let state = self.state.read().await;
        Ok(state.tabs.get(id).filter(|t| t.owner_id == owner_id).cloned())
    }

    async fn add_tab_item(&self, owner_id: &str, item: TabItem) -> DbResult<Tab> {
        let mut state = self.state.write().await;
        let tab = state.open_tab_mut(owner_id, &item.tab_id)?;
        match tab.items.iter_mut().find(|i| {
            i.kind == item.kind && i.item_id == item.item_id && i.unit_price_cents == item.unit_price_cents
        }) {
            Some(existing) => existing.quantity += item.quantity,
            None => tab.items.push(item),
        }
        Ok(tab.clone())
    }

    async fn remove_tab_item(&self, owner_id: &str, tab_id: &str, item_id: &str) -> DbResult<Tab> {
        let mut state = self.state.write().await;
        let tab = state.open_tab_mut(owner_id, tab_id)?;
        let before = tab.items.len();
        tab.items.retain(|i| i.id != item_id);
        if tab.items.len() == before {
            return Err(DbError::not_found("Tab item", item_id));
        }
        Ok(tab.clone())
    }

    async fn cancel_tab(&self, owner_id: &str, id: &str) -> DbResult<Tab> {
        let mut state = self.state.write().await;
        let tab = state.open_tab_mut(owner_id, id)?;
        tab.status = TabStatus::Cancelled;
        tab.closed_at = Some(Utc::now());
        Ok(tab.clone())
    }
}

// =============================================================================
// Accounts
// =============================================================================

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: &User) -> DbResult<()> {
        let mut state = self.state.write().await;
        let taken = state
            .users
            .values()
            .any(|u| u.username.eq_ignore_ascii_case(&user.username));
        if taken {
            return Err(DbError::duplicate("username", &user.username));
        }
        state.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn find_user_by_username(&self, username: &str) -> DbResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned())
    }

    async fn get_user(&self, id: &str) -> DbResult<Option<User>> {
        Ok(self.state.read().await.users.get(id).cloned())
    }

    async fn set_totp(&self, user_id: &str, secret: Option<&str>, enabled: bool) -> DbResult<()> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(user_id)
            .ok_or_else(|| DbError::not_found("User", user_id))?;
        user.totp_secret = secret.map(str::to_string);
        user.totp_enabled = enabled;
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get_settings(&self, owner_id: &str) -> DbResult<BTreeMap<String, String>> {
        let state = self.state.read().await;
        Ok(state.settings.get(owner_id).cloned().unwrap_or_default())
    }

    async fn put_settings(&self, owner_id: &str, pairs: &BTreeMap<String, String>) -> DbResult<()> {
        let mut state = self.state.write().await;
        let entry = state.settings.entry(owner_id.to_string()).or_default();
        for (k, v) in pairs {
            entry.insert(k.clone(), v.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl StripeKeyStore for MemoryStore {
    async fn get_stripe_account(&self, owner_id: &str) -> DbResult<Option<StripeAccount>> {
        Ok(self.state.read().await.stripe.get(owner_id).cloned())
    }

    async fn put_stripe_account(&self, account: &StripeAccount) -> DbResult<()> {
        let mut state = self.state.write().await;
        state.stripe.insert(account.owner_id.clone(), account.clone());
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn health_check(&self) -> bool {
        true
    }
}
