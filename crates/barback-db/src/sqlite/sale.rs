//! # Sale Queries
//!
//! ## Checkout Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │   ├── tab open?            (when the sale settles a tab)                │
//! │   ├── for each product:    stock check, quantity += delta               │
//! │   ├── receipt number       COUNT(owner's sales) + 1                     │
//! │   ├── INSERT sales, sale_items, stock_movements                         │
//! │   └── UPDATE tabs          status = closed, sale_id                     │
//! │  COMMIT                    (any error rolls everything back)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `stock_movements` records exactly what was taken so a void can put it
//! back even after the recipe has been edited.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use barback_core::tax::{TaxComponent, TaxRegion};
use barback_core::{PaymentMethod, Sale, SaleItem, SaleRecord, SaleStatus, SaleWithItems, TabStatus};

use super::SqliteStore;
use crate::error::{DbError, DbResult};
use crate::store::{merge_deltas, receipt_number, would_oversell, DateRange, SaleStore, StockDelta};

const SALE_COLUMNS: &str = "id, owner_id, receipt_number, status, subtotal_cents, tax_cents, total_cents, \
     tax_region, tax_breakdown, payment_method, tendered_cents, change_cents, payment_intent_id, tab_id, \
     created_at, voided_at";

const SALE_ITEM_COLUMNS: &str =
    "id, sale_id, kind, item_id, name_snapshot, category, unit_price_cents, unit_cost_cents, quantity, line_total_cents";

/// `sales` row with the tax breakdown still as JSON text.
#[derive(Debug, sqlx::FromRow)]
struct SaleRow {
    id: String,
    owner_id: String,
    receipt_number: String,
    status: SaleStatus,
    subtotal_cents: i64,
    tax_cents: i64,
    total_cents: i64,
    tax_region: TaxRegion,
    tax_breakdown: String,
    payment_method: PaymentMethod,
    tendered_cents: Option<i64>,
    change_cents: Option<i64>,
    payment_intent_id: Option<String>,
    tab_id: Option<String>,
    created_at: DateTime<Utc>,
    voided_at: Option<DateTime<Utc>>,
}

impl TryFrom<SaleRow> for Sale {
    type Error = DbError;

    fn try_from(row: SaleRow) -> DbResult<Sale> {
        let tax_breakdown: Vec<TaxComponent> = serde_json::from_str(&row.tax_breakdown)?;
        Ok(Sale {
            id: row.id,
            owner_id: row.owner_id,
            receipt_number: row.receipt_number,
            status: row.status,
            subtotal_cents: row.subtotal_cents,
            tax_cents: row.tax_cents,
            total_cents: row.total_cents,
            tax_region: row.tax_region,
            tax_breakdown,
            payment_method: row.payment_method,
            tendered_cents: row.tendered_cents,
            change_cents: row.change_cents,
            payment_intent_id: row.payment_intent_id,
            tab_id: row.tab_id,
            created_at: row.created_at,
            voided_at: row.voided_at,
        })
    }
}

impl SqliteStore {
    async fn fetch_sale(&self, owner_id: &str, id: &str) -> DbResult<Option<Sale>> {
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1 AND owner_id = ?2");
        sqlx::query_as::<_, SaleRow>(&sql)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Sale::try_from)
            .transpose()
    }
}

#[async_trait]
impl SaleStore for SqliteStore {
    #[instrument(skip_all, fields(sale_id = %sale.id, owner_id = %sale.owner_id))]
    async fn record_sale(
        &self,
        mut sale: Sale,
        items: Vec<SaleItem>,
        stock: &[StockDelta],
        allow_negative_stock: bool,
    ) -> DbResult<SaleWithItems> {
        let mut tx = self.begin_write().await?;

        if let Some(tab_id) = &sale.tab_id {
            let status: Option<TabStatus> = sqlx::query_scalar("SELECT status FROM tabs WHERE id = ?1 AND owner_id = ?2")
                .bind(tab_id)
                .bind(&sale.owner_id)
                .fetch_optional(&mut *tx)
                .await?;
            match status {
                None => return Err(DbError::not_found("Tab", tab_id)),
                Some(TabStatus::Open) => {}
                Some(other) => return Err(DbError::invalid_state("Tab", tab_id, other.as_str())),
            }
        }

        let stock = merge_deltas(stock);
        for d in &stock {
            let row: Option<(String, f64)> =
                sqlx::query_as("SELECT name, quantity FROM products WHERE id = ?1 AND owner_id = ?2")
                    .bind(&d.product_id)
                    .bind(&sale.owner_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            let (name, available) = row.ok_or_else(|| DbError::not_found("Product", &d.product_id))?;
            if !allow_negative_stock && would_oversell(available, d.delta) {
                return Err(DbError::InsufficientStock {
                    product_id: d.product_id.clone(),
                    name,
                    available,
                    required: -d.delta,
                });
            }
            sqlx::query("UPDATE products SET quantity = quantity + ?1, updated_at = ?2 WHERE id = ?3")
                .bind(d.delta)
                .bind(sale.created_at)
                .bind(&d.product_id)
                .execute(&mut *tx)
                .await?;
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales WHERE owner_id = ?1")
            .bind(&sale.owner_id)
            .fetch_one(&mut *tx)
            .await?;
        sale.receipt_number = receipt_number(count + 1);
        sale.status = SaleStatus::Completed;

        let breakdown = serde_json::to_string(&sale.tax_breakdown)?;
        sqlx::query(
            r#"
            INSERT INTO sales (
                id, owner_id, receipt_number, status,
                subtotal_cents, tax_cents, total_cents,
                tax_region, tax_breakdown, payment_method,
                tendered_cents, change_cents, payment_intent_id, tab_id,
                created_at, voided_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.owner_id)
        .bind(&sale.receipt_number)
        .bind(sale.status)
        .bind(sale.subtotal_cents)
        .bind(sale.tax_cents)
        .bind(sale.total_cents)
        .bind(sale.tax_region)
        .bind(breakdown)
        .bind(sale.payment_method)
        .bind(sale.tendered_cents)
        .bind(sale.change_cents)
        .bind(&sale.payment_intent_id)
        .bind(&sale.tab_id)
        .bind(sale.created_at)
        .bind(sale.voided_at)
        .execute(&mut *tx)
        .await?;

        for item in &items {
            sqlx::query(
                r#"
                INSERT INTO sale_items (
                    id, sale_id, kind, item_id, name_snapshot, category,
                    unit_price_cents, unit_cost_cents, quantity, line_total_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
            )
            .bind(&item.id)
            .bind(&sale.id)
            .bind(item.kind)
            .bind(&item.item_id)
            .bind(&item.name_snapshot)
            .bind(&item.category)
            .bind(item.unit_price_cents)
            .bind(item.unit_cost_cents)
            .bind(item.quantity)
            .bind(item.line_total_cents)
            .execute(&mut *tx)
            .await?;
        }

        for d in &stock {
            sqlx::query("INSERT INTO stock_movements (sale_id, product_id, delta) VALUES (?1, ?2, ?3)")
                .bind(&sale.id)
                .bind(&d.product_id)
                .bind(d.delta)
                .execute(&mut *tx)
                .await?;
        }

        if let Some(tab_id) = &sale.tab_id {
            sqlx::query("UPDATE tabs SET status = 'closed', sale_id = ?1, closed_at = ?2 WHERE id = ?3")
                .bind(&sale.id)
                .bind(sale.created_at)
                .bind(tab_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        info!(
            receipt_number = %sale.receipt_number,
            total_cents = sale.total_cents,
            lines = items.len(),
            "Sale recorded"
        );
        Ok(SaleWithItems { sale, items })
    }

    async fn get_sale(&self, owner_id: &str, id: &str) -> DbResult<Option<SaleWithItems>> {
        let Some(sale) = self.fetch_sale(owner_id, id).await? else {
            return Ok(None);
        };
        let sql = format!("SELECT {SALE_ITEM_COLUMNS} FROM sale_items WHERE sale_id = ?1 ORDER BY rowid");
        let items = sqlx::query_as::<_, SaleItem>(&sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        Ok(Some(SaleWithItems { sale, items }))
    }

    async fn list_sales(&self, owner_id: &str, range: DateRange) -> DbResult<Vec<Sale>> {
        let sql = format!(
            "SELECT {SALE_COLUMNS} FROM sales \
             WHERE owner_id = ?1 \
               AND (?2 IS NULL OR created_at >= ?2) \
               AND (?3 IS NULL OR created_at <= ?3) \
             ORDER BY created_at DESC, receipt_number DESC"
        );
        let rows = sqlx::query_as::<_, SaleRow>(&sql)
            .bind(owner_id)
            .bind(range.from)
            .bind(range.to)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Sale::try_from).collect()
    }

    #[instrument(skip(self))]
    async fn void_sale(&self, owner_id: &str, id: &str) -> DbResult<Sale> {
        let mut tx = self.begin_write().await?;

        let status: Option<SaleStatus> = sqlx::query_scalar("SELECT status FROM sales WHERE id = ?1 AND owner_id = ?2")
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&mut *tx)
            .await?;
        match status {
            None => return Err(DbError::not_found("Sale", id)),
            Some(SaleStatus::Voided) => return Err(DbError::invalid_state("Sale", id, "voided")),
            Some(SaleStatus::Completed) => {}
        }

        let now = Utc::now();
        let movements: Vec<(String, f64)> =
            sqlx::query_as("SELECT product_id, delta FROM stock_movements WHERE sale_id = ?1 ORDER BY id")
                .bind(id)
                .fetch_all(&mut *tx)
                .await?;
        for (product_id, delta) in &movements {
            sqlx::query("UPDATE products SET quantity = quantity - ?1, updated_at = ?2 WHERE id = ?3")
                .bind(delta)
                .bind(now)
                .bind(product_id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("UPDATE sales SET status = 'voided', voided_at = ?1 WHERE id = ?2")
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(restocked = movements.len(), "Sale voided");

        self.fetch_sale(owner_id, id)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", id))
    }

    async fn sale_records(&self, owner_id: &str, range: DateRange) -> DbResult<Vec<SaleRecord>> {
        let records = sqlx::query_as::<_, SaleRecord>(
            r#"
            SELECT
                s.id AS sale_id,
                s.receipt_number,
                i.kind,
                i.item_id,
                i.name_snapshot AS name,
                i.category,
                i.quantity,
                i.unit_price_cents,
                i.unit_cost_cents,
                i.line_total_cents,
                s.created_at AS sold_at
            FROM sale_items i
            JOIN sales s ON s.id = i.sale_id
            WHERE s.owner_id = ?1
              AND s.status = 'completed'
              AND (?2 IS NULL OR s.created_at >= ?2)
              AND (?3 IS NULL OR s.created_at <= ?3)
            ORDER BY s.created_at, s.receipt_number, i.rowid
            "#,
        )
        .bind(owner_id)
        .bind(range.from)
        .bind(range.to)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}
