//! Tab queries. Closing happens in [`SaleStore::record_sale`](crate::SaleStore::record_sale).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Sqlite, Transaction};
use tracing::{debug, instrument};

use barback_core::{Tab, TabItem, TabStatus};

use super::SqliteStore;
use crate::error::{DbError, DbResult};
use crate::store::TabStore;

const TAB_COLUMNS: &str = "id, owner_id, customer_name, status, sale_id, opened_at, closed_at";

const TAB_ITEM_COLUMNS: &str = "id, tab_id, kind, item_id, name, category, unit_price_cents, quantity, added_at";

/// Fails unless the tab exists, belongs to `owner_id` and is open.
async fn ensure_open(tx: &mut Transaction<'_, Sqlite>, owner_id: &str, tab_id: &str) -> DbResult<()> {
    let status: Option<TabStatus> = sqlx::query_scalar("SELECT status FROM tabs WHERE id = ?1 AND owner_id = ?2")
        .bind(tab_id)
        .bind(owner_id)
        .fetch_optional(&mut **tx)
        .await?;
    match status {
        None => Err(DbError::not_found("Tab", tab_id)),
        Some(TabStatus::Open) => Ok(()),
        Some(other) => Err(DbError::invalid_state("Tab", tab_id, other.as_str())),
    }
}

impl SqliteStore {
    async fn fetch_tab(&self, owner_id: &str, id: &str) -> DbResult<Option<Tab>> {
        let sql = format!("SELECT {TAB_COLUMNS} FROM tabs WHERE id = ?1 AND owner_id = ?2");
        let Some(mut tab) = sqlx::query_as::<_, Tab>(&sql)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let sql = format!("SELECT {TAB_ITEM_COLUMNS} FROM tab_items WHERE tab_id = ?1 ORDER BY added_at, rowid");
        tab.items = sqlx::query_as::<_, TabItem>(&sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        Ok(Some(tab))
    }

    async fn fetch_tab_or_missing(&self, owner_id: &str, id: &str) -> DbResult<Tab> {
        self.fetch_tab(owner_id, id)
            .await?
            .ok_or_else(|| DbError::not_found("Tab", id))
    }
}

#[async_trait]
impl TabStore for SqliteStore {
    #[instrument(skip(self, tab), fields(id = %tab.id))]
    async fn open_tab(&self, tab: &Tab) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO tabs (id, owner_id, customer_name, status, sale_id, opened_at, closed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&tab.id)
        .bind(&tab.owner_id)
        .bind(&tab.customer_name)
        .bind(tab.status)
        .bind(&tab.sale_id)
        .bind(tab.opened_at)
        .bind(tab.closed_at)
        .execute(&self.pool)
        .await?;

        debug!(customer = %tab.customer_name, "Tab opened");
        Ok(())
    }

    async fn list_tabs(&self, owner_id: &str, status: Option<TabStatus>) -> DbResult<Vec<Tab>> {
        let sql = format!(
            "SELECT {TAB_COLUMNS} FROM tabs \
             WHERE owner_id = ?1 AND (?2 IS NULL OR status = ?2) \
             ORDER BY opened_at DESC, id"
        );
        let mut tabs = sqlx::query_as::<_, Tab>(&sql)
            .bind(owner_id)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;
        if tabs.is_empty() {
            return Ok(tabs);
        }

        let rows = sqlx::query_as::<_, TabItem>(
            "SELECT i.id, i.tab_id, i.kind, i.item_id, i.name, i.category, \
                    i.unit_price_cents, i.quantity, i.added_at \
             FROM tab_items i JOIN tabs t ON t.id = i.tab_id \
             WHERE t.owner_id = ?1 \
             ORDER BY i.added_at, i.rowid",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        let mut by_tab: HashMap<String, Vec<TabItem>> = HashMap::new();
        for row in rows {
            by_tab.entry(row.tab_id.clone()).or_default().push(row);
        }
        for tab in &mut tabs {
            tab.items = by_tab.remove(&tab.id).unwrap_or_default();
        }
        Ok(tabs)
    }

    async fn get_tab(&self, owner_id: &str, id: &str) -> DbResult<Option<Tab>> {
        self.fetch_tab(owner_id, id).await
    }

    #[instrument(skip(self, item), fields(tab_id = %item.tab_id))]
    async fn add_tab_item(&self, owner_id: &str, item: TabItem) -> DbResult<Tab> {
        let mut tx = self.begin_write().await?;
        ensure_open(&mut tx, owner_id, &item.tab_id).await?;

        let merged = sqlx::query(
            "UPDATE tab_items SET quantity = quantity + ?1 \
             WHERE tab_id = ?2 AND kind = ?3 AND item_id = ?4 AND unit_price_cents = ?5",
        )
        .bind(item.quantity)
        .bind(&item.tab_id)
        .bind(item.kind)
        .bind(&item.item_id)
        .bind(item.unit_price_cents)
        .execute(&mut *tx)
        .await?;

        if merged.rows_affected() == 0 {
            sqlx::query(
                r#"
                INSERT INTO tab_items (
                    id, tab_id, kind, item_id, name, category,
                    unit_price_cents, quantity, added_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(&item.id)
            .bind(&item.tab_id)
            .bind(item.kind)
            .bind(&item.item_id)
            .bind(&item.name)
            .bind(&item.category)
            .bind(item.unit_price_cents)
            .bind(item.quantity)
            .bind(item.added_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        self.fetch_tab_or_missing(owner_id, &item.tab_id).await
    }

    #[instrument(skip(self))]
    async fn remove_tab_item(&self, owner_id: &str, tab_id: &str, item_id: &str) -> DbResult<Tab> {
        let mut tx = self.begin_write().await?;
        ensure_open(&mut tx, owner_id, tab_id).await?;

        let result = sqlx::query("DELETE FROM tab_items WHERE id = ?1 AND tab_id = ?2")
            .bind(item_id)
            .bind(tab_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Tab item", item_id));
        }

        tx.commit().await?;
        self.fetch_tab_or_missing(owner_id, tab_id).await
    }

    #[instrument(skip(self))]
    async fn cancel_tab(&self, owner_id: &str, id: &str) -> DbResult<Tab> {
        let mut tx = self.begin_write().await?;
        ensure_open(&mut tx, owner_id, id).await?;

        sqlx::query("UPDATE tabs SET status = 'cancelled', closed_at = ?1 WHERE id = ?2")
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        self.fetch_tab_or_missing(owner_id, id).await
    }
}
