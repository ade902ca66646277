//! Product queries.

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, instrument};

use barback_core::Product;

use super::SqliteStore;
use crate::error::{DbError, DbResult};
use crate::store::ProductStore;

pub(super) const PRODUCT_COLUMNS: &str = "id, owner_id, name, category, price_cents, cost_cents, quantity, unit, \
     par_level, sku, is_active, created_at, updated_at";

impl SqliteStore {
    async fn fetch_active_product(&self, owner_id: &str, id: &str) -> DbResult<Option<Product>> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1 AND owner_id = ?2 AND is_active = 1"
        );
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }
}

#[async_trait]
impl ProductStore for SqliteStore {
    async fn list_products(&self, owner_id: &str) -> DbResult<Vec<Product>> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE owner_id = ?1 AND is_active = 1 \
             ORDER BY name COLLATE NOCASE, id"
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(products)
    }

    async fn get_product(&self, owner_id: &str, id: &str) -> DbResult<Option<Product>> {
        self.fetch_active_product(owner_id, id).await
    }

    async fn find_product_by_name(&self, owner_id: &str, name: &str) -> DbResult<Option<Product>> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE owner_id = ?1 AND is_active = 1 AND lower(name) = lower(?2) \
             ORDER BY created_at, id LIMIT 1"
        );
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(owner_id)
            .bind(name.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    #[instrument(skip(self, product), fields(id = %product.id))]
    async fn insert_product(&self, product: &Product) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO products (
                id, owner_id, name, category,
                price_cents, cost_cents, quantity, unit,
                par_level, sku, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&product.id)
        .bind(&product.owner_id)
        .bind(&product.name)
        .bind(&product.category)
        .bind(product.price_cents)
        .bind(product.cost_cents)
        .bind(product.quantity)
        .bind(&product.unit)
        .bind(product.par_level)
        .bind(&product.sku)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        debug!("Product inserted");
        Ok(())
    }

    #[instrument(skip(self, product), fields(id = %product.id))]
    async fn update_product(&self, product: &Product) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE products SET
                name = ?3,
                category = ?4,
                price_cents = ?5,
                cost_cents = ?6,
                quantity = ?7,
                unit = ?8,
                par_level = ?9,
                sku = ?10,
                updated_at = ?11
            WHERE id = ?1 AND owner_id = ?2 AND is_active = 1
            "#,
        )
        .bind(&product.id)
        .bind(&product.owner_id)
        .bind(&product.name)
        .bind(&product.category)
        .bind(product.price_cents)
        .bind(product.cost_cents)
        .bind(product.quantity)
        .bind(&product.unit)
        .bind(product.par_level)
        .bind(&product.sku)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", &product.id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_product(&self, owner_id: &str, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE products SET is_active = 0, updated_at = ?3 \
             WHERE id = ?1 AND owner_id = ?2 AND is_active = 1",
        )
        .bind(id)
        .bind(owner_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
        debug!("Product soft-deleted");
        Ok(())
    }

    async fn set_product_quantity(&self, owner_id: &str, id: &str, quantity: f64) -> DbResult<Product> {
        let result = sqlx::query(
            "UPDATE products SET quantity = ?3, updated_at = ?4 \
             WHERE id = ?1 AND owner_id = ?2 AND is_active = 1",
        )
        .bind(id)
        .bind(owner_id)
        .bind(quantity)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
        self.fetch_active_product(owner_id, id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    async fn adjust_product_quantity(&self, owner_id: &str, id: &str, delta: f64) -> DbResult<Product> {
        let result = sqlx::query(
            "UPDATE products SET quantity = quantity + ?3, updated_at = ?4 \
             WHERE id = ?1 AND owner_id = ?2 AND is_active = 1",
        )
        .bind(id)
        .bind(owner_id)
        .bind(delta)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
        self.fetch_active_product(owner_id, id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }
}
