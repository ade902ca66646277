//! Recipe queries. Ingredient lines are always written in the same
//! transaction as their recipe.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Sqlite, Transaction};
use tracing::instrument;

use barback_core::{Recipe, RecipeIngredient};

use super::SqliteStore;
use crate::error::{DbError, DbResult};
use crate::store::RecipeStore;

const RECIPE_COLUMNS: &str = "id, owner_id, name, category, price_cents, description, created_at, updated_at";

async fn insert_ingredients(
    tx: &mut Transaction<'_, Sqlite>,
    recipe_id: &str,
    ingredients: &[RecipeIngredient],
) -> DbResult<()> {
    for ing in ingredients {
        sqlx::query("INSERT INTO recipe_ingredients (recipe_id, product_id, quantity) VALUES (?1, ?2, ?3)")
            .bind(recipe_id)
            .bind(&ing.product_id)
            .bind(ing.quantity)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

impl SqliteStore {
    /// Fills `ingredients` on each recipe with one query.
    async fn attach_ingredients(&self, mut recipes: Vec<Recipe>) -> DbResult<Vec<Recipe>> {
        if recipes.is_empty() {
            return Ok(recipes);
        }
        let owner_id = recipes[0].owner_id.clone();
        let rows = sqlx::query_as::<_, RecipeIngredient>(
            "SELECT i.recipe_id, i.product_id, i.quantity \
             FROM recipe_ingredients i JOIN recipes r ON r.id = i.recipe_id \
             WHERE r.owner_id = ?1 \
             ORDER BY i.rowid",
        )
        .bind(&owner_id)
        .fetch_all(&self.pool)
        .await?;

        let mut by_recipe: HashMap<String, Vec<RecipeIngredient>> = HashMap::new();
        for row in rows {
            by_recipe.entry(row.recipe_id.clone()).or_default().push(row);
        }
        for recipe in &mut recipes {
            recipe.ingredients = by_recipe.remove(&recipe.id).unwrap_or_default();
        }
        Ok(recipes)
    }
}

#[async_trait]
impl RecipeStore for SqliteStore {
    async fn list_recipes(&self, owner_id: &str) -> DbResult<Vec<Recipe>> {
        let sql = format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE owner_id = ?1 ORDER BY name COLLATE NOCASE, id");
        let recipes = sqlx::query_as::<_, Recipe>(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
        self.attach_ingredients(recipes).await
    }

    async fn get_recipe(&self, owner_id: &str, id: &str) -> DbResult<Option<Recipe>> {
        let sql = format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = ?1 AND owner_id = ?2");
        let Some(mut recipe) = sqlx::query_as::<_, Recipe>(&sql)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        recipe.ingredients = sqlx::query_as::<_, RecipeIngredient>(
            "SELECT recipe_id, product_id, quantity FROM recipe_ingredients WHERE recipe_id = ?1 ORDER BY rowid",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(Some(recipe))
    }

    #[instrument(skip(self, recipe), fields(id = %recipe.id))]
    async fn insert_recipe(&self, recipe: &Recipe) -> DbResult<()> {
        let mut tx = self.begin_write().await?;

        sqlx::query(
            r#"
            INSERT INTO recipes (id, owner_id, name, category, price_cents, description, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&recipe.id)
        .bind(&recipe.owner_id)
        .bind(&recipe.name)
        .bind(&recipe.category)
        .bind(recipe.price_cents)
        .bind(&recipe.description)
        .bind(recipe.created_at)
        .bind(recipe.updated_at)
        .execute(&mut *tx)
        .await?;

        insert_ingredients(&mut tx, &recipe.id, &recipe.ingredients).await?;
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, recipe), fields(id = %recipe.id))]
    async fn update_recipe(&self, recipe: &Recipe) -> DbResult<()> {
        let mut tx = self.begin_write().await?;

        let result = sqlx::query(
            r#"
            UPDATE recipes SET
                name = ?3,
                category = ?4,
                price_cents = ?5,
                description = ?6,
                updated_at = ?7
            WHERE id = ?1 AND owner_id = ?2
            "#,
        )
        .bind(&recipe.id)
        .bind(&recipe.owner_id)
        .bind(&recipe.name)
        .bind(&recipe.category)
        .bind(recipe.price_cents)
        .bind(&recipe.description)
        .bind(recipe.updated_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Recipe", &recipe.id));
        }

        sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = ?1")
            .bind(&recipe.id)
            .execute(&mut *tx)
            .await?;
        insert_ingredients(&mut tx, &recipe.id, &recipe.ingredients).await?;

        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_recipe(&self, owner_id: &str, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM recipes WHERE id = ?1 AND owner_id = ?2")
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Recipe", id));
        }
        Ok(())
    }
}
