//! # Recipe Routes
//!
//! Cocktails and other composite items. Every ingredient must be an active
//! product of the same owner.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use barback_core::validation::{validate_category, validate_non_negative, validate_price_cents, validate_product_name};
use barback_core::{Recipe, RecipeIngredient, ValidationError};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::routes::AppJson;
use crate::AppState;

/// A recipe may not list more ingredients than this.
const MAX_INGREDIENTS: usize = 50;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/recipes", get(list_recipes).post(create_recipe))
        .route("/recipes/{id}", get(get_recipe).put(update_recipe).delete(delete_recipe))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngredientInput {
    pub product_id: String,
    pub quantity: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeInput {
    pub name: String,
    #[serde(default)]
    pub category: String,
    pub price_cents: i64,
    pub description: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<IngredientInput>,
}

impl RecipeInput {
    /// Validates fields and checks every ingredient belongs to `owner_id`.
    async fn into_recipe(self, state: &AppState, owner_id: &str, mut recipe: Recipe) -> ApiResult<Recipe> {
        recipe.name = validate_product_name(&self.name)?;
        recipe.category = validate_category(&self.category)?;
        validate_price_cents("priceCents", self.price_cents)?;
        recipe.price_cents = self.price_cents;
        recipe.description = self.description.map(|d| d.trim().to_string()).filter(|d| !d.is_empty());

        if self.ingredients.len() > MAX_INGREDIENTS {
            return Err(ValidationError::OutOfRange {
                field: "ingredients".to_string(),
                min: 0,
                max: MAX_INGREDIENTS as i64,
            }
            .into());
        }

        let mut seen = HashSet::new();
        let mut ingredients = Vec::with_capacity(self.ingredients.len());
        for ing in self.ingredients {
            validate_non_negative("ingredients.quantity", ing.quantity)?;
            if ing.quantity == 0.0 {
                return Err(ValidationError::MustBePositive {
                    field: "ingredients.quantity".to_string(),
                }
                .into());
            }
            if !seen.insert(ing.product_id.clone()) {
                return Err(ApiError::validation(format!(
                    "Ingredient {} is listed more than once",
                    ing.product_id
                )));
            }
            if state.db.get_product(owner_id, &ing.product_id).await?.is_none() {
                return Err(ApiError::validation(format!(
                    "Ingredient {} is not one of your products",
                    ing.product_id
                ))
                .with_details(serde_json::json!({ "field": "ingredients", "productId": ing.product_id })));
            }

            ingredients.push(RecipeIngredient {
                recipe_id: recipe.id.clone(),
                product_id: ing.product_id,
                quantity: ing.quantity,
            });
        }
        recipe.ingredients = ingredients;
        Ok(recipe)
    }
}

async fn load_recipe(state: &AppState, owner_id: &str, id: &str) -> ApiResult<Recipe> {
    state
        .db
        .get_recipe(owner_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Recipe", id))
}

/// GET /api/recipes
pub async fn list_recipes(State(state): State<Arc<AppState>>, user: AuthUser) -> ApiResult<Json<Vec<Recipe>>> {
    Ok(Json(state.db.list_recipes(&user.id).await?))
}

/// POST /api/recipes
pub async fn create_recipe(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppJson(body): AppJson<RecipeInput>,
) -> ApiResult<(StatusCode, Json<Recipe>)> {
    let now = Utc::now();
    let blank = Recipe {
        id: Uuid::new_v4().to_string(),
        owner_id: user.id.clone(),
        name: String::new(),
        category: String::new(),
        price_cents: 0,
        description: None,
        ingredients: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    let recipe = body.into_recipe(&state, &user.id, blank).await?;
    state.db.insert_recipe(&recipe).await?;

    info!(recipe_id = %recipe.id, name = %recipe.name, "Recipe created");
    Ok((StatusCode::CREATED, Json(recipe)))
}

/// GET /api/recipes/{id}
pub async fn get_recipe(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Recipe>> {
    Ok(Json(load_recipe(&state, &user.id, &id).await?))
}

/// PUT /api/recipes/{id}
pub async fn update_recipe(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    AppJson(body): AppJson<RecipeInput>,
) -> ApiResult<Json<Recipe>> {
    let existing = load_recipe(&state, &user.id, &id).await?;
    let mut recipe = body.into_recipe(&state, &user.id, existing).await?;
    recipe.updated_at = Utc::now();

    state.db.update_recipe(&recipe).await?;
    info!(recipe_id = %recipe.id, "Recipe updated");
    Ok(Json(recipe))
}

/// DELETE /api/recipes/{id}
pub async fn delete_recipe(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.db.delete_recipe(&user.id, &id).await?;
    info!(recipe_id = %id, "Recipe deleted");
    Ok(StatusCode::NO_CONTENT)
}
