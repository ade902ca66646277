//! SAQ scrape passthrough.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::routes::AppQuery;
use crate::services::scrape::ScrapedPage;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/saq-scrape", get(scrape))
}

#[derive(Debug, Deserialize)]
pub struct ScrapeQuery {
    pub url: Option<String>,
}

/// GET /api/saq-scrape?url=https://www.saq.com/...
pub async fn scrape(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    AppQuery(query): AppQuery<ScrapeQuery>,
) -> ApiResult<Json<ScrapedPage>> {
    let url = query
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::validation("url is required"))?;
    Ok(Json(state.scraper.fetch(url.trim()).await?))
}
