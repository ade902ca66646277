//! # Analytics Routes
//!
//! ```text
//! GET /analytics/{tool}?days=N
//!        │
//!        ▼
//!   sale_records + products + recipes ──► analytics::run ──► data
//!                                                         │
//!                              narrative tools ──► Advisor (optional)
//! ```
//!
//! The heuristic `data` is always returned. The narrative is a bonus: if the
//! advisor is unconfigured or fails, `source` stays `heuristic`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use barback_core::analytics::{self, resolve_window, AnalyticsData, AnalyticsInput, AnalyticsTool};
use barback_db::DateRange;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::routes::AppQuery;
use crate::services::checkout::load_settings;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/analytics/{tool}", get(run_tool))
}

#[derive(Debug, Default, Deserialize)]
pub struct WindowQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightSource {
    Ai,
    Heuristic,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsResponse {
    pub tool: AnalyticsTool,
    pub window_days: i64,
    pub generated_at: DateTime<Utc>,
    pub source: InsightSource,
    pub data: AnalyticsData,
    pub narrative: Option<String>,
}

/// GET /api/analytics/{tool}
pub async fn run_tool(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(slug): Path<String>,
    AppQuery(query): AppQuery<WindowQuery>,
) -> ApiResult<Json<AnalyticsResponse>> {
    let tool = AnalyticsTool::from_slug(&slug).ok_or_else(|| ApiError::not_found("Analytics tool", &slug))?;
    let window_days = resolve_window(tool, query.days);
    let now = Utc::now();

    let settings = load_settings(&state.db, &user.id).await?;
    let since = now - Duration::days(tool.history_days(window_days));
    let records = state.db.sale_records(&user.id, DateRange::since(since)).await?;
    let products = state.db.list_products(&user.id).await?;
    let recipes = state.db.list_recipes(&user.id).await?;

    let input = AnalyticsInput {
        records: &records,
        products: &products,
        recipes: &recipes,
        now,
        window_days,
        utc_offset_minutes: settings.utc_offset_minutes,
        low_stock_threshold: settings.low_stock_threshold,
    };
    let data = analytics::run(tool, &input);
    debug!(tool = tool.slug(), window_days, records = records.len(), "Analytics computed");

    let narrative = match &state.advisor {
        Some(advisor) if tool.supports_narrative() => advisor.narrate(tool, window_days, &data).await,
        _ => None,
    };
    let source = if narrative.is_some() {
        InsightSource::Ai
    } else {
        InsightSource::Heuristic
    };

    Ok(Json(AnalyticsResponse {
        tool,
        window_days,
        generated_at: now,
        source,
        data,
        narrative,
    }))
}
