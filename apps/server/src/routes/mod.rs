//! HTTP routes, one module per resource.
//!
//! Handlers take [`AuthUser`](crate::AuthUser) to require an access token
//! and pass `user.id` as the owner of everything they read or write.

pub mod analytics;
pub mod auth;
pub mod health;
pub mod products;
pub mod recipes;
pub mod sales;
pub mod scrape;
pub mod settings;
pub mod stripe;
pub mod tabs;

use std::sync::Arc;

use axum::extract::{FromRequest, FromRequestParts};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::error::ApiError;
use crate::AppState;

/// JSON body whose parse errors come back as `VALIDATION_ERROR`.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct AppJson<T>(pub T);

/// Query string whose parse errors come back as `VALIDATION_ERROR`.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct AppQuery<T>(pub T);

/// Every `/api` route.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(health::router())
        .merge(auth::router())
        .merge(products::router())
        .merge(recipes::router())
        .merge(sales::router())
        .merge(tabs::router())
        .merge(settings::router())
        .merge(analytics::router())
        .merge(stripe::router())
        .merge(scrape::router())
}

/// A `text/csv` download.
pub(crate) fn csv_download(filename: &str, body: String) -> Response {
    (
        [
            (CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", filename)),
        ],
        body,
    )
        .into_response()
}
