//! # Barback Server
//!
//! REST API for the Barback POS, everything under `/api`.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Barback Server                                  │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────────┐│
//! │  │  auth          │  │  products      │  │  sales                     ││
//! │  │                │  │  recipes       │  │                            ││
//! │  │ • register     │  │                │  │ • quote / checkout         ││
//! │  │ • login + 2FA  │  │ • CRUD         │  │ • list / get / void        ││
//! │  │ • me           │  │ • CSV in/out   │  │ • CSV export               ││
//! │  └────────────────┘  └────────────────┘  └────────────────────────────┘│
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────────┐│
//! │  │  tabs          │  │  analytics     │  │  stripe / saq-scrape       ││
//! │  │                │  │                │  │                            ││
//! │  │ • open / items │  │ • 14 tools     │  │ • Terminal payment intents ││
//! │  │ • close/cancel │  │ • LLM narrative│  │ • allowlisted page fetch   ││
//! │  └────────────────┘  └────────────────┘  └────────────────────────────┘│
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  AppState: Database (Arc<dyn Store>) • JwtManager • services     │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! See [`config::ServerConfig`] for the environment variables.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod services;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::{middleware, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use barback_db::Database;

pub use auth::{AuthUser, JwtManager};
pub use config::ServerConfig;
pub use error::{ApiError, ApiResult, ErrorCode};

use services::advisor::Advisor;
use services::scrape::Scraper;
use services::stripe::StripeClient;

/// Shared application state.
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    pub jwt: JwtManager,
    /// `None` when no LLM is configured.
    pub advisor: Option<Advisor>,
    pub stripe: StripeClient,
    pub scraper: Scraper,
}

impl AppState {
    pub fn new(db: Database, config: ServerConfig) -> reqwest::Result<Self> {
        Ok(AppState {
            jwt: JwtManager::new(config.jwt_secret.clone(), config.jwt_access_ttl_secs),
            advisor: Advisor::from_config(&config)?,
            stripe: StripeClient::new(config.stripe_api_base.clone())?,
            scraper: Scraper::new(config.saq_allowed_hosts.clone())?,
            db,
            config,
        })
    }
}

/// The full application: `/api` routes plus tracing, CORS and error
/// redaction.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", routes::api_router())
        .layer(middleware::from_fn_with_state(state.clone(), error::hide_internal_details))
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    match config.cors_origin.as_deref().map(HeaderValue::from_str) {
        Some(Ok(origin)) => layer.allow_origin(origin),
        Some(Err(_)) => {
            warn!("CORS_ORIGIN is not a valid header value, allowing any origin");
            layer.allow_origin(Any)
        }
        None => layer.allow_origin(Any),
    }
}
