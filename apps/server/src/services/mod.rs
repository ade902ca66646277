//! Service layer: work that is more than reading and writing the store.
//!
//! - [`checkout`] - cart to recorded sale, shared by checkout and tab close
//! - [`advisor`] - LLM narratives for analytics, with retry and fallback
//! - [`stripe`] - Stripe Terminal REST client
//! - [`scrape`] - allowlisted page fetch for SAQ product lookups

pub mod advisor;
pub mod checkout;
pub mod scrape;
pub mod stripe;

use std::time::Duration;

/// Builds an HTTP client with an explicit timeout.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("barback/", env!("CARGO_PKG_VERSION")))
        .build()
}
