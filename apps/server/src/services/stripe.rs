//! Stripe Terminal client.
//!
//! Thin form-encoded calls against the Stripe REST API using each owner's
//! own secret key. Calls are never retried: creating a payment intent is
//! not idempotent without an idempotency key, and the reader drives retries.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{instrument, warn};

use crate::error::ApiError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum StripeError {
    #[error("Stripe unreachable: {0}")]
    Transport(String),
    #[error("Stripe error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Unexpected Stripe response: {0}")]
    Decode(String),
}

impl From<StripeError> for ApiError {
    fn from(err: StripeError) -> Self {
        match err {
            StripeError::Api { message, .. } => ApiError::upstream(message),
            other => ApiError::upstream(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionToken {
    pub secret: String,
}

/// The subset of a PaymentIntent the reader flow needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub id: String,
    #[serde(alias = "client_secret")]
    pub client_secret: Option<String>,
    pub status: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct StripeClient {
    http: Client,
    api_base: String,
}

impl StripeClient {
    pub fn new(api_base: impl Into<String>) -> reqwest::Result<Self> {
        Ok(StripeClient {
            http: super::http_client(REQUEST_TIMEOUT)?,
            api_base: api_base.into(),
        })
    }

    async fn post_form<T>(&self, secret_key: &str, path: &str, form: &[(&str, String)]) -> Result<T, StripeError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let res = self
            .http
            .post(format!("{}{}", self.api_base, path))
            .basic_auth(secret_key, Option::<&str>::None)
            .form(form)
            .send()
            .await
            .map_err(|e| StripeError::Transport(e.to_string()))?;

        let status = res.status();
        if status.is_success() {
            return res.json::<T>().await.map_err(|e| StripeError::Decode(e.to_string()));
        }

        let body = res.text().await.unwrap_or_default();
        let message = serde_json::from_str::<StripeErrorBody>(&body)
            .ok()
            .and_then(|b| b.error.message)
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        warn!(status = status.as_u16(), path, "Stripe request failed: {}", message);
        Err(StripeError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// A connection token for the Terminal SDK.
    #[instrument(skip(self, secret_key))]
    pub async fn connection_token(
        &self,
        secret_key: &str,
        location_id: Option<&str>,
    ) -> Result<ConnectionToken, StripeError> {
        let mut form = Vec::new();
        if let Some(location) = location_id {
            form.push(("location", location.to_string()));
        }
        self.post_form(secret_key, "/terminal/connection_tokens", &form).await
    }

    /// A card-present payment intent captured automatically on confirm.
    #[instrument(skip(self, secret_key))]
    pub async fn create_payment_intent(
        &self,
        secret_key: &str,
        amount_cents: i64,
        currency: &str,
    ) -> Result<PaymentIntent, StripeError> {
        let form = [
            ("amount", amount_cents.to_string()),
            ("currency", currency.to_ascii_lowercase()),
            ("payment_method_types[]", "card_present".to_string()),
            ("capture_method", "automatic".to_string()),
        ];
        self.post_form(secret_key, "/payment_intents", &form).await
    }

    #[instrument(skip(self, secret_key))]
    pub async fn confirm_payment_intent(&self, secret_key: &str, id: &str) -> Result<PaymentIntent, StripeError> {
        self.post_form(secret_key, &format!("/payment_intents/{}/confirm", id), &[])
            .await
    }

    #[instrument(skip(self, secret_key))]
    pub async fn cancel_payment_intent(&self, secret_key: &str, id: &str) -> Result<PaymentIntent, StripeError> {
        self.post_form(secret_key, &format!("/payment_intents/{}/cancel", id), &[])
            .await
    }
}

/// Whether `id` looks like a PaymentIntent id (`pi_` plus alphanumerics),
/// so it can be placed in a URL path.
pub fn is_payment_intent_id(id: &str) -> bool {
    id.strip_prefix("pi_")
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_intent_id_shape() {
        assert!(is_payment_intent_id("pi_3MtwBwLkdIwHu7ix28a3tqPa"));
        assert!(!is_payment_intent_id("pi_"));
        assert!(!is_payment_intent_id("pi_123/../refunds"));
        assert!(!is_payment_intent_id("ch_123"));
    }

    #[test]
    fn test_stripe_errors_are_upstream() {
        let err: ApiError = StripeError::Api {
            status: 402,
            message: "Your card was declined.".to_string(),
        }
        .into();
        assert_eq!(err.code, crate::error::ErrorCode::Upstream);
        assert_eq!(err.message, "Your card was declined.");
    }

    #[test]
    fn test_payment_intent_decodes_stripe_json() {
        let pi: PaymentIntent = serde_json::from_str(
            r#"{"id":"pi_1","client_secret":"pi_1_secret_x","status":"requires_payment_method","amount":1250,"currency":"cad","object":"payment_intent"}"#,
        )
        .unwrap();
        assert_eq!(pi.client_secret.as_deref(), Some("pi_1_secret_x"));
        assert_eq!(pi.amount, 1250);
    }
}
