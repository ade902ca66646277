//! # Stripe Terminal Routes
//!
//! Each owner stores their own Stripe secret key; every call below uses it.
//! The key itself is never returned or logged, only its masked preview.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use barback_core::{StripeAccount, ValidationError};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::routes::AppJson;
use crate::services::checkout::load_settings;
use crate::services::stripe::{is_payment_intent_id, ConnectionToken, PaymentIntent};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/stripe/keys", get(get_keys).put(put_keys))
        .route("/stripe/connection-token", post(connection_token))
        .route("/stripe/create-payment-intent", post(create_payment_intent))
        .route("/stripe/confirm-payment-intent", post(confirm_payment_intent))
        .route("/stripe/cancel-payment-intent", post(cancel_payment_intent))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeysRequest {
    pub secret_key: String,
    pub location_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeysStatus {
    pub configured: bool,
    pub masked_key: Option<String>,
    pub location_id: Option<String>,
}

impl From<Option<StripeAccount>> for KeysStatus {
    fn from(account: Option<StripeAccount>) -> Self {
        match account {
            Some(account) => KeysStatus {
                configured: true,
                masked_key: Some(account.masked_key()),
                location_id: account.location_id,
            },
            None => KeysStatus {
                configured: false,
                masked_key: None,
                location_id: None,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentRequest {
    pub amount_cents: i64,
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentRequest {
    pub payment_intent_id: String,
}

/// Secret and restricted keys only; publishable keys cannot create intents.
fn validate_secret_key(key: &str) -> Result<(), ValidationError> {
    let valid = (key.starts_with("sk_") || key.starts_with("rk_"))
        && key.len() > 10
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(ValidationError::InvalidFormat {
            field: "secretKey".to_string(),
            reason: "expected a Stripe secret key (sk_...) or restricted key (rk_...)".to_string(),
        });
    }
    Ok(())
}

fn validate_intent_id(id: &str) -> Result<(), ValidationError> {
    if !is_payment_intent_id(id) {
        return Err(ValidationError::InvalidFormat {
            field: "paymentIntentId".to_string(),
            reason: "expected a PaymentIntent id (pi_...)".to_string(),
        });
    }
    Ok(())
}

async fn require_account(state: &AppState, owner_id: &str) -> ApiResult<StripeAccount> {
    state
        .db
        .get_stripe_account(owner_id)
        .await?
        .ok_or_else(|| ApiError::validation("Stripe is not configured; save a secret key first"))
}

/// GET /api/stripe/keys
pub async fn get_keys(State(state): State<Arc<AppState>>, user: AuthUser) -> ApiResult<Json<KeysStatus>> {
    Ok(Json(state.db.get_stripe_account(&user.id).await?.into()))
}

/// PUT /api/stripe/keys
pub async fn put_keys(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppJson(body): AppJson<KeysRequest>,
) -> ApiResult<Json<KeysStatus>> {
    let secret_key = body.secret_key.trim().to_string();
    validate_secret_key(&secret_key)?;

    let account = StripeAccount {
        owner_id: user.id.clone(),
        secret_key,
        location_id: body.location_id.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()),
        updated_at: Utc::now(),
    };
    state.db.put_stripe_account(&account).await?;

    info!(user_id = %user.id, key = %account.masked_key(), "Stripe key saved");
    Ok(Json(Some(account).into()))
}

/// POST /api/stripe/connection-token
pub async fn connection_token(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<Json<ConnectionToken>> {
    let account = require_account(&state, &user.id).await?;
    let token = state
        .stripe
        .connection_token(&account.secret_key, account.location_id.as_deref())
        .await?;
    Ok(Json(token))
}

/// POST /api/stripe/create-payment-intent
///
/// Currency defaults to the owner's settings currency.
pub async fn create_payment_intent(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppJson(body): AppJson<CreateIntentRequest>,
) -> ApiResult<Json<PaymentIntent>> {
    if body.amount_cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "amountCents".to_string(),
        }
        .into());
    }
    let currency = match body.currency.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()) {
        Some(currency) => currency,
        None => load_settings(&state.db, &user.id).await?.currency,
    };

    let account = require_account(&state, &user.id).await?;
    let intent = state
        .stripe
        .create_payment_intent(&account.secret_key, body.amount_cents, &currency)
        .await?;

    info!(payment_intent = %intent.id, amount = intent.amount, "Payment intent created");
    Ok(Json(intent))
}

/// POST /api/stripe/confirm-payment-intent
pub async fn confirm_payment_intent(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppJson(body): AppJson<IntentRequest>,
) -> ApiResult<Json<PaymentIntent>> {
    validate_intent_id(&body.payment_intent_id)?;
    let account = require_account(&state, &user.id).await?;
    let intent = state
        .stripe
        .confirm_payment_intent(&account.secret_key, &body.payment_intent_id)
        .await?;

    info!(payment_intent = %intent.id, status = %intent.status, "Payment intent confirmed");
    Ok(Json(intent))
}

/// POST /api/stripe/cancel-payment-intent
pub async fn cancel_payment_intent(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppJson(body): AppJson<IntentRequest>,
) -> ApiResult<Json<PaymentIntent>> {
    validate_intent_id(&body.payment_intent_id)?;
    let account = require_account(&state, &user.id).await?;
    let intent = state
        .stripe
        .cancel_payment_intent(&account.secret_key, &body.payment_intent_id)
        .await?;

    info!(payment_intent = %intent.id, "Payment intent cancelled");
    Ok(Json(intent))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_key_prefixes() {
        assert!(validate_secret_key("sk_test_51abcDEF123").is_ok());
        assert!(validate_secret_key("rk_live_51abcDEF123").is_ok());
        assert!(validate_secret_key("pk_test_51abcDEF123").is_err());
        assert!(validate_secret_key("sk_").is_err());
        assert!(validate_secret_key("sk_test_51abc DEF").is_err());
    }

    #[test]
    fn test_keys_status_never_exposes_key() {
        let status = KeysStatus::from(Some(StripeAccount {
            owner_id: "o".to_string(),
            secret_key: "sk_test_51abcdefghijklmnop".to_string(),
            location_id: Some("tml_123".to_string()),
            updated_at: Utc::now(),
        }));
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"configured\":true"));
        assert!(!json.contains("sk_test_51abcdefghijklmnop"));

        assert!(!KeysStatus::from(None).configured);
    }
}
