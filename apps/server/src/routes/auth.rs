//! # Auth Routes
//!
//! Registration, password login, and TOTP two-factor authentication.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use barback_core::validation::{validate_password, validate_totp_code, validate_username};
use barback_core::User;

use crate::auth::{generate_totp_secret, hash_password, otpauth_url, verify_password, verify_totp, AuthUser};
use crate::error::{ApiError, ApiResult};
use crate::routes::AppJson;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/verify-2fa", post(verify_2fa))
        .route("/auth/2fa/setup", post(setup_2fa))
        .route("/auth/2fa/enable", post(enable_2fa))
        .route("/auth/2fa/disable", post(disable_2fa))
        .route("/auth/me", get(me))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingLogin {
    #[serde(rename = "requires2fa")]
    pub requires_2fa: bool,
    pub pending_token: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum LoginResponse {
    Session(Session),
    Pending(PendingLogin),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub pending_token: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotpSetup {
    pub secret: String,
    pub otpauth_url: String,
}

fn session(state: &AppState, user: User) -> ApiResult<Session> {
    Ok(Session {
        token: state.jwt.generate_access_token(&user)?,
        user,
    })
}

/// The caller's account row.
async fn current_user(state: &AppState, auth: &AuthUser) -> ApiResult<User> {
    state
        .db
        .get_user(&auth.id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Account no longer exists"))
}

/// Checks a submitted code against the user's stored secret.
fn check_code(user: &User, code: &str) -> ApiResult<()> {
    let code = validate_totp_code(code)?;
    let secret = user
        .totp_secret
        .as_deref()
        .ok_or_else(|| ApiError::validation("Two-factor authentication has not been set up"))?;

    if !verify_totp(secret, &code)? {
        warn!(user_id = %user.id, "Rejected TOTP code");
        return Err(ApiError::unauthorized("Invalid verification code"));
    }
    Ok(())
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<Credentials>,
) -> ApiResult<(StatusCode, Json<Session>)> {
    let username = validate_username(&body.username)?;
    validate_password(&body.password)?;

    let user = User {
        id: Uuid::new_v4().to_string(),
        username,
        password_hash: hash_password(&body.password)?,
        totp_secret: None,
        totp_enabled: false,
        created_at: Utc::now(),
    };
    state.db.create_user(&user).await?;

    info!(user_id = %user.id, username = %user.username, "User registered");
    Ok((StatusCode::CREATED, Json(session(&state, user)?)))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<Credentials>,
) -> ApiResult<Json<LoginResponse>> {
    let user = state.db.find_user_by_username(body.username.trim()).await?;

    let user = match user {
        Some(user) if verify_password(&body.password, &user.password_hash) => user,
        _ => {
            debug!(username = %body.username.trim(), "Login failed");
            return Err(ApiError::unauthorized("Invalid username or password"));
        }
    };

    if user.totp_enabled {
        let pending_token = state.jwt.generate_pending_token(&user)?;
        return Ok(Json(LoginResponse::Pending(PendingLogin {
            requires_2fa: true,
            pending_token,
        })));
    }

    info!(user_id = %user.id, "User logged in");
    Ok(Json(LoginResponse::Session(session(&state, user)?)))
}

/// POST /api/auth/verify-2fa
pub async fn verify_2fa(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<VerifyRequest>,
) -> ApiResult<Json<Session>> {
    let claims = state.jwt.validate_pending_token(&body.pending_token)?;
    let user = state
        .db
        .get_user(&claims.sub)
        .await?
        .filter(|u| u.totp_enabled)
        .ok_or_else(|| ApiError::unauthorized("Two-factor login is no longer pending"))?;

    check_code(&user, &body.code)?;

    info!(user_id = %user.id, "User logged in with 2FA");
    Ok(Json(session(&state, user)?))
}

/// POST /api/auth/2fa/setup
///
/// Stores a new secret without enabling it; `enable` turns it on once the
/// user proves their authenticator has it.
pub async fn setup_2fa(State(state): State<Arc<AppState>>, auth: AuthUser) -> ApiResult<Json<TotpSetup>> {
    let user = current_user(&state, &auth).await?;
    if user.totp_enabled {
        return Err(ApiError::conflict("Two-factor authentication is already enabled"));
    }

    let secret = generate_totp_secret();
    state.db.set_totp(&user.id, Some(&secret), false).await?;

    Ok(Json(TotpSetup {
        otpauth_url: otpauth_url(&secret, &user.username),
        secret,
    }))
}

/// POST /api/auth/2fa/enable
pub async fn enable_2fa(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    AppJson(body): AppJson<CodeRequest>,
) -> ApiResult<Json<User>> {
    let user = current_user(&state, &auth).await?;
    if user.totp_enabled {
        return Err(ApiError::conflict("Two-factor authentication is already enabled"));
    }
    check_code(&user, &body.code)?;

    state.db.set_totp(&user.id, user.totp_secret.as_deref(), true).await?;
    info!(user_id = %user.id, "2FA enabled");
    Ok(Json(current_user(&state, &auth).await?))
}

/// POST /api/auth/2fa/disable
pub async fn disable_2fa(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    AppJson(body): AppJson<CodeRequest>,
) -> ApiResult<Json<User>> {
    let user = current_user(&state, &auth).await?;
    if !user.totp_enabled {
        return Err(ApiError::validation("Two-factor authentication is not enabled"));
    }
    check_code(&user, &body.code)?;

    state.db.set_totp(&user.id, None, false).await?;
    info!(user_id = %user.id, "2FA disabled");
    Ok(Json(current_user(&state, &auth).await?))
}

/// GET /api/auth/me
pub async fn me(State(state): State<Arc<AppState>>, auth: AuthUser) -> ApiResult<Json<User>> {
    Ok(Json(current_user(&state, &auth).await?))
}
