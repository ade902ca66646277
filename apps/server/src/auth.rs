//! Authentication: JWTs, password hashing and TOTP.
//!
//! ## Login Flow
//! ```text
//! POST /api/auth/login
//!     │
//!     ├── 2FA off ──► { token, user }              token_type = "access"
//!     │
//!     └── 2FA on  ──► { requires2fa, pendingToken } token_type = "2fa_pending"
//!                          │                        (5 minutes)
//!                          ▼
//!                 POST /api/auth/verify-2fa { pendingToken, code }
//!                          │
//!                          └──► { token, user }
//! ```
//!
//! Only access tokens pass the [`AuthUser`] extractor.

use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use totp_rs::{Algorithm, Secret, TOTP};
use uuid::Uuid;

use barback_core::User;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub const ACCESS_TOKEN: &str = "access";
pub const PENDING_2FA_TOKEN: &str = "2fa_pending";

const PENDING_2FA_LIFETIME_SECS: i64 = 5 * 60;

const TOTP_ISSUER: &str = "Barback";
const TOTP_DIGITS: usize = 6;
const TOTP_SKEW: u8 = 1;
const TOTP_STEP_SECS: u64 = 30;
/// 160 bits, the RFC 4226 recommendation.
const TOTP_SECRET_BYTES: usize = 20;

// =============================================================================
// JWT
// =============================================================================

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id, which is also the owner id of their data)
    pub sub: String,

    pub username: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration (Unix timestamp)
    pub exp: i64,

    /// JWT ID (unique identifier for this token)
    pub jti: String,

    /// Token type ("access" or "2fa_pending")
    pub token_type: String,
}

/// JWT token manager.
pub struct JwtManager {
    secret: String,
    access_lifetime_secs: i64,
}

impl JwtManager {
    /// Create a new JWT manager.
    pub fn new(secret: String, access_lifetime_secs: i64) -> Self {
        JwtManager {
            secret,
            access_lifetime_secs,
        }
    }

    fn generate(&self, user: &User, token_type: &str, lifetime_secs: i64) -> ApiResult<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(lifetime_secs);

        let claims = Claims {
            sub: user.id.clone(),
            username: user.username.clone(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
            token_type: token_type.to_string(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| ApiError::internal(format!("Failed to generate token: {}", e)))
    }

    /// Generate an access token.
    pub fn generate_access_token(&self, user: &User) -> ApiResult<String> {
        self.generate(user, ACCESS_TOKEN, self.access_lifetime_secs)
    }

    /// Generate the short-lived token that stands between password and
    /// TOTP code.
    pub fn generate_pending_token(&self, user: &User) -> ApiResult<String> {
        self.generate(user, PENDING_2FA_TOKEN, PENDING_2FA_LIFETIME_SECS)
    }

    /// Validate and decode a token.
    pub fn validate_token(&self, token: &str) -> ApiResult<Claims> {
        let validation = Validation::default();

        let token_data: TokenData<Claims> = decode(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| ApiError::unauthorized(format!("Invalid token: {}", e)))?;

        Ok(token_data.claims)
    }

    fn validate_type(&self, token: &str, expected: &str) -> ApiResult<Claims> {
        let claims = self.validate_token(token)?;

        if claims.token_type != expected {
            return Err(ApiError::unauthorized(format!("Expected {} token", expected)));
        }

        Ok(claims)
    }

    /// Validate that a token is an access token.
    pub fn validate_access_token(&self, token: &str) -> ApiResult<Claims> {
        self.validate_type(token, ACCESS_TOKEN)
    }

    /// Validate that a token is a pending 2FA token.
    pub fn validate_pending_token(&self, token: &str) -> ApiResult<Claims> {
        self.validate_type(token, PENDING_2FA_TOKEN)
    }
}

/// Extract bearer token from authorization header.
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

// =============================================================================
// Extractor
// =============================================================================

/// The caller, as proven by an access token.
///
/// Every owned resource is scoped by `id`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub username: String,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Missing authorization header"))?;

        let token =
            extract_bearer_token(header).ok_or_else(|| ApiError::unauthorized("Expected a Bearer token"))?;

        let claims = state.jwt.validate_access_token(token)?;
        Ok(AuthUser {
            id: claims.sub,
            username: claims.username,
        })
    }
}

// =============================================================================
// Passwords
// =============================================================================

/// Hashes a password into an argon2 PHC string.
pub fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))
}

/// Checks a password against a stored PHC string.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(e) => {
            tracing::warn!("Stored password hash is unreadable: {}", e);
            false
        }
    }
}

// =============================================================================
// TOTP
// =============================================================================

/// A fresh random secret, base32 encoded.
pub fn generate_totp_secret() -> String {
    let mut bytes = vec![0u8; TOTP_SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    Secret::Raw(bytes).to_encoded().to_string()
}

fn totp(secret: &str) -> ApiResult<TOTP> {
    let bytes = Secret::Encoded(secret.to_string())
        .to_bytes()
        .map_err(|e| ApiError::internal(format!("Stored TOTP secret is invalid: {:?}", e)))?;

    TOTP::new(Algorithm::SHA1, TOTP_DIGITS, TOTP_SKEW, TOTP_STEP_SECS, bytes)
        .map_err(|e| ApiError::internal(format!("Stored TOTP secret is invalid: {}", e)))
}

/// Whether `code` is valid now, allowing one step of clock skew.
pub fn verify_totp(secret: &str, code: &str) -> ApiResult<bool> {
    totp(secret)?
        .check_current(code)
        .map_err(|e| ApiError::internal(format!("System clock error: {}", e)))
}

/// The `otpauth://` URL authenticator apps scan.
pub fn otpauth_url(secret: &str, username: &str) -> String {
    format!(
        "otpauth://totp/{issuer}:{account}?secret={secret}&issuer={issuer}&algorithm=SHA1&digits={digits}&period={period}",
        issuer = TOTP_ISSUER,
        account = urlencoding::encode(username),
        secret = secret,
        digits = TOTP_DIGITS,
        period = TOTP_STEP_SECS,
    )
}
