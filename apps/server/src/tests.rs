//! Router tests against the in-memory store.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use barback_db::Database;

use crate::{build_router, AppState, ServerConfig};

fn app() -> Router {
    let config = ServerConfig::from_lookup(|_| None).unwrap();
    let state = AppState::new(Database::in_memory(), config).unwrap();
    build_router(Arc::new(state))
}

async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, json)
}

async fn register(app: &Router, username: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({ "username": username, "password": "correct-horse-battery" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["token"].as_str().unwrap().to_string()
}

async fn create_product(app: &Router, token: &str, name: &str, price_cents: i64, quantity: f64) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/products",
        Some(token),
        Some(json!({
            "name": name,
            "category": "Spirits",
            "priceCents": price_cents,
            "costCents": price_cents / 4,
            "quantity": quantity,
            "unit": "bottle",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_is_public() {
    let app = app();
    let (status, body) = send(&app, Method::GET, "/api/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"], "memory");
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let app = app();
    let (status, body) = send(&app, Method::GET, "/api/products", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_register_login_and_me() {
    let app = app();
    register(&app, "mara").await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({ "username": "mara", "password": "another-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "username": "mara", "password": "wrong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "username": "mara", "password": "correct-horse-battery" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, me) = send(&app, Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "mara");
    assert_eq!(me["totpEnabled"], false);
    assert!(me.get("passwordHash").is_none());
}

#[tokio::test]
async fn test_pending_token_is_not_an_access_token() {
    let app = app();
    let token = register(&app, "jun").await;
    let (_, me) = send(&app, Method::GET, "/api/auth/me", Some(&token), None).await;

    let pending = {
        let config = ServerConfig::from_lookup(|_| None).unwrap();
        let jwt = crate::JwtManager::new(config.jwt_secret, config.jwt_access_ttl_secs);
        let user = barback_core::User {
            id: me["id"].as_str().unwrap().to_string(),
            username: "jun".to_string(),
            password_hash: String::new(),
            totp_secret: None,
            totp_enabled: true,
            created_at: chrono::Utc::now(),
        };
        jwt.generate_pending_token(&user).unwrap()
    };

    let (status, _) = send(&app, Method::GET, "/api/auth/me", Some(&pending), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

fn authenticator(secret: &str) -> totp_rs::TOTP {
    let bytes = totp_rs::Secret::Encoded(secret.to_string()).to_bytes().unwrap();
    totp_rs::TOTP::new(totp_rs::Algorithm::SHA1, 6, 1, 30, bytes).unwrap()
}

/// A well-formed code outside the accepted skew window.
fn wrong_code(totp: &totp_rs::TOTP) -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let accepted: Vec<String> = [now - 30, now, now + 30].iter().map(|t| totp.generate(*t)).collect();
    (0..4u32)
        .map(|n| format!("{:06}", n * 111_111))
        .find(|code| !accepted.contains(code))
        .unwrap()
}

#[tokio::test]
async fn test_two_factor_setup_login_and_disable() {
    let app = app();
    let token = register(&app, "ines").await;

    let (status, setup) = send(&app, Method::POST, "/api/auth/2fa/setup", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK, "{}", setup);
    let secret = setup["secret"].as_str().unwrap().to_string();
    assert!(setup["otpauthUrl"].as_str().unwrap().contains(&secret));
    let totp = authenticator(&secret);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/2fa/enable",
        Some(&token),
        Some(json!({ "code": wrong_code(&totp) })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", body);

    let (status, user) = send(
        &app,
        Method::POST,
        "/api/auth/2fa/enable",
        Some(&token),
        Some(json!({ "code": totp.generate_current().unwrap() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", user);
    assert_eq!(user["totpEnabled"], true);

    let credentials = json!({ "username": "ines", "password": "correct-horse-battery" });
    let (status, login) = send(&app, Method::POST, "/api/auth/login", None, Some(credentials.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(login["requires2fa"], true);
    assert!(login.get("token").is_none());
    let pending = login["pendingToken"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/verify-2fa",
        None,
        Some(json!({ "pendingToken": pending, "code": wrong_code(&totp) })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "Invalid verification code");

    let (status, session) = send(
        &app,
        Method::POST,
        "/api/auth/verify-2fa",
        None,
        Some(json!({ "pendingToken": pending, "code": totp.generate_current().unwrap() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", session);
    let session_token = session["token"].as_str().unwrap().to_string();
    let (status, me) = send(&app, Method::GET, "/api/auth/me", Some(&session_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "ines");

    let (status, user) = send(
        &app,
        Method::POST,
        "/api/auth/2fa/disable",
        Some(&session_token),
        Some(json!({ "code": totp.generate_current().unwrap() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", user);
    assert_eq!(user["totpEnabled"], false);

    let (status, login) = send(&app, Method::POST, "/api/auth/login", None, Some(credentials)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(login["token"].is_string());
}

#[tokio::test]
async fn test_product_crud_and_validation() {
    let app = app();
    let token = register(&app, "owner1").await;
    let id = create_product(&app, &token, "Gin", 900, 10.0).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/products",
        Some(&token),
        Some(json!({ "name": "", "priceCents": 100 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["details"]["field"], "name");

    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/api/products/{}/quantity", id),
        Some(&token),
        Some(json!({ "delta": -2.5 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["quantity"], 7.5);

    let (status, _) = send(
        &app,
        Method::PATCH,
        &format!("/api/products/{}/quantity", id),
        Some(&token),
        Some(json!({ "delta": 1, "quantity": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // other owners cannot see it
    let other = register(&app, "owner2").await;
    let (status, _) = send(&app, Method::GET, &format!("/api/products/{}", id), Some(&other), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::DELETE, &format!("/api/products/{}", id), Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, list) = send(&app, Method::GET, "/api/products", Some(&token), None).await;
    assert_eq!(list.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_checkout_decrements_stock_and_void_restocks() {
    let app = app();
    let token = register(&app, "bartender").await;
    let id = create_product(&app, &token, "Lager", 700, 10.0).await;

    let (status, sale) = send(
        &app,
        Method::POST,
        "/api/sales/checkout",
        Some(&token),
        Some(json!({
            "items": [{ "kind": "product", "itemId": id, "quantity": 3 }],
            "paymentMethod": "cash",
            "tenderedCents": 5000,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", sale);
    assert_eq!(sale["subtotalCents"], 2100);
    assert_eq!(sale["receiptNumber"], "R-000001");
    assert_eq!(sale["changeCents"], 5000 - sale["totalCents"].as_i64().unwrap());

    let (_, product) = send(&app, Method::GET, &format!("/api/products/{}", id), Some(&token), None).await;
    assert_eq!(product["quantity"], 7.0);

    let sale_id = sale["id"].as_str().unwrap();
    let (status, voided) = send(&app, Method::POST, &format!("/api/sales/{}/void", sale_id), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(voided["status"], "voided");

    let (_, product) = send(&app, Method::GET, &format!("/api/products/{}", id), Some(&token), None).await;
    assert_eq!(product["quantity"], 10.0);

    let (status, _) = send(&app, Method::POST, &format!("/api/sales/{}/void", sale_id), Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_checkout_rejects_insufficient_stock() {
    let app = app();
    let token = register(&app, "bartender").await;
    let id = create_product(&app, &token, "Mezcal", 1400, 1.0).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/sales/checkout",
        Some(&token),
        Some(json!({
            "items": [{ "kind": "product", "itemId": id, "quantity": 2 }],
            "paymentMethod": "card",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (_, product) = send(&app, Method::GET, &format!("/api/products/{}", id), Some(&token), None).await;
    assert_eq!(product["quantity"], 1.0);
}

#[tokio::test]
async fn test_quote_uses_owner_tax_region() {
    let app = app();
    let token = register(&app, "quebecois").await;
    let id = create_product(&app, &token, "Cidre", 1000, 5.0).await;

    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/settings",
        Some(&token),
        Some(json!({ "taxRegion": "quebec" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, quote) = send(
        &app,
        Method::POST,
        "/api/sales/quote",
        Some(&token),
        Some(json!({ "items": [{ "kind": "product", "itemId": id, "quantity": 1 }] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", quote);
    assert_eq!(quote["totals"]["subtotalCents"], 1000);
    assert_eq!(quote["totals"]["taxCents"], 150);

    // nothing was sold
    let (_, product) = send(&app, Method::GET, &format!("/api/products/{}", id), Some(&token), None).await;
    assert_eq!(product["quantity"], 5.0);
}

#[tokio::test]
async fn test_tab_lifecycle() {
    let app = app();
    let token = register(&app, "server").await;
    let id = create_product(&app, &token, "Stout", 800, 20.0).await;

    let (status, tab) = send(
        &app,
        Method::POST,
        "/api/tabs",
        Some(&token),
        Some(json!({ "customerName": "Table 4" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let tab_id = tab["id"].as_str().unwrap().to_string();

    let (status, tab) = send(
        &app,
        Method::POST,
        &format!("/api/tabs/{}/items", tab_id),
        Some(&token),
        Some(json!({ "kind": "product", "itemId": id, "quantity": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", tab);
    assert_eq!(tab["subtotalCents"], 1600);

    let (status, sale) = send(
        &app,
        Method::POST,
        &format!("/api/tabs/{}/close", tab_id),
        Some(&token),
        Some(json!({ "paymentMethod": "card" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", sale);
    assert_eq!(sale["tabId"], tab_id.as_str());

    let (_, tab) = send(&app, Method::GET, &format!("/api/tabs/{}", tab_id), Some(&token), None).await;
    assert_eq!(tab["status"], "closed");
    assert_eq!(tab["saleId"], sale["id"]);

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/tabs/{}/items", tab_id),
        Some(&token),
        Some(json!({ "kind": "product", "itemId": id, "quantity": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, open) = send(&app, Method::GET, "/api/tabs?status=open", Some(&token), None).await;
    assert_eq!(open.as_array().unwrap().len(), 0);
    let (status, _) = send(&app, Method::GET, "/api/tabs?status=someday", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_settings_validation() {
    let app = app();
    let token = register(&app, "manager").await;

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/settings",
        Some(&token),
        Some(json!({ "taxRate": 250 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["details"]["field"], "taxRate");

    let (status, settings) = send(
        &app,
        Method::PUT,
        "/api/settings",
        Some(&token),
        Some(json!({ "businessName": "The Crooked Spoke", "currency": "usd" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settings["currency"], "USD");

    let (_, settings) = send(&app, Method::GET, "/api/settings", Some(&token), None).await;
    assert_eq!(settings["businessName"], "The Crooked Spoke");
    assert_eq!(settings["taxRegion"], "flat");
}

#[tokio::test]
async fn test_analytics_tools() {
    let app = app();
    let token = register(&app, "analyst").await;
    create_product(&app, &token, "Rye", 1100, 2.0).await;

    let (status, _) = send(&app, Method::GET, "/api/analytics/horoscope", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, Method::GET, "/api/analytics/low-stock?days=7", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["tool"], "low-stock");
    assert_eq!(body["windowDays"], 7);
    assert_eq!(body["source"], "heuristic");
    assert!(body["narrative"].is_null());

    // no advisor configured
    let (_, body) = send(&app, Method::GET, "/api/analytics/insights", Some(&token), None).await;
    assert_eq!(body["source"], "heuristic");
}

#[tokio::test]
async fn test_csv_import_upserts_by_name() {
    let app = app();
    let token = register(&app, "importer").await;
    create_product(&app, &token, "Vodka", 800, 3.0).await;

    let csv = "name,category,price,quantity\nvodka,Spirits,8.50,12\nTonic,Mixers,2.00,24\n,Mixers,1,1\n";
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/products/import")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "text/csv")
        .body(Body::from(csv))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let summary: Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(summary["created"], 1);
    assert_eq!(summary["updated"], 1);
    assert_eq!(summary["errors"].as_array().unwrap().len(), 1);

    let (_, list) = send(&app, Method::GET, "/api/products", Some(&token), None).await;
    assert_eq!(list.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_scrape_rejects_unlisted_hosts() {
    let app = app();
    let token = register(&app, "sommelier").await;

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/saq-scrape?url=https%3A%2F%2Fevil.example.com%2F",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::GET, "/api/saq-scrape", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stripe_requires_saved_key() {
    let app = app();
    let token = register(&app, "cashier").await;

    let (status, _) = send(&app, Method::POST, "/api/stripe/connection-token", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, keys) = send(
        &app,
        Method::PUT,
        "/api/stripe/keys",
        Some(&token),
        Some(json!({ "secretKey": "sk_test_51HxYzAbCdEfGhIj" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(keys["configured"], true);
    assert_ne!(keys["maskedKey"], "sk_test_51HxYzAbCdEfGhIj");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/stripe/confirm-payment-intent",
        Some(&token),
        Some(json!({ "paymentIntentId": "../../customers" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
