//! Integration tests for the HTTP surface.
//!
//! These tests send requests through the full router (middleware included)
//! and check status codes and JSON bodies:
//! 1. Receipt validation and entitlement queries
//! 2. Store webhook acknowledgements and authentication failures
//! 3. Error responses for bad input

mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use iap_reconciler::adapters::http::router;
use iap_reconciler::domain::foundation::AppId;
use iap_reconciler::domain::subscription::CanonicalEvent;
use iap_reconciler::ports::StoreError;

use common::{ios_fact, ios_transaction, TestWorld};

// =============================================================================
// Test Infrastructure
// =============================================================================

fn app(world: &TestWorld) -> Router {
    router(world.app_state(), Duration::from_secs(5))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_raw(uri: &str, body: &str) -> Request<Body> {
    Request::post(uri).body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

async fn validate(world: &TestWorld, receipt: &str) -> (StatusCode, Value) {
    send(
        app(world),
        post_json(
            &format!("/v1/apps/{}/receipts", world.app.id),
            json!({
                "appUserId": "user-1",
                "platform": "ios",
                "receiptData": receipt,
            }),
        ),
    )
    .await
}

// =============================================================================
// Client endpoints
// =============================================================================

#[tokio::test]
async fn health_reports_ok() {
    let world = TestWorld::new();

    let (status, body) = send(app(&world), get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn valid_receipt_returns_entitlement_snapshot() {
    let world = TestWorld::new();
    world.script_ios_receipt("receipt-1000", ios_transaction("1000", "1000", 30));

    let (status, body) = validate(&world, "receipt-1000").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["created"], json!(true));
    assert_eq!(body["appUserId"], json!("user-1"));
    assert_eq!(body["entitlements"][0]["identifier"], json!("pro"));
    assert_eq!(body["entitlements"][0]["isActive"], json!(true));
    assert_eq!(body["subscriptions"][0]["status"], json!("active"));
    assert_eq!(body["subscriptions"][0]["originalTransactionId"], json!("1000"));
}

#[tokio::test]
async fn forged_receipt_is_unprocessable() {
    let world = TestWorld::new();

    let (status, body) = validate(&world, "never-issued").await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["errorCode"], json!("RECEIPT_INVALID"));
}

#[tokio::test]
async fn store_outage_is_service_unavailable() {
    let world = TestWorld::new();
    world.script_ios_receipt("receipt-1000", ios_transaction("1000", "1000", 30));
    world.ios.fail_with(Some(StoreError::Network("connection reset".to_string())));

    let (status, body) = validate(&world, "receipt-1000").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["errorCode"], json!("STORE_UNAVAILABLE"));
}

#[tokio::test]
async fn unknown_app_is_not_found() {
    let world = TestWorld::new();

    let (status, body) = send(
        app(&world),
        post_json(
            &format!("/v1/apps/{}/receipts", AppId::new()),
            json!({ "appUserId": "user-1", "platform": "ios", "receiptData": "x" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errorCode"], json!("APP_NOT_FOUND"));
}

#[tokio::test]
async fn malformed_app_id_is_bad_request() {
    let world = TestWorld::new();

    let (status, body) = send(app(&world), get("/v1/apps/not-a-uuid/subscribers/u/entitlements")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errorCode"], json!("VALIDATION_FAILED"));
}

#[tokio::test]
async fn unknown_user_has_empty_snapshot() {
    let world = TestWorld::new();

    let (status, body) = send(
        app(&world),
        get(&format!("/v1/apps/{}/subscribers/nobody/entitlements", world.app.id)),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subscriberId"], Value::Null);
    assert_eq!(body["entitlements"], json!([]));
}

#[tokio::test]
async fn resync_pulls_store_state() {
    let world = TestWorld::new();
    world.script_ios_receipt("receipt-1000", ios_transaction("1000", "1000", 1));
    validate(&world, "receipt-1000").await;
    world.ios.set_latest(ios_transaction("1000", "1001", 31));

    let (status, body) = send(
        app(&world),
        post_raw(
            &format!("/v1/apps/{}/subscriptions/ios/1000/resync", world.app.id),
            "",
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subscription"]["status"], json!("active"));
    assert_eq!(body["subscription"]["latestTransactionId"], json!("1001"));
}

// =============================================================================
// Store webhooks
// =============================================================================

#[tokio::test]
async fn apple_webhook_is_processed_once() {
    let world = TestWorld::new();
    world.script_ios_receipt("receipt-1000", ios_transaction("1000", "1000", 2));
    validate(&world, "receipt-1000").await;
    world.script_apple_webhook(
        "signed-renewal",
        "evt-1",
        Some(ios_fact("1000", "1001", CanonicalEvent::Renewed, 32)),
    );
    let uri = format!("/webhooks/apple/{}", world.app.id);

    let (first_status, first) = send(app(&world), post_raw(&uri, "signed-renewal")).await;
    let (second_status, second) = send(app(&world), post_raw(&uri, "signed-renewal")).await;

    assert_eq!(first_status, StatusCode::OK);
    assert_eq!(first, json!({ "status": "processed", "detail": "active" }));
    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(second, json!({ "status": "duplicate" }));
}

#[tokio::test]
async fn webhook_with_bad_signature_is_unauthorized() {
    let world = TestWorld::new();
    world.apple_webhooks.reject("forged");

    let (status, body) = send(
        app(&world),
        post_raw(&format!("/webhooks/apple/{}", world.app.id), "forged"),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["errorCode"], json!("INVALID_SIGNATURE"));
}

#[tokio::test]
async fn malformed_webhook_is_acknowledged() {
    let world = TestWorld::new();

    let (status, body) = send(
        app(&world),
        post_raw(&format!("/webhooks/apple/{}", world.app.id), "garbage"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("malformed"));
}

#[tokio::test]
async fn google_webhook_routes_to_android_normalizer() {
    let world = TestWorld::new();

    let (status, body) = send(
        app(&world),
        post_raw(
            &format!("/webhooks/google/{}?token=push-secret", world.app.id),
            "unknown-push",
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("malformed"));
    assert_eq!(world.apple_webhooks.normalize_calls(), 0);
}
