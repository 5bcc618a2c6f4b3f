//! Axum router configuration for the reconciliation endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    apple_webhook, get_entitlements, google_webhook, resync_subscription, validate_receipt,
    IapAppState,
};

/// Client-facing endpoints.
///
/// # Routes
/// - `POST /apps/:app_id/receipts` - Validate a receipt
/// - `GET /apps/:app_id/subscribers/:app_user_id/entitlements` - Entitlement snapshot
/// - `POST /apps/:app_id/subscriptions/:platform/:original_transaction_id/resync` - Resync from store
pub fn client_routes() -> Router<IapAppState> {
    Router::new()
        .route("/apps/:app_id/receipts", post(validate_receipt))
        .route(
            "/apps/:app_id/subscribers/:app_user_id/entitlements",
            get(get_entitlements),
        )
        .route(
            "/apps/:app_id/subscriptions/:platform/:original_transaction_id/resync",
            post(resync_subscription),
        )
}

/// Store webhook endpoints.
///
/// These carry no client credentials; Apple payloads are verified by their
/// JWS chain and Google pushes by the token query parameter.
///
/// # Routes
/// - `POST /apple/:app_id` - App Store Server Notifications V2
/// - `POST /google/:app_id?token=` - Play Real-time Developer Notifications
pub fn webhook_routes() -> Router<IapAppState> {
    Router::new()
        .route("/apple/:app_id", post(apple_webhook))
        .route("/google/:app_id", post(google_webhook))
}

/// Complete reconciliation router, mounted at the server root.
pub fn iap_router() -> Router<IapAppState> {
    Router::new()
        .nest("/v1", client_routes())
        .nest("/webhooks", webhook_routes())
}
