//! HTTP handlers for the receipt, entitlement and store webhook endpoints.
//!
//! These handlers connect Axum routes to application layer command/query handlers.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Json, Path, Query, State};
use axum::response::IntoResponse;

use crate::application::handlers::{
    GetEntitlementsHandler, GetEntitlementsQuery, HandleStoreWebhookCommand,
    HandleStoreWebhookHandler, ResyncSubscriptionCommand, ResyncSubscriptionHandler,
    StoreAdapters, SubscriptionReconciler, ValidateReceiptCommand, ValidateReceiptHandler,
};
use crate::domain::foundation::{AppId, Timestamp};
use crate::domain::subscription::{Platform, ReconcileError};
use crate::ports::{
    AppRegistry, EntitlementRepository, NotificationNormalizer, ProductCatalog,
    SubscriberRepository, SubscriptionRepository, WebhookEventRepository,
};

use super::dto::{
    EntitlementSnapshotResponse, ErrorResponse, GoogleWebhookQuery, HealthResponse,
    ResyncResponse, ValidateReceiptRequest, ValidateReceiptResponse, WebhookAckResponse,
};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared application state containing all dependencies.
///
/// Cloned for each request; handlers are built on demand from the
/// Arc-wrapped ports.
#[derive(Clone)]
pub struct IapAppState {
    pub apps: Arc<dyn AppRegistry>,
    pub catalog: Arc<dyn ProductCatalog>,
    pub subscribers: Arc<dyn SubscriberRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub entitlements: Arc<dyn EntitlementRepository>,
    pub ledger: Arc<dyn WebhookEventRepository>,
    pub stores: StoreAdapters,
    pub normalizers: Vec<Arc<dyn NotificationNormalizer>>,
    pub reconciler: Arc<SubscriptionReconciler>,
    /// How long a webhook claim is held before another delivery may take it over.
    pub webhook_claim_lease: Duration,
}

impl IapAppState {
    pub fn validate_receipt_handler(&self) -> ValidateReceiptHandler {
        ValidateReceiptHandler::new(
            self.apps.clone(),
            self.catalog.clone(),
            self.subscribers.clone(),
            self.subscriptions.clone(),
            self.stores.clone(),
            self.reconciler.clone(),
        )
    }

    pub fn get_entitlements_handler(&self) -> GetEntitlementsHandler {
        GetEntitlementsHandler::new(
            self.apps.clone(),
            self.subscribers.clone(),
            self.subscriptions.clone(),
            self.entitlements.clone(),
        )
    }

    pub fn resync_handler(&self) -> ResyncSubscriptionHandler {
        ResyncSubscriptionHandler::new(
            self.apps.clone(),
            self.subscriptions.clone(),
            self.stores.clone(),
            self.reconciler.clone(),
        )
    }

    pub fn webhook_handler(&self) -> HandleStoreWebhookHandler {
        HandleStoreWebhookHandler::new(
            self.apps.clone(),
            self.normalizers.clone(),
            self.ledger.clone(),
            self.reconciler.clone(),
            self.webhook_claim_lease,
        )
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Client Endpoints
// ════════════════════════════════════════════════════════════════════════════════

/// POST /v1/apps/:app_id/receipts - Validate a receipt and return entitlements
pub async fn validate_receipt(
    State(state): State<IapAppState>,
    Path(app_id): Path<String>,
    Json(request): Json<ValidateReceiptRequest>,
) -> Result<impl IntoResponse, IapApiError> {
    let cmd = ValidateReceiptCommand {
        app_id: parse_app_id(&app_id)?,
        app_user_id: request.app_user_id,
        platform: request.platform,
        receipt_data: request.receipt_data,
        product_id: request.product_id,
        transaction_id: request.transaction_id,
        subscription_id: request.subscription_id,
    };

    let result = state.validate_receipt_handler().handle(cmd).await?;

    Ok(Json(ValidateReceiptResponse::from(result)))
}

/// GET /v1/apps/:app_id/subscribers/:app_user_id/entitlements - Entitlement snapshot
pub async fn get_entitlements(
    State(state): State<IapAppState>,
    Path((app_id, app_user_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, IapApiError> {
    let query = GetEntitlementsQuery {
        app_id: parse_app_id(&app_id)?,
        app_user_id,
    };

    let snapshot = state.get_entitlements_handler().handle(query).await?;

    Ok(Json(EntitlementSnapshotResponse::from(snapshot)))
}

/// POST /v1/apps/:app_id/subscriptions/:platform/:original_transaction_id/resync
pub async fn resync_subscription(
    State(state): State<IapAppState>,
    Path((app_id, platform, original_transaction_id)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, IapApiError> {
    let cmd = ResyncSubscriptionCommand {
        app_id: parse_app_id(&app_id)?,
        platform: Platform::from_str(&platform)
            .map_err(|e| ReconcileError::Validation(e.to_string()))?,
        original_transaction_id,
    };

    let result = state.resync_handler().handle(cmd).await?;

    Ok(Json(ResyncResponse::new(
        result.subscription,
        result.entitlements,
        Timestamp::now(),
    )))
}

// ════════════════════════════════════════════════════════════════════════════════
// Store Webhooks (authenticated by payload signature or push token)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /webhooks/apple/:app_id - App Store Server Notifications V2
pub async fn apple_webhook(
    State(state): State<IapAppState>,
    Path(app_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, IapApiError> {
    handle_webhook(state, &app_id, Platform::Ios, body, None).await
}

/// POST /webhooks/google/:app_id?token= - Play Real-time Developer Notifications
pub async fn google_webhook(
    State(state): State<IapAppState>,
    Path(app_id): Path<String>,
    Query(query): Query<GoogleWebhookQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, IapApiError> {
    handle_webhook(state, &app_id, Platform::Android, body, query.token).await
}

async fn handle_webhook(
    state: IapAppState,
    app_id: &str,
    platform: Platform,
    body: Bytes,
    credential: Option<String>,
) -> Result<Json<WebhookAckResponse>, IapApiError> {
    let cmd = HandleStoreWebhookCommand {
        app_id: parse_app_id(app_id)?,
        platform,
        body: body.to_vec(),
        credential,
    };

    let outcome = state.webhook_handler().handle(cmd).await?;

    Ok(Json(WebhookAckResponse::from(outcome)))
}

/// GET /health - Liveness probe
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

fn parse_app_id(raw: &str) -> Result<AppId, IapApiError> {
    AppId::from_str(raw)
        .map_err(|_| IapApiError(ReconcileError::Validation(format!("Invalid app id '{}'", raw))))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error wrapper that converts reconciliation errors to HTTP responses.
#[derive(Debug)]
pub struct IapApiError(pub ReconcileError);

impl From<ReconcileError> for IapApiError {
    fn from(err: ReconcileError) -> Self {
        Self(err)
    }
}

impl IntoResponse for IapApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.0.status_code();
        let message = match &self.0 {
            ReconcileError::Database(detail) => {
                tracing::error!(error = %detail, "Request failed on persistence");
                "Internal server error".to_string()
            }
            other => {
                if status.is_server_error() {
                    tracing::warn!(error = %other, status = status.as_u16(), "Request failed");
                }
                other.to_string()
            }
        };

        let body = ErrorResponse::new(self.0.error_code(), message);
        (status, Json(body)).into_response()
    }
}
