//! HTTP DTOs (Data Transfer Objects) for the receipt, entitlement and webhook endpoints.
//!
//! These types define the JSON request/response structure of the API.
//! All bodies use camelCase field names.

use serde::{Deserialize, Serialize};

use crate::application::handlers::{EntitlementSnapshot, ValidateReceiptResult, WebhookOutcome};
use crate::domain::entitlement::{EntitlementSource, SubscriberEntitlement};
use crate::domain::foundation::{SubscriberId, SubscriptionId, Timestamp};
use crate::domain::subscription::{Platform, StoreEnvironment, Subscription, SubscriptionStatus};

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Receipt submitted by a client app after a purchase or restore.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateReceiptRequest {
    pub app_user_id: String,
    pub platform: Platform,
    /// iOS signed transaction (JWS) or Android purchase JSON / purchase token.
    pub receipt_data: String,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    /// Android subscription product id.
    #[serde(default)]
    pub subscription_id: Option<String>,
}

/// Query string of the Google webhook. The token authenticates Pub/Sub push.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GoogleWebhookQuery {
    pub token: Option<String>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementResponse {
    pub identifier: String,
    /// Evaluated at the snapshot's `asOf`.
    pub is_active: bool,
    pub expires_at: Option<Timestamp>,
    pub source: EntitlementSource,
    /// Every source granting this entitlement is in billing retry.
    pub at_risk: bool,
    pub subscription_id: Option<SubscriptionId>,
}

impl EntitlementResponse {
    fn at(entitlement: SubscriberEntitlement, as_of: Timestamp) -> Self {
        Self {
            is_active: entitlement.is_active_at(as_of),
            identifier: entitlement.identifier,
            expires_at: entitlement.expires_at,
            source: entitlement.source,
            at_risk: entitlement.at_risk,
            subscription_id: entitlement.subscription_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub id: SubscriptionId,
    pub platform: Platform,
    /// Store product identifier.
    pub product_id: String,
    pub status: SubscriptionStatus,
    pub original_transaction_id: String,
    pub latest_transaction_id: String,
    pub purchase_date: Timestamp,
    pub expires_date: Option<Timestamp>,
    pub auto_renew_enabled: bool,
    pub is_trial_period: bool,
    pub is_in_intro_offer_period: bool,
    pub grace_period_expires_date: Option<Timestamp>,
    pub canceled_at: Option<Timestamp>,
    pub environment: StoreEnvironment,
}

impl From<Subscription> for SubscriptionResponse {
    fn from(s: Subscription) -> Self {
        Self {
            id: s.id,
            platform: s.platform,
            product_id: s.store_product_id,
            status: s.status,
            original_transaction_id: s.original_transaction_id,
            latest_transaction_id: s.latest_transaction_id,
            purchase_date: s.purchase_date,
            expires_date: s.expires_date,
            auto_renew_enabled: s.auto_renew_enabled,
            is_trial_period: s.is_trial_period,
            is_in_intro_offer_period: s.is_in_intro_offer_period,
            grace_period_expires_date: s.grace_period_expires_date,
            canceled_at: s.canceled_at,
            environment: s.environment,
        }
    }
}

/// Entitlements of one app user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementSnapshotResponse {
    pub app_user_id: String,
    pub subscriber_id: Option<SubscriberId>,
    pub entitlements: Vec<EntitlementResponse>,
    pub subscriptions: Vec<SubscriptionResponse>,
    pub as_of: Timestamp,
}

impl From<EntitlementSnapshot> for EntitlementSnapshotResponse {
    fn from(snapshot: EntitlementSnapshot) -> Self {
        let as_of = snapshot.as_of;
        Self {
            app_user_id: snapshot.app_user_id.as_str().to_string(),
            subscriber_id: snapshot.subscriber_id,
            entitlements: snapshot
                .entitlements
                .into_iter()
                .map(|e| EntitlementResponse::at(e, as_of))
                .collect(),
            subscriptions: snapshot
                .subscriptions
                .into_iter()
                .map(SubscriptionResponse::from)
                .collect(),
            as_of,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateReceiptResponse {
    #[serde(flatten)]
    pub snapshot: EntitlementSnapshotResponse,
    /// The receipt created a new subscription.
    pub created: bool,
    /// Subscriber the subscription was restored away from.
    pub transferred_from: Option<SubscriberId>,
}

impl From<ValidateReceiptResult> for ValidateReceiptResponse {
    fn from(result: ValidateReceiptResult) -> Self {
        Self {
            snapshot: result.snapshot.into(),
            created: result.created,
            transferred_from: result.previous_subscriber_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResyncResponse {
    pub subscription: SubscriptionResponse,
    pub entitlements: Vec<EntitlementResponse>,
}

impl ResyncResponse {
    pub fn new(
        subscription: Subscription,
        entitlements: Vec<SubscriberEntitlement>,
        as_of: Timestamp,
    ) -> Self {
        Self {
            subscription: subscription.into(),
            entitlements: entitlements
                .into_iter()
                .map(|e| EntitlementResponse::at(e, as_of))
                .collect(),
        }
    }
}

/// Acknowledgement returned to the stores.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAckResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl From<WebhookOutcome> for WebhookAckResponse {
    fn from(outcome: WebhookOutcome) -> Self {
        let (status, detail) = match outcome {
            WebhookOutcome::Processed { status, .. } => ("processed", Some(status.to_string())),
            WebhookOutcome::Duplicate => ("duplicate", None),
            WebhookOutcome::Ignored { reason } => ("ignored", Some(reason)),
            WebhookOutcome::SubscriptionNotFound => ("subscription_not_found", None),
            WebhookOutcome::Malformed { reason } => ("malformed", Some(reason)),
            WebhookOutcome::Failed { reason } => ("failed", Some(reason)),
        };
        Self { status, detail }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Response DTO
// ════════════════════════════════════════════════════════════════════════════════

/// Standard error response for API errors.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
        }
    }
}
