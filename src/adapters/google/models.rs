//! Google Play Developer API and Real-time Developer Notification payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;
use crate::domain::subscription::SubscriptionStatus;
use crate::ports::StoreError;

/// `purchases.subscriptionsv2` resource.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPurchaseV2 {
    #[serde(default)]
    pub region_code: Option<String>,
    #[serde(default)]
    pub line_items: Vec<SubscriptionPurchaseLineItem>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub subscription_state: Option<String>,
    #[serde(default)]
    pub latest_order_id: Option<String>,
    #[serde(default)]
    pub linked_purchase_token: Option<String>,
    #[serde(default)]
    pub acknowledgement_state: Option<String>,
    /// Present (as an empty object) for license-tester purchases.
    #[serde(default)]
    pub test_purchase: Option<serde_json::Value>,
    #[serde(default)]
    pub canceled_state_context: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPurchaseLineItem {
    pub product_id: String,
    #[serde(default)]
    pub expiry_time: Option<String>,
    #[serde(default)]
    pub auto_renewing_plan: Option<AutoRenewingPlan>,
    #[serde(default)]
    pub offer_details: Option<OfferDetails>,
    #[serde(default)]
    pub offer_phase: Option<OfferPhase>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoRenewingPlan {
    #[serde(default)]
    pub auto_renew_enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferDetails {
    #[serde(default)]
    pub base_plan_id: Option<String>,
    #[serde(default)]
    pub offer_id: Option<String>,
    #[serde(default)]
    pub offer_tags: Vec<String>,
}

/// Pricing phase of the current period. Exactly one member is set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferPhase {
    #[serde(default)]
    pub free_trial: Option<serde_json::Value>,
    #[serde(default)]
    pub introductory_price: Option<serde_json::Value>,
    #[serde(default)]
    pub base_price: Option<serde_json::Value>,
    #[serde(default)]
    pub proration_period: Option<serde_json::Value>,
}

/// Purchase JSON as returned to the app by Play Billing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientPurchase {
    pub purchase_token: String,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub package_name: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub purchase_time: Option<i64>,
    #[serde(default)]
    pub auto_renewing: Option<bool>,
}

/// Pub/Sub push request body.
#[derive(Debug, Clone, Deserialize)]
pub struct PubSubPushBody {
    pub message: PubSubMessage,
    #[serde(default)]
    pub subscription: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PubSubMessage {
    /// Base64 encoded `DeveloperNotification`.
    pub data: String,
    pub message_id: String,
    #[serde(default)]
    pub publish_time: Option<String>,
}

/// Real-time developer notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeveloperNotification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub package_name: String,
    /// Milliseconds since the epoch, sent as a string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_time_millis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_notification: Option<SubscriptionNotification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voided_purchase_notification: Option<VoidedPurchaseNotification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_time_product_notification: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_notification: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionNotification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub notification_type: i32,
    pub purchase_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoidedPurchaseNotification {
    pub purchase_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    /// 1 = subscription, 2 = one-time product.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_type: Option<i32>,
    /// 1 = full refund, 2 = quantity-based partial refund.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_type: Option<i32>,
}

/// Names of `SubscriptionNotification.notificationType` codes.
pub fn subscription_notification_name(code: i32) -> &'static str {
    match code {
        1 => "SUBSCRIPTION_RECOVERED",
        2 => "SUBSCRIPTION_RENEWED",
        3 => "SUBSCRIPTION_CANCELED",
        4 => "SUBSCRIPTION_PURCHASED",
        5 => "SUBSCRIPTION_ON_HOLD",
        6 => "SUBSCRIPTION_IN_GRACE_PERIOD",
        7 => "SUBSCRIPTION_RESTARTED",
        8 => "SUBSCRIPTION_PRICE_CHANGE_CONFIRMED",
        9 => "SUBSCRIPTION_DEFERRED",
        10 => "SUBSCRIPTION_PAUSED",
        11 => "SUBSCRIPTION_PAUSE_SCHEDULE_CHANGED",
        12 => "SUBSCRIPTION_REVOKED",
        13 => "SUBSCRIPTION_EXPIRED",
        17 => "SUBSCRIPTION_ITEMS_CHANGED",
        19 => "SUBSCRIPTION_PRICE_CHANGE_UPDATED",
        20 => "SUBSCRIPTION_PENDING_PURCHASE_CANCELED",
        _ => "SUBSCRIPTION_UNKNOWN",
    }
}

/// Maps `subscriptionState` to a reconciled status.
pub fn status_from_state(state: Option<&str>) -> SubscriptionStatus {
    match state {
        Some("SUBSCRIPTION_STATE_ACTIVE") | Some("SUBSCRIPTION_STATE_CANCELED") => {
            SubscriptionStatus::Active
        }
        Some("SUBSCRIPTION_STATE_IN_GRACE_PERIOD") => SubscriptionStatus::InGracePeriod,
        Some("SUBSCRIPTION_STATE_ON_HOLD") => SubscriptionStatus::InBillingRetry,
        _ => SubscriptionStatus::Expired,
    }
}

/// Parses an RFC 3339 timestamp as sent by the Developer API.
pub fn rfc3339(value: &str, field: &str) -> Result<Timestamp, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| Timestamp::from_datetime(dt.with_timezone(&Utc)))
        .map_err(|e| StoreError::MalformedPayload(format!("Invalid {}: {}", field, e)))
}

/// Parses the string-encoded milliseconds used in notifications.
pub fn string_millis(value: &str, field: &str) -> Result<Timestamp, StoreError> {
    value
        .parse::<i64>()
        .ok()
        .and_then(Timestamp::from_unix_millis)
        .ok_or_else(|| StoreError::MalformedPayload(format!("Invalid {}: {}", field, value)))
}
