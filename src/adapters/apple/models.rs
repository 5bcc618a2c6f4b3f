//! App Store Server API and App Store Server Notifications v2 payloads.
//!
//! Timestamps are Unix milliseconds, as Apple sends them.

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::domain::foundation::Timestamp;
use crate::domain::subscription::{OfferType, StoreEnvironment, SubscriptionStatus};
use crate::ports::StoreError;

/// Webhook request body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBodyV2 {
    pub signed_payload: String,
}

/// Verified notification payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBodyV2DecodedPayload {
    pub notification_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(rename = "notificationUUID")]
    pub notification_uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<NotificationData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_date: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_apple_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_transaction_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_renewal_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AppleSubscriptionStatus>,
}

/// Apple `offerType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum AppleOfferType {
    Introductory = 1,
    Promotional = 2,
    OfferCode = 3,
    WinBack = 4,
}

impl From<AppleOfferType> for OfferType {
    fn from(value: AppleOfferType) -> Self {
        match value {
            AppleOfferType::Introductory => OfferType::Introductory,
            AppleOfferType::Promotional => OfferType::Promotional,
            AppleOfferType::OfferCode => OfferType::OfferCode,
            AppleOfferType::WinBack => OfferType::WinBack,
        }
    }
}

/// Apple `revocationReason`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum RevocationReason {
    Other = 0,
    AppIssue = 1,
}

impl RevocationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevocationReason::Other => "other",
            RevocationReason::AppIssue => "app_issue",
        }
    }
}

/// Apple subscription `status` in status responses and notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum AppleSubscriptionStatus {
    Active = 1,
    Expired = 2,
    BillingRetry = 3,
    BillingGracePeriod = 4,
    Revoked = 5,
}

impl From<AppleSubscriptionStatus> for SubscriptionStatus {
    fn from(value: AppleSubscriptionStatus) -> Self {
        match value {
            AppleSubscriptionStatus::Active => SubscriptionStatus::Active,
            AppleSubscriptionStatus::Expired => SubscriptionStatus::Expired,
            AppleSubscriptionStatus::BillingRetry => SubscriptionStatus::InBillingRetry,
            AppleSubscriptionStatus::BillingGracePeriod => SubscriptionStatus::InGracePeriod,
            AppleSubscriptionStatus::Revoked => SubscriptionStatus::Revoked,
        }
    }
}

/// Apple `autoRenewStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum AutoRenewStatus {
    Off = 0,
    On = 1,
}

/// Decoded `signedTransactionInfo`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JwsTransactionDecodedPayload {
    pub transaction_id: String,
    pub original_transaction_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_id: Option<String>,
    pub product_id: String,
    pub purchase_date: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_purchase_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_date: Option<i64>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub product_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer_type: Option<AppleOfferType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer_discount_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_reason: Option<RevocationReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_upgraded: Option<bool>,
}

/// Decoded `signedRenewalInfo`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JwsRenewalInfoDecodedPayload {
    pub original_transaction_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_renew_product_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_renew_status: Option<AutoRenewStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_intent: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_period_expires_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_in_billing_retry_period: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_increase_status: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_date: Option<i64>,
}

/// `GET /inApps/v1/subscriptions/{transactionId}` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub bundle_id: Option<String>,
    #[serde(default)]
    pub data: Vec<SubscriptionGroupIdentifierItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionGroupIdentifierItem {
    #[serde(default)]
    pub subscription_group_identifier: Option<String>,
    #[serde(default)]
    pub last_transactions: Vec<LastTransactionsItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastTransactionsItem {
    pub status: AppleSubscriptionStatus,
    pub original_transaction_id: String,
    pub signed_transaction_info: String,
    #[serde(default)]
    pub signed_renewal_info: Option<String>,
}

/// `GET /inApps/v1/transactions/{transactionId}` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInfoResponse {
    pub signed_transaction_info: String,
}

/// Maps Apple environment strings; anything but `Production` is sandbox.
pub fn parse_environment(value: Option<&str>) -> StoreEnvironment {
    match value {
        Some("Production") | None => StoreEnvironment::Production,
        Some(_) => StoreEnvironment::Sandbox,
    }
}

/// Converts Apple milliseconds, rejecting out-of-range values.
pub fn millis(value: i64, field: &str) -> Result<Timestamp, StoreError> {
    Timestamp::from_unix_millis(value)
        .ok_or_else(|| StoreError::MalformedPayload(format!("{} out of range: {}", field, value)))
}
