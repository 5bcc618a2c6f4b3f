//! App Store Server Notifications v2 normalization.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::catalog::App;
use crate::domain::foundation::Timestamp;
use crate::domain::subscription::{CanonicalEvent, Platform, SubscriptionFact};
use crate::ports::{DecodedNotification, NotificationNormalizer, StoreError};

use super::models::{millis, parse_environment, ResponseBodyV2, ResponseBodyV2DecodedPayload};
use super::store_adapter::AppleStoreAdapter;

pub struct AppleNotificationNormalizer {
    adapter: Arc<AppleStoreAdapter>,
}

impl AppleNotificationNormalizer {
    pub fn new(adapter: Arc<AppleStoreAdapter>) -> Self {
        Self { adapter }
    }
}

/// Maps a notification type and subtype to a canonical event.
///
/// `grace_period_expires_at` comes from the accompanying renewal info.
fn canonical_event(
    notification_type: &str,
    subtype: Option<&str>,
    grace_period_expires_at: Option<Timestamp>,
) -> Option<CanonicalEvent> {
    let event = match notification_type {
        "SUBSCRIBED" => CanonicalEvent::Activated,
        "DID_RENEW" | "RENEWAL_EXTENDED" => CanonicalEvent::Renewed,
        "DID_CHANGE_RENEWAL_STATUS" => CanonicalEvent::RenewalStatusChanged {
            auto_renew_enabled: subtype != Some("AUTO_RENEW_DISABLED"),
        },
        "DID_FAIL_TO_RENEW" if subtype == Some("GRACE_PERIOD") => {
            CanonicalEvent::EnteredGracePeriod {
                grace_period_expires_at,
            }
        }
        "DID_FAIL_TO_RENEW" => CanonicalEvent::EnteredBillingRetry,
        "GRACE_PERIOD_EXPIRED" => CanonicalEvent::GracePeriodExpired,
        "EXPIRED" => CanonicalEvent::Expired,
        "REFUND" => CanonicalEvent::Refunded,
        "REVOKE" => CanonicalEvent::Revoked {
            reason: subtype.map(str::to_string),
        },
        "OFFER_REDEEMED" => CanonicalEvent::OfferRedeemed,
        _ => return None,
    };
    Some(event)
}

#[async_trait]
impl NotificationNormalizer for AppleNotificationNormalizer {
    fn platform(&self) -> Platform {
        Platform::Ios
    }

    fn decode(
        &self,
        body: &[u8],
        _credential: Option<&str>,
    ) -> Result<DecodedNotification, StoreError> {
        let envelope: ResponseBodyV2 = serde_json::from_slice(body)
            .map_err(|e| StoreError::MalformedPayload(format!("Invalid notification body: {}", e)))?;

        let decoded: ResponseBodyV2DecodedPayload =
            self.adapter.verifier().verify(&envelope.signed_payload)?;

        let event_type = match decoded.subtype.as_deref() {
            Some(subtype) => format!("{}/{}", decoded.notification_type, subtype),
            None => decoded.notification_type.clone(),
        };
        let data = decoded.data.as_ref();
        let signed_at = decoded
            .signed_date
            .map(|v| millis(v, "signedDate"))
            .transpose()?;
        let payload = serde_json::to_value(&decoded)
            .map_err(|e| StoreError::MalformedPayload(e.to_string()))?;

        Ok(DecodedNotification {
            platform: Platform::Ios,
            provider_event_id: decoded.notification_uuid.clone(),
            event_type,
            app_identifier: data.and_then(|d| d.bundle_id.clone()),
            environment: data
                .and_then(|d| d.environment.as_deref())
                .map(|env| parse_environment(Some(env))),
            payload,
            signed_at,
        })
    }

    async fn normalize(
        &self,
        _app: &App,
        notification: &DecodedNotification,
    ) -> Result<Option<SubscriptionFact>, StoreError> {
        let decoded: ResponseBodyV2DecodedPayload =
            serde_json::from_value(notification.payload.clone())
                .map_err(|e| StoreError::MalformedPayload(e.to_string()))?;

        if decoded.notification_type == "TEST" {
            return Ok(None);
        }

        let data = decoded.data.unwrap_or_default();
        let renewal = data
            .signed_renewal_info
            .as_deref()
            .map(|jws| self.adapter.decode_signed_renewal(jws))
            .transpose()?;

        let Some(event) = canonical_event(
            &decoded.notification_type,
            decoded.subtype.as_deref(),
            renewal.as_ref().and_then(|r| r.grace_period_expires_date),
        ) else {
            tracing::debug!(
                notification_type = %decoded.notification_type,
                "App Store notification does not affect subscription state"
            );
            return Ok(None);
        };

        let signed_transaction = data.signed_transaction_info.as_deref().ok_or_else(|| {
            StoreError::MalformedPayload(format!(
                "{} notification without signedTransactionInfo",
                decoded.notification_type
            ))
        })?;
        let transaction = self.adapter.decode_signed_transaction(signed_transaction)?;
        let occurred_at = notification.signed_at.unwrap_or_else(Timestamp::now);

        Ok(Some(SubscriptionFact::from_transaction(
            event,
            transaction,
            renewal,
            occurred_at,
        )))
    }
}
