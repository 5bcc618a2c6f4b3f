//! Real-time developer notification normalization.
//!
//! Play delivers notifications through a Cloud Pub/Sub push subscription.
//! The push endpoint is authenticated with a shared token in the query
//! string; the notification itself only names the purchase token, so the
//! current subscription state is always re-fetched from the Developer API.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::domain::catalog::App;
use crate::domain::foundation::Timestamp;
use crate::domain::subscription::{CanonicalEvent, Platform, SubscriptionFact};
use crate::ports::{DecodedNotification, NotificationNormalizer, StoreAdapter, StoreError};

use super::models::{
    string_millis, subscription_notification_name, DeveloperNotification, PubSubPushBody,
};

pub struct GoogleNotificationNormalizer {
    adapter: Arc<dyn StoreAdapter>,
    push_token: Option<SecretString>,
}

impl GoogleNotificationNormalizer {
    /// `push_token` is the shared secret configured on the Pub/Sub push
    /// endpoint. Without one every push is accepted.
    pub fn new(adapter: Arc<dyn StoreAdapter>, push_token: Option<SecretString>) -> Self {
        if push_token.is_none() {
            tracing::warn!("Google push endpoint has no verification token configured");
        }
        Self {
            adapter,
            push_token,
        }
    }

    fn authenticate(&self, credential: Option<&str>) -> Result<(), StoreError> {
        let Some(expected) = self.push_token.as_ref() else {
            return Ok(());
        };
        let provided = credential.unwrap_or_default();
        if bool::from(
            provided
                .as_bytes()
                .ct_eq(expected.expose_secret().as_bytes()),
        ) {
            Ok(())
        } else {
            Err(StoreError::InvalidSignature(
                "push token mismatch".to_string(),
            ))
        }
    }
}

/// Maps a subscription notification code to a canonical event.
fn canonical_event(code: i32) -> Option<CanonicalEvent> {
    let event = match code {
        // RECOVERED, RENEWED, DEFERRED
        1 | 2 | 9 => CanonicalEvent::Renewed,
        3 => CanonicalEvent::RenewalStatusChanged {
            auto_renew_enabled: false,
        },
        4 => CanonicalEvent::Activated,
        5 => CanonicalEvent::EnteredBillingRetry,
        6 => CanonicalEvent::EnteredGracePeriod {
            grace_period_expires_at: None,
        },
        7 => CanonicalEvent::RenewalStatusChanged {
            auto_renew_enabled: true,
        },
        // PAUSED, EXPIRED
        10 | 13 => CanonicalEvent::Expired,
        12 => CanonicalEvent::Revoked { reason: None },
        _ => return None,
    };
    Some(event)
}

/// Events that can be applied without the store's transaction data.
fn applies_without_transaction(event: &CanonicalEvent) -> bool {
    matches!(
        event,
        CanonicalEvent::Expired | CanonicalEvent::Revoked { .. } | CanonicalEvent::Refunded
    )
}

#[async_trait]
impl NotificationNormalizer for GoogleNotificationNormalizer {
    fn platform(&self) -> Platform {
        Platform::Android
    }

    fn decode(
        &self,
        body: &[u8],
        credential: Option<&str>,
    ) -> Result<DecodedNotification, StoreError> {
        self.authenticate(credential)?;

        let push: PubSubPushBody = serde_json::from_slice(body)
            .map_err(|e| StoreError::MalformedPayload(format!("Invalid Pub/Sub body: {}", e)))?;
        let data = STANDARD
            .decode(push.message.data.trim())
            .map_err(|e| StoreError::MalformedPayload(format!("Invalid message data: {}", e)))?;
        let notification: DeveloperNotification = serde_json::from_slice(&data).map_err(|e| {
            StoreError::MalformedPayload(format!("Invalid developer notification: {}", e))
        })?;

        let event_type = if let Some(sub) = &notification.subscription_notification {
            subscription_notification_name(sub.notification_type).to_string()
        } else if notification.voided_purchase_notification.is_some() {
            "VOIDED_PURCHASE".to_string()
        } else if notification.one_time_product_notification.is_some() {
            "ONE_TIME_PRODUCT".to_string()
        } else {
            "TEST".to_string()
        };
        let signed_at = notification
            .event_time_millis
            .as_deref()
            .map(|v| string_millis(v, "eventTimeMillis"))
            .transpose()?;
        let payload = serde_json::to_value(&notification)
            .map_err(|e| StoreError::MalformedPayload(e.to_string()))?;

        Ok(DecodedNotification {
            platform: Platform::Android,
            provider_event_id: push.message.message_id,
            event_type,
            app_identifier: Some(notification.package_name),
            environment: None,
            payload,
            signed_at,
        })
    }

    async fn normalize(
        &self,
        app: &App,
        notification: &DecodedNotification,
    ) -> Result<Option<SubscriptionFact>, StoreError> {
        let developer: DeveloperNotification = serde_json::from_value(notification.payload.clone())
            .map_err(|e| StoreError::MalformedPayload(e.to_string()))?;

        let (purchase_token, event) = if let Some(sub) = developer.subscription_notification {
            match canonical_event(sub.notification_type) {
                Some(event) => (sub.purchase_token, event),
                None => {
                    tracing::debug!(
                        notification_type = sub.notification_type,
                        "Play notification does not affect subscription state"
                    );
                    return Ok(None);
                }
            }
        } else if let Some(voided) = developer.voided_purchase_notification {
            (voided.purchase_token, CanonicalEvent::Refunded)
        } else {
            return Ok(None);
        };

        let occurred_at = notification.signed_at.unwrap_or_else(Timestamp::now);

        let transaction = match self
            .adapter
            .fetch_latest_transaction_info(app, &purchase_token)
            .await
        {
            Ok(tx) => tx,
            Err(err) if !err.is_transient() && applies_without_transaction(&event) => {
                tracing::warn!(
                    error = %err,
                    event = event.name(),
                    "Applying Play notification without store transaction data"
                );
                return Ok(Some(SubscriptionFact::without_transaction(
                    purchase_token,
                    event,
                    occurred_at,
                )));
            }
            Err(err) => return Err(err),
        };

        let event = match event {
            CanonicalEvent::EnteredGracePeriod { .. } => CanonicalEvent::EnteredGracePeriod {
                grace_period_expires_at: transaction.expires_date,
            },
            other => other,
        };

        Ok(Some(SubscriptionFact::from_transaction(
            event,
            transaction,
            None,
            occurred_at,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::FakeStoreAdapter;
    use crate::domain::foundation::AppId;
    use crate::domain::subscription::{StoreEnvironment, StoreTransaction};
    use serde_json::{json, Value};

    const TOKEN: &str = "push-secret";

    fn app() -> App {
        App {
            id: AppId::new(),
            name: "Example".to_string(),
            bundle_id: None,
            package_name: Some("com.example.app".to_string()),
        }
    }

    fn transaction(token: &str) -> StoreTransaction {
        StoreTransaction {
            platform: Platform::Android,
            transaction_id: "GPA.1".to_string(),
            original_transaction_id: token.to_string(),
            product_id: "pro.monthly".to_string(),
            app_identifier: Some("com.example.app".to_string()),
            purchase_date: Timestamp::now(),
            expires_date: Some(Timestamp::now().plus_days(30)),
            is_trial_period: false,
            is_in_intro_offer_period: false,
            offer_type: None,
            environment: StoreEnvironment::Production,
            revocation_date: None,
            revocation_reason: None,
            auto_renew_enabled: Some(true),
            linked_original_transaction_id: None,
        }
    }

    fn setup() -> (Arc<FakeStoreAdapter>, GoogleNotificationNormalizer) {
        let store = Arc::new(FakeStoreAdapter::new(Platform::Android));
        let normalizer = GoogleNotificationNormalizer::new(
            store.clone(),
            Some(SecretString::new(TOKEN.to_string())),
        );
        (store, normalizer)
    }

    fn push(notification: Value) -> Vec<u8> {
        json!({
            "message": {
                "data": STANDARD.encode(notification.to_string()),
                "messageId": "136969346945",
                "publishTime": "2024-01-01T00:00:00Z"
            },
            "subscription": "projects/example/subscriptions/play-rtdn"
        })
        .to_string()
        .into_bytes()
    }

    fn subscription_push(code: i32, token: &str) -> Vec<u8> {
        push(json!({
            "version": "1.0",
            "packageName": "com.example.app",
            "eventTimeMillis": "1704067200000",
            "subscriptionNotification": {
                "version": "1.0",
                "notificationType": code,
                "purchaseToken": token,
                "subscriptionId": "pro.monthly"
            }
        }))
    }

    #[test]
    fn decode_uses_message_id_as_ledger_identity() {
        let (_, normalizer) = setup();
        let decoded = normalizer
            .decode(&subscription_push(2, "tok-1"), Some(TOKEN))
            .unwrap();
        assert_eq!(decoded.provider_event_id, "136969346945");
        assert_eq!(decoded.event_type, "SUBSCRIPTION_RENEWED");
        assert_eq!(decoded.app_identifier.as_deref(), Some("com.example.app"));
        assert_eq!(decoded.signed_at.unwrap().as_unix_secs(), 1_704_067_200);
    }

    #[test]
    fn wrong_or_missing_push_token_is_rejected() {
        let (_, normalizer) = setup();
        let body = subscription_push(2, "tok-1");
        assert!(matches!(
            normalizer.decode(&body, Some("guess")),
            Err(StoreError::InvalidSignature(_))
        ));
        assert!(matches!(
            normalizer.decode(&body, None),
            Err(StoreError::InvalidSignature(_))
        ));
    }

    #[test]
    fn garbled_message_data_is_malformed() {
        let (_, normalizer) = setup();
        let body = json!({"message": {"data": "%%%", "messageId": "1"}})
            .to_string()
            .into_bytes();
        assert!(matches!(
            normalizer.decode(&body, Some(TOKEN)),
            Err(StoreError::MalformedPayload(_))
        ));
    }

    #[tokio::test]
    async fn renewal_refetches_subscription() {
        let (store, normalizer) = setup();
        store.set_latest(transaction("tok-1"));

        let decoded = normalizer
            .decode(&subscription_push(2, "tok-1"), Some(TOKEN))
            .unwrap();
        let fact = normalizer.normalize(&app(), &decoded).await.unwrap().unwrap();

        assert_eq!(fact.event, CanonicalEvent::Renewed);
        assert_eq!(fact.original_transaction_id, "tok-1");
        assert!(fact.transaction.is_some());
        assert_eq!(store.fetch_count(), 1);
    }

    #[tokio::test]
    async fn grace_period_uses_fetched_expiry() {
        let (store, normalizer) = setup();
        let tx = transaction("tok-1");
        let expiry = tx.expires_date;
        store.set_latest(tx);

        let decoded = normalizer
            .decode(&subscription_push(6, "tok-1"), Some(TOKEN))
            .unwrap();
        let fact = normalizer.normalize(&app(), &decoded).await.unwrap().unwrap();

        assert_eq!(
            fact.event,
            CanonicalEvent::EnteredGracePeriod {
                grace_period_expires_at: expiry
            }
        );
    }

    #[tokio::test]
    async fn cancel_and_restart_toggle_auto_renew() {
        let (store, normalizer) = setup();
        store.set_latest(transaction("tok-1"));

        for (code, enabled) in [(3, false), (7, true)] {
            let decoded = normalizer
                .decode(&subscription_push(code, "tok-1"), Some(TOKEN))
                .unwrap();
            let fact = normalizer.normalize(&app(), &decoded).await.unwrap().unwrap();
            assert_eq!(
                fact.event,
                CanonicalEvent::RenewalStatusChanged {
                    auto_renew_enabled: enabled
                }
            );
        }
    }

    #[tokio::test]
    async fn voided_purchase_is_a_refund() {
        let (store, normalizer) = setup();
        store.set_latest(transaction("tok-1"));

        let decoded = normalizer
            .decode(
                &push(json!({
                    "packageName": "com.example.app",
                    "eventTimeMillis": "1704067200000",
                    "voidedPurchaseNotification": {
                        "purchaseToken": "tok-1",
                        "orderId": "GPA.1",
                        "productType": 1,
                        "refundType": 1
                    }
                })),
                Some(TOKEN),
            )
            .unwrap();
        assert_eq!(decoded.event_type, "VOIDED_PURCHASE");

        let fact = normalizer.normalize(&app(), &decoded).await.unwrap().unwrap();
        assert_eq!(fact.event, CanonicalEvent::Refunded);
    }

    #[tokio::test]
    async fn expiry_applies_when_store_no_longer_knows_token() {
        let (_, normalizer) = setup();

        let decoded = normalizer
            .decode(&subscription_push(13, "gone"), Some(TOKEN))
            .unwrap();
        let fact = normalizer.normalize(&app(), &decoded).await.unwrap().unwrap();

        assert_eq!(fact.event, CanonicalEvent::Expired);
        assert!(fact.transaction.is_none());
        assert_eq!(fact.original_transaction_id, "gone");
    }

    #[tokio::test]
    async fn transient_fetch_failure_propagates() {
        let (store, normalizer) = setup();
        store.fail_with(Some(StoreError::Api {
            status_code: 503,
            body: "unavailable".to_string(),
        }));

        let decoded = normalizer
            .decode(&subscription_push(13, "tok-1"), Some(TOKEN))
            .unwrap();
        let err = normalizer.normalize(&app(), &decoded).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn renewal_without_store_data_fails_permanently() {
        let (_, normalizer) = setup();
        let decoded = normalizer
            .decode(&subscription_push(2, "unknown"), Some(TOKEN))
            .unwrap();
        let err = normalizer.normalize(&app(), &decoded).await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_and_price_notifications_are_ignored() {
        let (_, normalizer) = setup();

        let decoded = normalizer
            .decode(
                &push(json!({
                    "version": "1.0",
                    "packageName": "com.example.app",
                    "testNotification": {"version": "1.0"}
                })),
                Some(TOKEN),
            )
            .unwrap();
        assert_eq!(decoded.event_type, "TEST");
        assert!(normalizer.normalize(&app(), &decoded).await.unwrap().is_none());

        let decoded = normalizer
            .decode(&subscription_push(19, "tok-1"), Some(TOKEN))
            .unwrap();
        assert!(normalizer.normalize(&app(), &decoded).await.unwrap().is_none());
    }
}
