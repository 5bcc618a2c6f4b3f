//! HandleStoreWebhookHandler - Command handler for App Store and Play notifications.
//!
//! Processing order:
//!
//! 1. authenticate and decode the body (no ledger row for unauthenticated input)
//! 2. claim the ledger row for `(platform, provider_event_id)`
//! 3. normalize to a canonical fact and reconcile
//! 4. mark the row processed, or release it on a retryable failure
//!
//! The returned outcome is what the HTTP layer acknowledges. An `Err` means
//! the store must redeliver.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::catalog::App;
use crate::domain::foundation::{AppId, SubscriptionId, Timestamp};
use crate::domain::subscription::{Platform, ReconcileError, SubscriptionStatus};
use crate::ports::{
    AppRegistry, ClaimOutcome, DecodedNotification, NewWebhookEvent, NotificationNormalizer,
    ProcessingResult, StoreError, WebhookEventRepository,
};

use crate::application::handlers::subscription::SubscriptionReconciler;

/// Command carrying one raw webhook delivery.
#[derive(Debug, Clone)]
pub struct HandleStoreWebhookCommand {
    pub app_id: AppId,
    pub platform: Platform,
    pub body: Vec<u8>,
    /// Push credential sent alongside the body (Pub/Sub push token).
    pub credential: Option<String>,
}

/// How a delivery was acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    /// A subscription was reconciled.
    Processed {
        subscription_id: SubscriptionId,
        status: SubscriptionStatus,
    },
    /// The event was already processed by an earlier delivery.
    Duplicate,
    /// Nothing to do for this notification.
    Ignored { reason: String },
    /// The notification references a subscription this service never saw.
    SubscriptionNotFound,
    /// The body could not be parsed. Redelivery would not help.
    Malformed { reason: String },
    /// Terminal processing failure, recorded on the ledger.
    Failed { reason: String },
}

impl WebhookOutcome {
    fn ledger_result(&self) -> (ProcessingResult, Option<String>) {
        match self {
            WebhookOutcome::Processed { .. } => (ProcessingResult::Success, None),
            WebhookOutcome::Failed { reason } => (ProcessingResult::Failed, Some(reason.clone())),
            WebhookOutcome::SubscriptionNotFound => (
                ProcessingResult::Ignored,
                Some("subscription not found".to_string()),
            ),
            WebhookOutcome::Ignored { reason } | WebhookOutcome::Malformed { reason } => {
                (ProcessingResult::Ignored, Some(reason.clone()))
            }
            WebhookOutcome::Duplicate => (ProcessingResult::Ignored, None),
        }
    }
}

pub struct HandleStoreWebhookHandler {
    apps: Arc<dyn AppRegistry>,
    normalizers: HashMap<Platform, Arc<dyn NotificationNormalizer>>,
    ledger: Arc<dyn WebhookEventRepository>,
    reconciler: Arc<SubscriptionReconciler>,
    lease: Duration,
}

impl HandleStoreWebhookHandler {
    pub fn new(
        apps: Arc<dyn AppRegistry>,
        normalizers: Vec<Arc<dyn NotificationNormalizer>>,
        ledger: Arc<dyn WebhookEventRepository>,
        reconciler: Arc<SubscriptionReconciler>,
        lease: Duration,
    ) -> Self {
        Self {
            apps,
            normalizers: normalizers
                .into_iter()
                .map(|n| (n.platform(), n))
                .collect(),
            ledger,
            reconciler,
            lease,
        }
    }

    pub async fn handle(
        &self,
        cmd: HandleStoreWebhookCommand,
    ) -> Result<WebhookOutcome, ReconcileError> {
        let app = self
            .apps
            .find_by_id(&cmd.app_id)
            .await?
            .ok_or(ReconcileError::AppNotFound(cmd.app_id))?;
        let normalizer = self.normalizers.get(&cmd.platform).ok_or_else(|| {
            ReconcileError::from(StoreError::NotConfigured(format!(
                "no notification normalizer for {}",
                cmd.platform
            )))
        })?;

        let notification = match normalizer.decode(&cmd.body, cmd.credential.as_deref()) {
            Ok(notification) => notification,
            Err(StoreError::MalformedPayload(reason)) => {
                tracing::warn!(
                    app_id = %app.id,
                    platform = %cmd.platform,
                    reason = %reason,
                    "Acknowledging malformed store notification"
                );
                return Ok(WebhookOutcome::Malformed { reason });
            }
            Err(StoreError::InvalidSignature(reason)) => {
                tracing::warn!(
                    app_id = %app.id,
                    platform = %cmd.platform,
                    reason = %reason,
                    "Rejected store notification with invalid signature"
                );
                return Err(ReconcileError::InvalidSignature(reason));
            }
            Err(err) => return Err(err.into()),
        };

        if !app.matches_store_identifier(cmd.platform, notification.app_identifier.as_deref()) {
            tracing::warn!(
                app_id = %app.id,
                provider_event_id = %notification.provider_event_id,
                reported = notification.app_identifier.as_deref().unwrap_or_default(),
                "Store notification is for a different app"
            );
            return Ok(WebhookOutcome::Ignored {
                reason: "notification is for a different app".to_string(),
            });
        }

        let claim = self
            .ledger
            .claim(
                NewWebhookEvent {
                    app_id: app.id,
                    platform: cmd.platform,
                    provider_event_id: notification.provider_event_id.clone(),
                    event_type: notification.event_type.clone(),
                    payload: notification.payload.clone(),
                    received_at: Timestamp::now(),
                },
                self.lease,
            )
            .await?;
        match claim {
            ClaimOutcome::Claimed => {}
            ClaimOutcome::AlreadyProcessed => {
                tracing::debug!(
                    provider_event_id = %notification.provider_event_id,
                    "Duplicate store notification"
                );
                return Ok(WebhookOutcome::Duplicate);
            }
            ClaimOutcome::InProgress => {
                return Err(ReconcileError::EventInProgress(
                    notification.provider_event_id.clone(),
                ))
            }
        }

        let processed = self
            .process(&app, normalizer.as_ref(), &notification)
            .await;
        self.settle(&notification, processed).await
    }

    async fn process(
        &self,
        app: &App,
        normalizer: &dyn NotificationNormalizer,
        notification: &DecodedNotification,
    ) -> Result<WebhookOutcome, ReconcileError> {
        let fact = match normalizer.normalize(app, notification).await {
            Ok(Some(fact)) => fact,
            Ok(None) => {
                return Ok(WebhookOutcome::Ignored {
                    reason: format!("no state change for {}", notification.event_type),
                })
            }
            Err(err @ StoreError::InvalidSignature(_)) => return Err(err.into()),
            Err(err) if err.is_transient() || matches!(err, StoreError::NotConfigured(_)) => {
                return Err(err.into())
            }
            Err(err) => {
                return Ok(WebhookOutcome::Failed {
                    reason: err.to_string(),
                })
            }
        };

        tracing::info!(
            provider_event_id = %notification.provider_event_id,
            event_type = %notification.event_type,
            event = fact.event.name(),
            original_transaction_id = %fact.original_transaction_id,
            "Reconciling store notification"
        );

        match self.reconciler.apply_event(notification.platform, fact).await {
            Ok(result) => Ok(WebhookOutcome::Processed {
                subscription_id: result.subscription.id,
                status: result.subscription.status,
            }),
            Err(ReconcileError::SubscriptionNotFound(key)) => {
                tracing::info!(
                    subscription_key = %key,
                    "Store notification for unknown subscription"
                );
                Ok(WebhookOutcome::SubscriptionNotFound)
            }
            Err(err) => Err(err),
        }
    }

    /// Records the processing result on the claimed ledger row.
    async fn settle(
        &self,
        notification: &DecodedNotification,
        processed: Result<WebhookOutcome, ReconcileError>,
    ) -> Result<WebhookOutcome, ReconcileError> {
        let platform = notification.platform;
        let event_id = notification.provider_event_id.as_str();
        match processed {
            Ok(outcome) => {
                let (result, message) = outcome.ledger_result();
                self.ledger
                    .mark_processed(platform, event_id, result, message)
                    .await?;
                Ok(outcome)
            }
            Err(ReconcileError::InvalidSignature(reason)) => {
                tracing::warn!(
                    provider_event_id = event_id,
                    reason = %reason,
                    "Store payload inside notification failed verification"
                );
                self.ledger
                    .mark_processed(platform, event_id, ProcessingResult::Failed, Some(reason.clone()))
                    .await?;
                Err(ReconcileError::InvalidSignature(reason))
            }
            Err(err) => {
                tracing::warn!(
                    provider_event_id = event_id,
                    error = %err,
                    retryable = err.is_retryable(),
                    "Store notification processing failed; releasing for redelivery"
                );
                if let Err(release_err) = self.ledger.release(platform, event_id, &err.to_string()).await
                {
                    tracing::error!(
                        provider_event_id = event_id,
                        error = %release_err,
                        "Failed to release webhook claim"
                    );
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::FakeNotificationNormalizer;
    use crate::application::handlers::test_support::{ios_fact, Harness, BUNDLE_ID};
    use crate::domain::subscription::{CanonicalEvent, StoreEnvironment, SubscriptionFact};

    struct Fixture {
        h: Harness,
        apple: Arc<FakeNotificationNormalizer>,
        handler: HandleStoreWebhookHandler,
    }

    impl Fixture {
        fn new() -> Self {
            let h = Harness::new();
            let apple = Arc::new(FakeNotificationNormalizer::new(Platform::Ios));
            let handler = HandleStoreWebhookHandler::new(
                h.catalog.clone(),
                vec![apple.clone() as Arc<dyn NotificationNormalizer>],
                h.ledger.clone(),
                h.reconciler(),
                Duration::from_secs(60),
            );
            Self { h, apple, handler }
        }

        fn script(&self, body: &str, event_id: &str, fact: Option<SubscriptionFact>) {
            self.apple.add(body, notification(event_id, BUNDLE_ID), fact);
        }

        async fn deliver(&self, body: &str) -> Result<WebhookOutcome, ReconcileError> {
            self.handler
                .handle(HandleStoreWebhookCommand {
                    app_id: self.h.app.id,
                    platform: Platform::Ios,
                    body: body.as_bytes().to_vec(),
                    credential: None,
                })
                .await
        }

        async fn ledger_result(&self, event_id: &str) -> Option<ProcessingResult> {
            self.h
                .ledger
                .find(Platform::Ios, event_id)
                .await
                .unwrap()
                .and_then(|row| row.result)
        }
    }

    fn notification(event_id: &str, bundle_id: &str) -> DecodedNotification {
        DecodedNotification {
            platform: Platform::Ios,
            provider_event_id: event_id.to_string(),
            event_type: "DID_RENEW".to_string(),
            app_identifier: Some(bundle_id.to_string()),
            environment: Some(StoreEnvironment::Production),
            payload: serde_json::json!({ "notificationUUID": event_id }),
            signed_at: None,
        }
    }

    async fn seeded() -> Fixture {
        let f = Fixture::new();
        let subscriber = f.h.subscriber("user-1").await;
        f.h.seed_subscription(&subscriber.id, "1000", SubscriptionStatus::Active, Some(2))
            .await;
        f
    }

    // ══════════════════════════════════════════════════════════════
    // Processing
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn renewal_is_reconciled_and_recorded() {
        let f = seeded().await;
        f.script("renew", "evt-1", Some(ios_fact("1000", "1001", CanonicalEvent::Renewed, 30)));

        let outcome = f.deliver("renew").await.unwrap();

        assert!(matches!(
            outcome,
            WebhookOutcome::Processed { status: SubscriptionStatus::Active, .. }
        ));
        assert_eq!(f.ledger_result("evt-1").await, Some(ProcessingResult::Success));
        assert_eq!(f.h.publisher.event_count(), 1);
    }

    #[tokio::test]
    async fn redelivery_is_acknowledged_without_effect() {
        let f = seeded().await;
        f.script("renew", "evt-1", Some(ios_fact("1000", "1001", CanonicalEvent::Renewed, 30)));
        f.deliver("renew").await.unwrap();

        let outcome = f.deliver("renew").await.unwrap();

        assert_eq!(outcome, WebhookOutcome::Duplicate);
        assert_eq!(f.apple.normalize_calls(), 1);
        assert_eq!(f.h.publisher.event_count(), 1);
        assert_eq!(f.h.ledger.count(), 1);
    }

    #[tokio::test]
    async fn unknown_subscription_is_ignored() {
        let f = Fixture::new();
        f.script("renew", "evt-1", Some(ios_fact("9999", "9999", CanonicalEvent::Renewed, 30)));

        let outcome = f.deliver("renew").await.unwrap();

        assert_eq!(outcome, WebhookOutcome::SubscriptionNotFound);
        assert_eq!(f.ledger_result("evt-1").await, Some(ProcessingResult::Ignored));
        assert!(f.h.subscriptions.all().is_empty());
    }

    #[tokio::test]
    async fn unmapped_notification_is_ignored() {
        let f = seeded().await;
        f.script("test", "evt-1", None);

        let outcome = f.deliver("test").await.unwrap();

        assert!(matches!(outcome, WebhookOutcome::Ignored { .. }));
        assert_eq!(f.ledger_result("evt-1").await, Some(ProcessingResult::Ignored));
    }

    // ══════════════════════════════════════════════════════════════
    // Rejections and failures
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn malformed_body_is_acknowledged_without_ledger_row() {
        let f = Fixture::new();

        let outcome = f.deliver("not json").await.unwrap();

        assert!(matches!(outcome, WebhookOutcome::Malformed { .. }));
        assert_eq!(f.h.ledger.count(), 0);
    }

    #[tokio::test]
    async fn invalid_signature_is_rejected_without_ledger_row() {
        let f = Fixture::new();
        f.apple.reject("forged");

        let err = f.deliver("forged").await.unwrap_err();

        assert!(matches!(err, ReconcileError::InvalidSignature(_)));
        assert_eq!(f.h.ledger.count(), 0);
    }

    #[tokio::test]
    async fn foreign_bundle_is_ignored_before_claim() {
        let f = seeded().await;
        f.apple.add(
            "other",
            notification("evt-1", "com.other.app"),
            Some(ios_fact("1000", "1001", CanonicalEvent::Renewed, 30)),
        );

        let outcome = f.deliver("other").await.unwrap();

        assert!(matches!(outcome, WebhookOutcome::Ignored { .. }));
        assert_eq!(f.h.ledger.count(), 0);
        assert_eq!(f.h.publisher.event_count(), 0);
    }

    #[tokio::test]
    async fn transient_failure_releases_claim_for_redelivery() {
        let f = seeded().await;
        f.script("renew", "evt-1", Some(ios_fact("1000", "1001", CanonicalEvent::Renewed, 30)));
        f.apple.fail_with(Some(StoreError::Api {
            status_code: 503,
            body: "unavailable".to_string(),
        }));

        let err = f.deliver("renew").await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(f.ledger_result("evt-1").await, None);

        f.apple.fail_with(None);
        let outcome = f.deliver("renew").await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Processed { .. }));
    }

    #[tokio::test]
    async fn permanent_store_failure_is_recorded_as_failed() {
        let f = seeded().await;
        f.script("renew", "evt-1", Some(ios_fact("1000", "1001", CanonicalEvent::Renewed, 30)));
        f.apple.fail_with(Some(StoreError::MalformedPayload("bad transaction".to_string())));

        let outcome = f.deliver("renew").await.unwrap();

        assert!(matches!(outcome, WebhookOutcome::Failed { .. }));
        assert_eq!(f.ledger_result("evt-1").await, Some(ProcessingResult::Failed));
    }

    #[tokio::test]
    async fn unknown_app_is_rejected() {
        let f = Fixture::new();

        let err = f
            .handler
            .handle(HandleStoreWebhookCommand {
                app_id: AppId::new(),
                platform: Platform::Ios,
                body: b"renew".to_vec(),
                credential: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::AppNotFound(_)));
    }

    #[tokio::test]
    async fn unconfigured_platform_is_an_error() {
        let f = Fixture::new();

        let err = f
            .handler
            .handle(HandleStoreWebhookCommand {
                app_id: f.h.app.id,
                platform: Platform::Android,
                body: b"{}".to_vec(),
                credential: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::StoreApi { transient: false, .. }));
    }
}
