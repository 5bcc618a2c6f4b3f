//! ResyncSubscriptionHandler - Pulls the store's current view of a subscription.
//!
//! Used to repair state after missed or dropped notifications. The store
//! status is mapped to the canonical event that would have produced it and
//! applied through the reconciler like any other fact.

use std::sync::Arc;

use crate::domain::foundation::{AppId, Timestamp};
use crate::domain::subscription::{
    CanonicalEvent, Platform, ReconcileError, StoreSubscriptionStatus, SubscriptionFact,
    SubscriptionKey, SubscriptionStatus,
};
use crate::ports::{AppRegistry, SubscriptionRepository};

use super::{ReconcileResult, StoreAdapters, SubscriptionReconciler};

#[derive(Debug, Clone)]
pub struct ResyncSubscriptionCommand {
    pub app_id: AppId,
    pub platform: Platform,
    pub original_transaction_id: String,
}

pub struct ResyncSubscriptionHandler {
    apps: Arc<dyn AppRegistry>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    stores: StoreAdapters,
    reconciler: Arc<SubscriptionReconciler>,
}

impl ResyncSubscriptionHandler {
    pub fn new(
        apps: Arc<dyn AppRegistry>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        stores: StoreAdapters,
        reconciler: Arc<SubscriptionReconciler>,
    ) -> Self {
        Self {
            apps,
            subscriptions,
            stores,
            reconciler,
        }
    }

    pub async fn handle(
        &self,
        cmd: ResyncSubscriptionCommand,
    ) -> Result<ReconcileResult, ReconcileError> {
        let app = self
            .apps
            .find_by_id(&cmd.app_id)
            .await?
            .ok_or(ReconcileError::AppNotFound(cmd.app_id))?;

        let key = SubscriptionKey::new(cmd.platform, cmd.original_transaction_id.clone());
        match self.subscriptions.find_by_key(&key).await? {
            Some(existing) if existing.app_id == app.id => {}
            _ => return Err(ReconcileError::SubscriptionNotFound(key)),
        }

        let status = self
            .stores
            .get(cmd.platform)?
            .fetch_subscription_status(&app, &cmd.original_transaction_id)
            .await?;

        let fact = fact_from_status(&cmd.original_transaction_id, status, Timestamp::now());
        tracing::info!(
            subscription_key = %key,
            event = fact.event.name(),
            "Resyncing subscription from store status"
        );
        self.reconciler.apply_event(cmd.platform, fact).await
    }
}

/// Maps a store status report to the canonical event that reaches it.
fn fact_from_status(
    original_transaction_id: &str,
    status: StoreSubscriptionStatus,
    now: Timestamp,
) -> SubscriptionFact {
    let latest = status.latest_transaction().cloned();
    let event = match status.status {
        SubscriptionStatus::Active => match &latest {
            Some(tx) if tx.is_trial_period || tx.is_in_intro_offer_period => {
                CanonicalEvent::OfferRedeemed
            }
            _ => CanonicalEvent::Renewed,
        },
        SubscriptionStatus::InGracePeriod => CanonicalEvent::EnteredGracePeriod {
            grace_period_expires_at: status
                .renewal_info
                .as_ref()
                .and_then(|r| r.grace_period_expires_date),
        },
        SubscriptionStatus::InBillingRetry => CanonicalEvent::EnteredBillingRetry,
        SubscriptionStatus::Expired => CanonicalEvent::Expired,
        SubscriptionStatus::Revoked => CanonicalEvent::Revoked {
            reason: latest.as_ref().and_then(|tx| tx.revocation_reason.clone()),
        },
    };

    match latest {
        Some(tx) if tx.original_transaction_id == original_transaction_id => {
            SubscriptionFact::from_transaction(event, tx, status.renewal_info, now)
        }
        _ => {
            let mut fact = SubscriptionFact::without_transaction(original_transaction_id, event, now);
            fact.renewal = status.renewal_info;
            fact
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::test_support::{ios_transaction, Harness};
    use crate::domain::subscription::RenewalInfo;
    use crate::ports::StoreError;

    fn handler(h: &Harness) -> ResyncSubscriptionHandler {
        ResyncSubscriptionHandler::new(
            h.catalog.clone(),
            h.subscriptions.clone(),
            h.stores(),
            h.reconciler(),
        )
    }

    fn cmd(h: &Harness, original_transaction_id: &str) -> ResyncSubscriptionCommand {
        ResyncSubscriptionCommand {
            app_id: h.app.id,
            platform: Platform::Ios,
            original_transaction_id: original_transaction_id.to_string(),
        }
    }

    #[tokio::test]
    async fn store_renewal_extends_expiry() {
        let h = Harness::new();
        let subscriber = h.subscriber("user-1").await;
        h.seed_subscription(&subscriber.id, "1000", SubscriptionStatus::Active, Some(2))
            .await;
        let renewed_until = Timestamp::now().plus_days(32);
        h.ios
            .set_latest(ios_transaction("1000", "1001", Some(renewed_until)));

        let result = handler(&h).handle(cmd(&h, "1000")).await.unwrap();

        assert_eq!(result.subscription.expires_date, Some(renewed_until));
        assert_eq!(result.subscription.latest_transaction_id, "1001");
    }

    #[tokio::test]
    async fn missed_expiry_is_applied() {
        let h = Harness::new();
        let subscriber = h.subscriber("user-1").await;
        h.seed_subscription(&subscriber.id, "1000", SubscriptionStatus::Active, Some(30))
            .await;
        h.ios.set_status(
            "1000",
            StoreSubscriptionStatus {
                status: SubscriptionStatus::Expired,
                last_transactions: vec![ios_transaction(
                    "1000",
                    "1000",
                    Some(Timestamp::now().minus_days(1)),
                )],
                renewal_info: None,
            },
        );

        let result = handler(&h).handle(cmd(&h, "1000")).await.unwrap();

        assert_eq!(result.subscription.status, SubscriptionStatus::Expired);
        assert!(result.entitlements.iter().all(|e| !e.is_active));
    }

    #[tokio::test]
    async fn unknown_subscription_skips_store_call() {
        let h = Harness::new();

        let err = handler(&h).handle(cmd(&h, "missing")).await.unwrap_err();

        assert!(matches!(err, ReconcileError::SubscriptionNotFound(_)));
        assert_eq!(h.ios.fetch_count(), 0);
    }

    #[tokio::test]
    async fn store_outage_is_retryable() {
        let h = Harness::new();
        let subscriber = h.subscriber("user-1").await;
        h.seed_subscription(&subscriber.id, "1000", SubscriptionStatus::Active, Some(30))
            .await;
        h.ios.fail_with(Some(StoreError::Network("timeout".to_string())));

        let err = handler(&h).handle(cmd(&h, "1000")).await.unwrap_err();

        assert!(err.is_retryable());
    }

    #[test]
    fn grace_status_carries_grace_expiry() {
        let grace_until = Timestamp::now().plus_days(6);
        let fact = fact_from_status(
            "1000",
            StoreSubscriptionStatus {
                status: SubscriptionStatus::InGracePeriod,
                last_transactions: vec![],
                renewal_info: Some(RenewalInfo {
                    auto_renew_enabled: true,
                    grace_period_expires_date: Some(grace_until),
                    expiration_intent: None,
                    price_increase_pending: false,
                }),
            },
            Timestamp::now(),
        );

        assert_eq!(
            fact.event,
            CanonicalEvent::EnteredGracePeriod {
                grace_period_expires_at: Some(grace_until)
            }
        );
        assert!(fact.transaction.is_none());
        assert!(fact.renewal.is_some());
    }

    #[test]
    fn trial_transaction_maps_to_offer_redeemed() {
        let mut tx = ios_transaction("1000", "1000", None);
        tx.is_trial_period = true;
        let fact = fact_from_status(
            "1000",
            StoreSubscriptionStatus {
                status: SubscriptionStatus::Active,
                last_transactions: vec![tx],
                renewal_info: None,
            },
            Timestamp::now(),
        );

        assert_eq!(fact.event, CanonicalEvent::OfferRedeemed);
    }
}
