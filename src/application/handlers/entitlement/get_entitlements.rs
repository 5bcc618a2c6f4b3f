//! GetEntitlementsHandler - Query handler for a subscriber's entitlement snapshot.

use std::sync::Arc;

use crate::domain::entitlement::SubscriberEntitlement;
use crate::domain::foundation::{AppId, AppUserId, SubscriberId, Timestamp};
use crate::domain::subscription::{ReconcileError, Subscription};
use crate::ports::{AppRegistry, EntitlementRepository, SubscriberRepository, SubscriptionRepository};

/// Query for the entitlements of one app user.
#[derive(Debug, Clone)]
pub struct GetEntitlementsQuery {
    pub app_id: AppId,
    pub app_user_id: String,
}

/// A subscriber's current entitlements and the subscriptions behind them.
#[derive(Debug, Clone)]
pub struct EntitlementSnapshot {
    pub app_user_id: AppUserId,
    /// `None` when the app user has never presented a receipt.
    pub subscriber_id: Option<SubscriberId>,
    pub entitlements: Vec<SubscriberEntitlement>,
    pub subscriptions: Vec<Subscription>,
    pub as_of: Timestamp,
}

impl EntitlementSnapshot {
    pub fn empty(app_user_id: AppUserId) -> Self {
        Self {
            app_user_id,
            subscriber_id: None,
            entitlements: Vec::new(),
            subscriptions: Vec::new(),
            as_of: Timestamp::now(),
        }
    }

    /// Entitlements granting access at `as_of`.
    pub fn active(&self) -> impl Iterator<Item = &SubscriberEntitlement> + '_ {
        self.entitlements
            .iter()
            .filter(move |e| e.is_active_at(self.as_of))
    }

    pub fn is_entitled_to(&self, identifier: &str) -> bool {
        self.active().any(|e| e.identifier == identifier)
    }
}

pub struct GetEntitlementsHandler {
    apps: Arc<dyn AppRegistry>,
    subscribers: Arc<dyn SubscriberRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    entitlements: Arc<dyn EntitlementRepository>,
}

impl GetEntitlementsHandler {
    pub fn new(
        apps: Arc<dyn AppRegistry>,
        subscribers: Arc<dyn SubscriberRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        entitlements: Arc<dyn EntitlementRepository>,
    ) -> Self {
        Self {
            apps,
            subscribers,
            subscriptions,
            entitlements,
        }
    }

    pub async fn handle(
        &self,
        query: GetEntitlementsQuery,
    ) -> Result<EntitlementSnapshot, ReconcileError> {
        let app_user_id = AppUserId::new(query.app_user_id)
            .map_err(|e| ReconcileError::Validation(e.to_string()))?;
        self.apps
            .find_by_id(&query.app_id)
            .await?
            .ok_or(ReconcileError::AppNotFound(query.app_id))?;

        let Some(subscriber) = self
            .subscribers
            .find_by_app_user(&query.app_id, &app_user_id)
            .await?
        else {
            return Ok(EntitlementSnapshot::empty(app_user_id));
        };

        let entitlements = self.entitlements.list_for_subscriber(&subscriber.id).await?;
        let subscriptions = self.subscriptions.list_for_subscriber(&subscriber.id).await?;

        Ok(EntitlementSnapshot {
            app_user_id,
            subscriber_id: Some(subscriber.id),
            entitlements,
            subscriptions,
            as_of: Timestamp::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::test_support::Harness;
    use crate::domain::subscription::SubscriptionStatus;

    fn handler(h: &Harness) -> GetEntitlementsHandler {
        GetEntitlementsHandler::new(
            h.catalog.clone(),
            h.subscribers.clone(),
            h.subscriptions.clone(),
            h.entitlements.clone(),
        )
    }

    #[tokio::test]
    async fn returns_recomputed_entitlements() {
        let h = Harness::new();
        let subscriber = h.subscriber("user-1").await;
        h.seed_subscription(&subscriber.id, "1000", SubscriptionStatus::Active, Some(30))
            .await;
        h.recomputer().recompute(&subscriber.id).await.unwrap();

        let snapshot = handler(&h)
            .handle(GetEntitlementsQuery {
                app_id: h.app.id,
                app_user_id: "user-1".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(snapshot.subscriber_id, Some(subscriber.id));
        assert!(snapshot.is_entitled_to("pro"));
        assert_eq!(snapshot.subscriptions.len(), 1);
    }

    #[tokio::test]
    async fn unknown_app_user_gets_empty_snapshot() {
        let h = Harness::new();

        let snapshot = handler(&h)
            .handle(GetEntitlementsQuery {
                app_id: h.app.id,
                app_user_id: "nobody".to_string(),
            })
            .await
            .unwrap();

        assert!(snapshot.subscriber_id.is_none());
        assert!(snapshot.entitlements.is_empty());
        assert_eq!(h.subscribers.count(), 0);
    }

    #[tokio::test]
    async fn unknown_app_is_rejected() {
        let h = Harness::new();

        let err = handler(&h)
            .handle(GetEntitlementsQuery {
                app_id: AppId::new(),
                app_user_id: "user-1".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::AppNotFound(_)));
    }

    #[tokio::test]
    async fn blank_app_user_id_is_invalid() {
        let h = Harness::new();

        let err = handler(&h)
            .handle(GetEntitlementsQuery {
                app_id: h.app.id,
                app_user_id: "   ".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Validation(_)));
    }
}
