//! Subscription change notifications.
//!
//! Emitted after a reconciliation has fully committed. The host forwards
//! these to the app developer's own webhook endpoint.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{AppId, SubscriberId, SubscriptionId, Timestamp};

use super::{Platform, Subscription, SubscriptionStatus, TransitionOutcome};

/// A subscription was created or changed by a reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionChanged {
    pub subscription_id: SubscriptionId,
    pub subscriber_id: SubscriberId,
    pub app_id: AppId,
    pub platform: Platform,
    pub original_transaction_id: String,
    /// Canonical event name that caused the change.
    pub event: String,
    /// `None` when the subscription was just created.
    pub previous_status: Option<SubscriptionStatus>,
    pub status: SubscriptionStatus,
    pub expires_at: Option<Timestamp>,
    /// Set when the subscription moved to another subscriber.
    pub previous_subscriber_id: Option<SubscriberId>,
    pub occurred_at: Timestamp,
}

impl SubscriptionChanged {
    /// Event for a subscription that was just created.
    pub fn created(subscription: &Subscription, event: &str) -> Self {
        Self::build(subscription, event, None)
    }

    /// Event for a transition applied to an existing subscription.
    pub fn transitioned(
        subscription: &Subscription,
        event: &str,
        outcome: &TransitionOutcome,
    ) -> Self {
        Self::build(subscription, event, Some(outcome.from))
    }

    /// Records the subscriber the subscription was transferred away from.
    pub fn with_previous_subscriber(mut self, subscriber_id: SubscriberId) -> Self {
        self.previous_subscriber_id = Some(subscriber_id);
        self
    }

    fn build(
        subscription: &Subscription,
        event: &str,
        previous_status: Option<SubscriptionStatus>,
    ) -> Self {
        Self {
            subscription_id: subscription.id,
            subscriber_id: subscription.subscriber_id,
            app_id: subscription.app_id,
            platform: subscription.platform,
            original_transaction_id: subscription.original_transaction_id.clone(),
            event: event.to_string(),
            previous_status,
            status: subscription.status,
            expires_at: subscription.access_expires_at(),
            previous_subscriber_id: None,
            occurred_at: subscription.updated_at,
        }
    }
}
