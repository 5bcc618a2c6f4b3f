//! Subscription aggregate.
//!
//! One row per `(platform, originalTransactionId)`. Rows are created by the
//! first successful receipt validation, mutated only through [`Subscription::apply`],
//! and never deleted.
//!
//! # Ordering policy
//!
//! Transitions are not guarded by their "from" status. Stores do not
//! guarantee delivery order, so the last processed event wins and
//! server-to-server re-verification is the correction path. `apply`
//! reports whether the event arrived from a status the transition table
//! does not list so callers can log it.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{AppId, ProductId, SubscriberId, SubscriptionId, Timestamp};

use super::{
    CanonicalEvent, Platform, RenewalInfo, StoreEnvironment, StoreTransaction, SubscriptionFact,
    SubscriptionKey, SubscriptionStatus,
};

/// Cancellation reason recorded for refunds.
pub const CANCELLATION_REASON_REFUND: &str = "refund";

/// Cancellation reason recorded for revocations without a store-provided reason.
pub const CANCELLATION_REASON_REVOKED: &str = "revoked";

/// Subscription aggregate.
///
/// # Invariants
///
/// - `(platform, original_transaction_id)` is unique
/// - `grace_period_expires_date` is only set while `status == InGracePeriod`
/// - `version` increases by one on every persisted update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub subscriber_id: SubscriberId,
    pub app_id: AppId,
    pub platform: Platform,

    /// Catalog product this subscription is for.
    pub product_id: ProductId,

    /// Store product identifier of the latest transaction.
    pub store_product_id: String,

    pub status: SubscriptionStatus,
    pub original_transaction_id: String,
    pub latest_transaction_id: String,
    pub purchase_date: Timestamp,

    /// `None` for non-expiring purchases.
    pub expires_date: Option<Timestamp>,

    pub auto_renew_enabled: bool,
    pub is_trial_period: bool,
    pub is_in_intro_offer_period: bool,
    pub grace_period_expires_date: Option<Timestamp>,
    pub canceled_at: Option<Timestamp>,
    pub cancellation_reason: Option<String>,
    pub environment: StoreEnvironment,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,

    /// Optimistic concurrency version.
    pub version: i32,
}

/// Result of applying a fact to a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub from: SubscriptionStatus,
    pub to: SubscriptionStatus,
    /// The current status is not a listed source for the event.
    pub out_of_order: bool,
    pub status_or_expiry_changed: bool,
}

impl Subscription {
    /// Creates a subscription from its first verified transaction (`Activated`).
    pub fn activate(
        subscriber_id: SubscriberId,
        app_id: AppId,
        product_id: ProductId,
        transaction: &StoreTransaction,
        renewal: Option<&RenewalInfo>,
        now: Timestamp,
    ) -> Self {
        let auto_renew_enabled = renewal
            .map(|r| r.auto_renew_enabled)
            .or(transaction.auto_renew_enabled)
            .unwrap_or(transaction.expires_date.is_some());

        Self {
            id: SubscriptionId::new(),
            subscriber_id,
            app_id,
            platform: transaction.platform,
            product_id,
            store_product_id: transaction.product_id.clone(),
            status: SubscriptionStatus::Active,
            original_transaction_id: transaction.original_transaction_id.clone(),
            latest_transaction_id: transaction.transaction_id.clone(),
            purchase_date: transaction.purchase_date,
            expires_date: transaction.expires_date,
            auto_renew_enabled,
            is_trial_period: transaction.is_trial_period,
            is_in_intro_offer_period: transaction.is_in_intro_offer_period,
            grace_period_expires_date: None,
            canceled_at: None,
            cancellation_reason: None,
            environment: transaction.environment,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// Natural key of this subscription.
    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey::new(self.platform, self.original_transaction_id.clone())
    }

    /// Latest instant at which this subscription still grants access.
    ///
    /// Grace periods extend access past `expires_date`. `None` means no expiry.
    pub fn access_expires_at(&self) -> Option<Timestamp> {
        match (self.status, self.expires_date, self.grace_period_expires_date) {
            (SubscriptionStatus::InGracePeriod, Some(expires), Some(grace)) => {
                Some(expires.max(grace))
            }
            (SubscriptionStatus::InGracePeriod, None, _) => None,
            (_, expires, _) => expires,
        }
    }

    /// Moves the subscription to another subscriber (restore on a new account).
    pub fn reassign_to(&mut self, subscriber_id: SubscriberId, now: Timestamp) {
        self.subscriber_id = subscriber_id;
        self.updated_at = now;
    }

    /// Points the subscription at a different catalog product (crossgrade).
    pub fn change_product(
        &mut self,
        product_id: ProductId,
        store_product_id: impl Into<String>,
        now: Timestamp,
    ) {
        self.product_id = product_id;
        self.store_product_id = store_product_id.into();
        self.updated_at = now;
    }

    /// Applies a canonical fact following the transition table.
    pub fn apply(&mut self, fact: &SubscriptionFact, now: Timestamp) -> TransitionOutcome {
        let from = self.status;
        let previous_expiry = self.access_expires_at();
        let out_of_order = !fact.event.is_nominal_from(from);
        let to = fact.event.target_status(from);
        let tx = fact.transaction.as_ref();

        match &fact.event {
            CanonicalEvent::Activated => {
                if let Some(tx) = tx {
                    self.purchase_date = tx.purchase_date;
                    self.expires_date = tx.expires_date;
                    self.original_transaction_id = tx.original_transaction_id.clone();
                    self.is_trial_period = tx.is_trial_period;
                    self.is_in_intro_offer_period = tx.is_in_intro_offer_period;
                }
            }
            CanonicalEvent::Renewed => {
                if let Some(tx) = tx {
                    self.purchase_date = tx.purchase_date;
                    self.expires_date = tx.expires_date;
                }
                self.is_trial_period = false;
                self.is_in_intro_offer_period = false;
            }
            CanonicalEvent::RenewalStatusChanged { auto_renew_enabled } => {
                self.auto_renew_enabled = *auto_renew_enabled;
                if !*auto_renew_enabled {
                    self.canceled_at = Some(fact.occurred_at);
                } else if self.cancellation_reason.is_none() {
                    self.canceled_at = None;
                }
            }
            CanonicalEvent::EnteredBillingRetry
            | CanonicalEvent::Expired
            | CanonicalEvent::GracePeriodExpired => {}
            CanonicalEvent::EnteredGracePeriod {
                grace_period_expires_at,
            } => {
                self.grace_period_expires_date = grace_period_expires_at
                    .or_else(|| fact.renewal.as_ref().and_then(|r| r.grace_period_expires_date));
            }
            CanonicalEvent::Refunded => {
                self.canceled_at = Some(tx.and_then(|t| t.revocation_date).unwrap_or(fact.occurred_at));
                self.cancellation_reason = Some(CANCELLATION_REASON_REFUND.to_string());
            }
            CanonicalEvent::Revoked { reason } => {
                self.canceled_at = Some(tx.and_then(|t| t.revocation_date).unwrap_or(fact.occurred_at));
                self.cancellation_reason = Some(
                    reason
                        .clone()
                        .unwrap_or_else(|| CANCELLATION_REASON_REVOKED.to_string()),
                );
            }
            CanonicalEvent::OfferRedeemed => {
                if let Some(tx) = tx {
                    self.purchase_date = tx.purchase_date;
                    if tx.expires_date.is_some() {
                        self.expires_date = tx.expires_date;
                    }
                    self.is_trial_period = tx.is_trial_period;
                    self.is_in_intro_offer_period = tx.is_in_intro_offer_period;
                }
            }
        }

        if to != SubscriptionStatus::InGracePeriod {
            self.grace_period_expires_date = None;
        }
        if to == SubscriptionStatus::Active && from == SubscriptionStatus::Revoked {
            self.canceled_at = None;
            self.cancellation_reason = None;
        }
        if let Some(renewal) = &fact.renewal {
            if !matches!(fact.event, CanonicalEvent::RenewalStatusChanged { .. }) {
                self.auto_renew_enabled = renewal.auto_renew_enabled;
            }
        } else if let Some(enabled) = tx.and_then(|t| t.auto_renew_enabled) {
            if !matches!(fact.event, CanonicalEvent::RenewalStatusChanged { .. }) {
                self.auto_renew_enabled = enabled;
            }
        }
        if let Some(tx) = tx {
            self.latest_transaction_id = tx.transaction_id.clone();
            self.environment = tx.environment;
        }

        self.status = to;
        self.updated_at = now;

        TransitionOutcome {
            from,
            to,
            out_of_order,
            status_or_expiry_changed: from != to || previous_expiry != self.access_expires_at(),
        }
    }
}
