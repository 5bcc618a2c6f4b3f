//! SubscriptionReconciler - The single writer of subscription state.
//!
//! Both entry points (receipt validation and store webhooks) funnel through
//! here. Each reconciliation runs under the per-key lock:
//!
//! 1. lock `(platform, originalTransactionId)`
//! 2. load the subscription (or create it, for receipts)
//! 3. apply the canonical event
//! 4. persist with an optimistic version check
//! 5. recompute entitlements for the owner (and the previous owner on transfer)
//! 6. release the lock and publish `SubscriptionChanged`
//!
//! A failure in steps 4-5 propagates; nothing is published and the caller
//! must not mark the triggering webhook as processed.

use std::sync::Arc;

use crate::domain::catalog::Product;
use crate::domain::entitlement::SubscriberEntitlement;
use crate::domain::foundation::{ErrorCode, SubscriberId, Timestamp};
use crate::domain::subscription::{
    CanonicalEvent, Platform, ReconcileError, RenewalInfo, StoreTransaction, Subscription,
    SubscriptionChanged, SubscriptionFact, SubscriptionKey, TransitionOutcome,
};
use crate::ports::{EventPublisher, ProductCatalog, SubscriptionLocker, SubscriptionRepository};

use crate::application::handlers::entitlement::EntitlementRecomputer;

/// A verified receipt ready to be folded into subscription state.
#[derive(Debug, Clone)]
pub struct ReceiptReconciliation {
    /// Subscriber presenting the receipt; becomes the owner.
    pub subscriber_id: SubscriberId,
    /// Catalog product the verified transaction refers to.
    pub product: Product,
    pub transaction: StoreTransaction,
    pub renewal: Option<RenewalInfo>,
}

/// Outcome of a committed reconciliation.
#[derive(Debug, Clone)]
pub struct ReconcileResult {
    pub subscription: Subscription,
    /// `None` when the subscription was created by this reconciliation.
    pub transition: Option<TransitionOutcome>,
    /// Set when ownership moved to another subscriber.
    pub previous_subscriber_id: Option<SubscriberId>,
    /// Recomputed entitlements of the current owner.
    pub entitlements: Vec<SubscriberEntitlement>,
}

impl ReconcileResult {
    pub fn created(&self) -> bool {
        self.transition.is_none()
    }
}

pub struct SubscriptionReconciler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    catalog: Arc<dyn ProductCatalog>,
    locker: Arc<dyn SubscriptionLocker>,
    recomputer: Arc<EntitlementRecomputer>,
    publisher: Arc<dyn EventPublisher>,
}

impl SubscriptionReconciler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        catalog: Arc<dyn ProductCatalog>,
        locker: Arc<dyn SubscriptionLocker>,
        recomputer: Arc<EntitlementRecomputer>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            subscriptions,
            catalog,
            locker,
            recomputer,
            publisher,
        }
    }

    /// Applies a fact to an existing subscription.
    ///
    /// Returns `SubscriptionNotFound` without mutating anything when no row
    /// exists for the key.
    pub async fn apply_event(
        &self,
        platform: Platform,
        fact: SubscriptionFact,
    ) -> Result<ReconcileResult, ReconcileError> {
        let key = SubscriptionKey::new(platform, fact.original_transaction_id.clone());
        let guard = self.locker.lock(&key).await?;

        let mut subscription = self
            .subscriptions
            .find_by_key(&key)
            .await?
            .ok_or_else(|| ReconcileError::SubscriptionNotFound(key.clone()))?;

        let now = Timestamp::now();
        let outcome = subscription.apply(&fact, now);
        log_transition(&subscription, &fact.event, &outcome);

        if let Some(tx) = &fact.transaction {
            self.follow_product(&mut subscription, tx, now).await?;
        }

        self.save(&mut subscription).await?;
        let entitlements = self.recomputer.recompute(&subscription.subscriber_id).await?;
        drop(guard);

        self.publish(SubscriptionChanged::transitioned(
            &subscription,
            fact.event.name(),
            &outcome,
        ))
        .await;

        Ok(ReconcileResult {
            subscription,
            transition: Some(outcome),
            previous_subscriber_id: None,
            entitlements,
        })
    }

    /// Creates or refreshes the subscription a verified receipt refers to.
    ///
    /// A new row starts with `Activated`. An existing row receives `Renewed`
    /// (or `OfferRedeemed` while the receipt is in a trial or intro offer, so
    /// the offer flags survive) and moves to the presenting subscriber if
    /// another subscriber owned it.
    pub async fn apply_receipt(
        &self,
        receipt: ReceiptReconciliation,
    ) -> Result<ReconcileResult, ReconcileError> {
        let ReceiptReconciliation {
            subscriber_id,
            product,
            transaction,
            renewal,
        } = receipt;
        let key = transaction.subscription_key();
        let guard = self.locker.lock(&key).await?;
        let now = Timestamp::now();

        let Some(mut subscription) = self.subscriptions.find_by_key(&key).await? else {
            let subscription = Subscription::activate(
                subscriber_id,
                product.app_id,
                product.id,
                &transaction,
                renewal.as_ref(),
                now,
            );
            self.subscriptions.insert(&subscription).await.map_err(|e| {
                if e.code == ErrorCode::AlreadyExists {
                    ReconcileError::ConcurrencyConflict(e.message)
                } else {
                    e.into()
                }
            })?;
            tracing::info!(
                platform = %key.platform,
                original_transaction_id = %key.original_transaction_id,
                subscriber_id = %subscriber_id,
                product = %product.store_product_id,
                "Created subscription"
            );

            let entitlements = self.recomputer.recompute(&subscriber_id).await?;
            drop(guard);

            self.publish(SubscriptionChanged::created(
                &subscription,
                CanonicalEvent::Activated.name(),
            ))
            .await;

            return Ok(ReconcileResult {
                subscription,
                transition: None,
                previous_subscriber_id: None,
                entitlements,
            });
        };

        let previous_owner =
            (subscription.subscriber_id != subscriber_id).then_some(subscription.subscriber_id);
        if let Some(previous) = previous_owner {
            tracing::info!(
                platform = %key.platform,
                original_transaction_id = %key.original_transaction_id,
                from_subscriber_id = %previous,
                to_subscriber_id = %subscriber_id,
                "Transferring subscription to restoring subscriber"
            );
            subscription.reassign_to(subscriber_id, now);
        }

        let event = if transaction.is_trial_period || transaction.is_in_intro_offer_period {
            CanonicalEvent::OfferRedeemed
        } else {
            CanonicalEvent::Renewed
        };
        let fact = SubscriptionFact::from_transaction(event, transaction, renewal, now);
        let outcome = subscription.apply(&fact, now);
        log_transition(&subscription, &fact.event, &outcome);

        if subscription.product_id != product.id {
            subscription.change_product(product.id, product.store_product_id.clone(), now);
        }

        self.save(&mut subscription).await?;
        let entitlements = self.recomputer.recompute(&subscriber_id).await?;
        if let Some(previous) = previous_owner {
            self.recomputer.recompute(&previous).await?;
        }
        drop(guard);

        let mut changed = SubscriptionChanged::transitioned(&subscription, fact.event.name(), &outcome);
        if let Some(previous) = previous_owner {
            changed = changed.with_previous_subscriber(previous);
        }
        self.publish(changed).await;

        Ok(ReconcileResult {
            subscription,
            transition: Some(outcome),
            previous_subscriber_id: previous_owner,
            entitlements,
        })
    }

    /// Points the subscription at the product of a newer transaction (crossgrade).
    async fn follow_product(
        &self,
        subscription: &mut Subscription,
        transaction: &StoreTransaction,
        now: Timestamp,
    ) -> Result<(), ReconcileError> {
        if transaction.product_id.is_empty()
            || transaction.product_id == subscription.store_product_id
        {
            return Ok(());
        }

        match self
            .catalog
            .find_by_store_product_id(
                &subscription.app_id,
                subscription.platform,
                &transaction.product_id,
            )
            .await?
        {
            Some(product) => {
                tracing::info!(
                    subscription_id = %subscription.id,
                    from = %subscription.store_product_id,
                    to = %product.store_product_id,
                    "Subscription changed product"
                );
                subscription.change_product(product.id, product.store_product_id, now);
            }
            None => {
                tracing::warn!(
                    subscription_id = %subscription.id,
                    store_product_id = %transaction.product_id,
                    "Transaction references a product missing from the catalog; keeping current product"
                );
            }
        }
        Ok(())
    }

    async fn save(&self, subscription: &mut Subscription) -> Result<(), ReconcileError> {
        let expected_version = subscription.version;
        subscription.version += 1;
        self.subscriptions
            .update(subscription, expected_version)
            .await
            .map_err(ReconcileError::from)
    }

    async fn publish(&self, event: SubscriptionChanged) {
        if let Err(err) = self.publisher.publish(&event).await {
            tracing::warn!(
                subscription_id = %event.subscription_id,
                event = %event.event,
                error = %err,
                "Failed to publish subscription change"
            );
        }
    }
}

fn log_transition(subscription: &Subscription, event: &CanonicalEvent, outcome: &TransitionOutcome) {
    if outcome.out_of_order {
        tracing::warn!(
            platform = %subscription.platform,
            original_transaction_id = %subscription.original_transaction_id,
            event = event.name(),
            from = %outcome.from,
            to = %outcome.to,
            "Applying event outside its expected source status"
        );
    } else {
        tracing::info!(
            platform = %subscription.platform,
            original_transaction_id = %subscription.original_transaction_id,
            event = event.name(),
            from = %outcome.from,
            to = %outcome.to,
            "Applied subscription event"
        );
    }
}
