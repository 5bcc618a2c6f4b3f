//! EntitlementRecomputer - Rebuilds a subscriber's entitlement set.
//!
//! Called after every committed subscription change and after manual
//! override edits. Never patches rows: the full set is derived again from
//! the current subscriptions and overrides and written atomically.
//!
//! Read, derive and write run under the subscriber lock. Two subscriptions
//! of one subscriber reconciled concurrently would otherwise each derive
//! from a read that misses the other's commit, and the later write wins.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::entitlement::{compute_entitlements, GrantSource, SubscriberEntitlement};
use crate::domain::foundation::{DomainError, ProductId, SubscriberId, Timestamp};
use crate::ports::{
    EntitlementOverrideRepository, EntitlementRepository, ProductCatalog, SubscriptionLocker,
    SubscriptionRepository,
};

/// Derives and persists the entitlement set of one subscriber.
pub struct EntitlementRecomputer {
    subscriptions: Arc<dyn SubscriptionRepository>,
    catalog: Arc<dyn ProductCatalog>,
    overrides: Arc<dyn EntitlementOverrideRepository>,
    entitlements: Arc<dyn EntitlementRepository>,
    locker: Arc<dyn SubscriptionLocker>,
}

impl EntitlementRecomputer {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        catalog: Arc<dyn ProductCatalog>,
        overrides: Arc<dyn EntitlementOverrideRepository>,
        entitlements: Arc<dyn EntitlementRepository>,
        locker: Arc<dyn SubscriptionLocker>,
    ) -> Self {
        Self {
            subscriptions,
            catalog,
            overrides,
            entitlements,
            locker,
        }
    }

    /// Recomputes at the current instant.
    pub async fn recompute(
        &self,
        subscriber_id: &SubscriberId,
    ) -> Result<Vec<SubscriberEntitlement>, DomainError> {
        self.recompute_at(subscriber_id, Timestamp::now()).await
    }

    pub async fn recompute_at(
        &self,
        subscriber_id: &SubscriberId,
        now: Timestamp,
    ) -> Result<Vec<SubscriberEntitlement>, DomainError> {
        let _guard = self.locker.lock_subscriber(subscriber_id).await?;
        let subscriptions = self.subscriptions.list_for_subscriber(subscriber_id).await?;

        let mut product_ids: Vec<ProductId> = subscriptions.iter().map(|s| s.product_id).collect();
        product_ids.sort();
        product_ids.dedup();

        let products: HashMap<ProductId, _> = self
            .catalog
            .find_by_ids(&product_ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p.product_type))
            .collect();
        let granted = self.catalog.entitlements_for_products(&product_ids).await?;

        let mut sources = Vec::with_capacity(subscriptions.len());
        for subscription in &subscriptions {
            let Some(product_type) = products.get(&subscription.product_id) else {
                tracing::warn!(
                    subscription_id = %subscription.id,
                    product_id = %subscription.product_id,
                    "Subscription references a product missing from the catalog"
                );
                continue;
            };
            let entitlements = granted
                .get(&subscription.product_id)
                .cloned()
                .unwrap_or_default();
            sources.push(GrantSource::from_subscription(
                subscription,
                *product_type,
                entitlements,
            ));
        }

        let overrides = self.overrides.list_for_subscriber(subscriber_id).await?;
        let computed = compute_entitlements(*subscriber_id, &sources, &overrides, now);

        self.entitlements
            .replace_for_subscriber(subscriber_id, &computed)
            .await?;

        tracing::debug!(
            subscriber_id = %subscriber_id,
            active = computed.iter().filter(|e| e.is_active).count(),
            total = computed.len(),
            "Recomputed entitlements"
        );

        Ok(computed)
    }
}
