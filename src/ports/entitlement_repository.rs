//! EntitlementRepository port - derived subscriber entitlements.

use async_trait::async_trait;

use crate::domain::entitlement::SubscriberEntitlement;
use crate::domain::foundation::{DomainError, SubscriberId};

/// Port for the derived `subscriber_entitlements` set.
///
/// Implementations must ensure:
/// - `replace_for_subscriber` is observably atomic (readers never see a
///   partially written set)
/// - No other writes happen outside of recomputation
#[async_trait]
pub trait EntitlementRepository: Send + Sync {
    /// Replace the whole entitlement set of a subscriber.
    async fn replace_for_subscriber(
        &self,
        subscriber_id: &SubscriberId,
        entitlements: &[SubscriberEntitlement],
    ) -> Result<(), DomainError>;

    /// Current entitlement set, sorted by identifier.
    async fn list_for_subscriber(
        &self,
        subscriber_id: &SubscriberId,
    ) -> Result<Vec<SubscriberEntitlement>, DomainError>;
}
