//! EntitlementOverrideRepository port - manual grants and revokes.

use async_trait::async_trait;

use crate::domain::entitlement::ManualOverride;
use crate::domain::foundation::{DomainError, EntitlementId, SubscriberId};

#[async_trait]
pub trait EntitlementOverrideRepository: Send + Sync {
    /// All overrides of a subscriber, lapsed ones included.
    async fn list_for_subscriber(
        &self,
        subscriber_id: &SubscriberId,
    ) -> Result<Vec<ManualOverride>, DomainError>;

    /// Insert or replace the override for `(subscriber, entitlement)`.
    async fn upsert(&self, entry: &ManualOverride) -> Result<(), DomainError>;

    /// Remove an override. Returns false if none existed.
    async fn delete(
        &self,
        subscriber_id: &SubscriberId,
        entitlement_id: &EntitlementId,
    ) -> Result<bool, DomainError>;
}
