//! SubscriptionRepository port.
//!
//! Defines the contract for persisting Subscription aggregates.
//!
//! # Design
//!
//! - **Natural key**: `(platform, original_transaction_id)` is unique
//! - **Optimistic locking**: updates carry the version they were loaded at
//! - **No deletes**: terminal states are kept for history

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, SubscriberId, SubscriptionId};
use crate::domain::subscription::{Subscription, SubscriptionKey};

/// Repository port for Subscription aggregate persistence.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Insert a new subscription.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if a row with the same natural key exists
    /// - `DatabaseError` on persistence failure
    async fn insert(&self, subscription: &Subscription) -> Result<(), DomainError>;

    /// Update an existing subscription.
    ///
    /// The stored row must still be at `expected_version`; it is written with
    /// `subscription.version`, which the caller has already advanced.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict` if the stored version differs
    /// - `DatabaseError` on persistence failure
    async fn update(
        &self,
        subscription: &Subscription,
        expected_version: i32,
    ) -> Result<(), DomainError>;

    /// Find a subscription by its natural key.
    async fn find_by_key(&self, key: &SubscriptionKey)
        -> Result<Option<Subscription>, DomainError>;

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError>;

    /// All subscriptions owned by a subscriber, in any status.
    async fn list_for_subscriber(
        &self,
        subscriber_id: &SubscriberId,
    ) -> Result<Vec<Subscription>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_repository_is_object_safe() {
        fn _accepts_dyn(_repo: &dyn SubscriptionRepository) {}
    }
}
