//! SubscriptionLocker port - single writer per subscription.
//!
//! Concurrent deliveries for the same `(platform, originalTransactionId)`
//! must not interleave their read-modify-write cycles. Deliveries for
//! different keys proceed in parallel.
//!
//! Entitlement recomputation is serialized per subscriber, since one
//! subscriber can own several subscription keys. A subscriber lock may be
//! taken while a key lock is held, never the other way around.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, SubscriberId};
use crate::domain::subscription::SubscriptionKey;

/// Held lock. Dropping the guard releases it.
pub trait SubscriptionLockGuard: Send {}

#[async_trait]
pub trait SubscriptionLocker: Send + Sync {
    /// Wait until the key is free and take it.
    ///
    /// # Errors
    ///
    /// - `LockUnavailable` if the lock could not be acquired
    /// - `DatabaseError` on backend failure
    async fn lock(&self, key: &SubscriptionKey)
        -> Result<Box<dyn SubscriptionLockGuard>, DomainError>;

    /// Wait until no other recomputation for the subscriber is running.
    async fn lock_subscriber(
        &self,
        subscriber_id: &SubscriberId,
    ) -> Result<Box<dyn SubscriptionLockGuard>, DomainError>;
}
