//! In-memory adapters for every persistence port.
//!
//! Used by unit and integration tests and by local runs without a database.
//! State lives behind `std::sync::RwLock`s that are never held across an
//! `.await`; poisoned locks are recovered rather than propagated.

mod catalog;
mod entitlement_repository;
mod fake_normalizer;
mod fake_store;
mod subscriber_repository;
mod subscription_locker;
mod subscription_repository;
mod webhook_event_repository;

pub use catalog::InMemoryCatalog;
pub use entitlement_repository::{
    InMemoryEntitlementOverrideRepository, InMemoryEntitlementRepository,
};
pub use fake_normalizer::FakeNotificationNormalizer;
pub use fake_store::FakeStoreAdapter;
pub use subscriber_repository::InMemorySubscriberRepository;
pub use subscription_locker::InMemorySubscriptionLocker;
pub use subscription_repository::InMemorySubscriptionRepository;
pub use webhook_event_repository::InMemoryWebhookEventRepository;

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
