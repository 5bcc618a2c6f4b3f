//! In-memory event publisher for testing.
//!
//! Captures published events for assertions.

use async_trait::async_trait;
use std::sync::{PoisonError, RwLock};

use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId};
use crate::domain::subscription::SubscriptionChanged;
use crate::ports::EventPublisher;

/// Publisher that records every event.
///
/// # Example
///
/// ```ignore
/// let publisher = Arc::new(InMemoryEventPublisher::new());
/// // ... run a reconciliation ...
/// assert_eq!(publisher.event_count(), 1);
/// ```
#[derive(Default)]
pub struct InMemoryEventPublisher {
    published: RwLock<Vec<SubscriptionChanged>>,
    fail: RwLock<bool>,
}

impl InMemoryEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    // === Test Helpers ===

    /// Returns all published events.
    pub fn published_events(&self) -> Vec<SubscriptionChanged> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns events for a specific subscription.
    pub fn events_for_subscription(&self, id: &SubscriptionId) -> Vec<SubscriptionChanged> {
        self.published_events()
            .into_iter()
            .filter(|e| e.subscription_id == *id)
            .collect()
    }

    pub fn event_count(&self) -> usize {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Makes subsequent publishes fail.
    pub fn set_failing(&self, fail: bool) {
        *self.fail.write().unwrap_or_else(PoisonError::into_inner) = fail;
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventPublisher {
    async fn publish(&self, event: &SubscriptionChanged) -> Result<(), DomainError> {
        if *self.fail.read().unwrap_or_else(PoisonError::into_inner) {
            return Err(DomainError::new(
                ErrorCode::InternalError,
                "event publisher unavailable",
            ));
        }
        self.published
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}
