//! In-memory subscription repository with the same version semantics as PostgreSQL.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::foundation::{DomainError, ErrorCode, SubscriberId, SubscriptionId};
use crate::domain::subscription::{Subscription, SubscriptionKey};
use crate::ports::SubscriptionRepository;

use super::{read, write};

#[derive(Default)]
pub struct InMemorySubscriptionRepository {
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
}

impl InMemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored subscription.
    pub fn all(&self) -> Vec<Subscription> {
        read(&self.subscriptions).values().cloned().collect()
    }
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn insert(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let mut subscriptions = write(&self.subscriptions);
        let key = subscription.key();
        if subscriptions.values().any(|s| s.key() == key) {
            return Err(DomainError::new(
                ErrorCode::AlreadyExists,
                format!("Subscription {} already exists", key),
            ));
        }
        subscriptions.insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn update(
        &self,
        subscription: &Subscription,
        expected_version: i32,
    ) -> Result<(), DomainError> {
        let mut subscriptions = write(&self.subscriptions);
        match subscriptions.get_mut(&subscription.id) {
            None => Err(DomainError::new(
                ErrorCode::NotFound,
                format!("Subscription {} not found", subscription.id),
            )),
            Some(stored) if stored.version != expected_version => Err(DomainError::new(
                ErrorCode::ConcurrencyConflict,
                format!(
                    "Subscription {} is at version {}, expected {}",
                    subscription.id, stored.version, expected_version
                ),
            )),
            Some(stored) => {
                *stored = subscription.clone();
                Ok(())
            }
        }
    }

    async fn find_by_key(
        &self,
        key: &SubscriptionKey,
    ) -> Result<Option<Subscription>, DomainError> {
        Ok(read(&self.subscriptions)
            .values()
            .find(|s| s.key() == *key)
            .cloned())
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        Ok(read(&self.subscriptions).get(id).cloned())
    }

    async fn list_for_subscriber(
        &self,
        subscriber_id: &SubscriberId,
    ) -> Result<Vec<Subscription>, DomainError> {
        let mut owned: Vec<Subscription> = read(&self.subscriptions)
            .values()
            .filter(|s| s.subscriber_id == *subscriber_id)
            .cloned()
            .collect();
        owned.sort_by_key(|s| s.created_at);
        Ok(owned)
    }
}
