//! Process-local subscription locks.

use async_trait::async_trait;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::foundation::{DomainError, SubscriberId};
use crate::domain::subscription::SubscriptionKey;
use crate::ports::{SubscriptionLockGuard, SubscriptionLocker};

type Slots<K> = Arc<Mutex<HashMap<K, Arc<AsyncMutex<()>>>>>;

/// One async mutex per live key. A slot is removed when its last holder
/// releases it and nobody is queued behind.
struct KeyedLocks<K> {
    slots: Slots<K>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K: Eq + Hash + Clone + Send + 'static> KeyedLocks<K> {
    async fn acquire(&self, key: &K) -> SlotGuard<K> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.entry(key.clone()).or_default().clone()
        };
        let held = slot.clone().lock_owned().await;
        SlotGuard {
            held: Some(held),
            slot,
            key: key.clone(),
            slots: self.slots.clone(),
        }
    }

    fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

struct SlotGuard<K: Eq + Hash> {
    held: Option<OwnedMutexGuard<()>>,
    slot: Arc<AsyncMutex<()>>,
    key: K,
    slots: Slots<K>,
}

impl<K: Eq + Hash> Drop for SlotGuard<K> {
    fn drop(&mut self) {
        self.held.take();
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // The map and this guard are the only owners left.
        if Arc::strong_count(&self.slot) == 2 {
            slots.remove(&self.key);
        }
    }
}

impl<K: Eq + Hash + Send> SubscriptionLockGuard for SlotGuard<K> {}

/// Serializes writers within this process only; multi-instance deployments
/// use the PostgreSQL advisory-lock adapter.
#[derive(Default)]
pub struct InMemorySubscriptionLocker {
    keys: KeyedLocks<SubscriptionKey>,
    subscribers: KeyedLocks<SubscriberId>,
}

impl InMemorySubscriptionLocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys and subscribers currently locked or awaited.
    pub fn tracked(&self) -> usize {
        self.keys.len() + self.subscribers.len()
    }
}

#[async_trait]
impl SubscriptionLocker for InMemorySubscriptionLocker {
    async fn lock(
        &self,
        key: &SubscriptionKey,
    ) -> Result<Box<dyn SubscriptionLockGuard>, DomainError> {
        Ok(Box::new(self.keys.acquire(key).await))
    }

    async fn lock_subscriber(
        &self,
        subscriber_id: &SubscriberId,
    ) -> Result<Box<dyn SubscriptionLockGuard>, DomainError> {
        Ok(Box::new(self.subscribers.acquire(subscriber_id).await))
    }
}
