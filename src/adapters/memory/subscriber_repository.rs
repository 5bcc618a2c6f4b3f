//! In-memory subscriber repository.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::foundation::{AppId, AppUserId, DomainError, SubscriberId};
use crate::domain::subscriber::Subscriber;
use crate::ports::SubscriberRepository;

use super::{read, write};

#[derive(Default)]
pub struct InMemorySubscriberRepository {
    subscribers: RwLock<HashMap<SubscriberId, Subscriber>>,
}

impl InMemorySubscriberRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        read(&self.subscribers).len()
    }
}

#[async_trait]
impl SubscriberRepository for InMemorySubscriberRepository {
    async fn get_or_create(
        &self,
        app_id: &AppId,
        app_user_id: &AppUserId,
    ) -> Result<Subscriber, DomainError> {
        let mut subscribers = write(&self.subscribers);
        if let Some(existing) = subscribers
            .values()
            .find(|s| s.app_id == *app_id && s.app_user_id == *app_user_id)
        {
            return Ok(existing.clone());
        }
        let subscriber = Subscriber::new(*app_id, app_user_id.clone());
        subscribers.insert(subscriber.id, subscriber.clone());
        Ok(subscriber)
    }

    async fn find_by_app_user(
        &self,
        app_id: &AppId,
        app_user_id: &AppUserId,
    ) -> Result<Option<Subscriber>, DomainError> {
        Ok(read(&self.subscribers)
            .values()
            .find(|s| s.app_id == *app_id && s.app_user_id == *app_user_id)
            .cloned())
    }

    async fn find_by_id(&self, id: &SubscriberId) -> Result<Option<Subscriber>, DomainError> {
        Ok(read(&self.subscribers).get(id).cloned())
    }
}
