//! Scriptable notification normalizer for tests and local runs.
//!
//! Webhook bodies are looked up verbatim. An unknown body is malformed, and
//! a body scripted with `reject` fails authentication.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::catalog::App;
use crate::domain::subscription::{Platform, SubscriptionFact};
use crate::ports::{DecodedNotification, NotificationNormalizer, StoreError};

use super::{read, write};

#[derive(Clone)]
struct Scripted {
    notification: DecodedNotification,
    fact: Option<SubscriptionFact>,
}

pub struct FakeNotificationNormalizer {
    platform: Platform,
    scripted: RwLock<HashMap<Vec<u8>, Scripted>>,
    rejected: RwLock<Vec<Vec<u8>>>,
    failure: RwLock<Option<StoreError>>,
    normalize_calls: RwLock<usize>,
}

impl FakeNotificationNormalizer {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            scripted: RwLock::default(),
            rejected: RwLock::default(),
            failure: RwLock::default(),
            normalize_calls: RwLock::default(),
        }
    }

    /// Make `body` decode to `notification` and normalize to `fact`.
    pub fn add(
        &self,
        body: impl Into<Vec<u8>>,
        notification: DecodedNotification,
        fact: Option<SubscriptionFact>,
    ) {
        write(&self.scripted).insert(body.into(), Scripted { notification, fact });
    }

    /// Make `body` fail signature verification.
    pub fn reject(&self, body: impl Into<Vec<u8>>) {
        write(&self.rejected).push(body.into());
    }

    /// Make every `normalize` call fail until cleared.
    pub fn fail_with(&self, error: Option<StoreError>) {
        *write(&self.failure) = error;
    }

    pub fn normalize_calls(&self) -> usize {
        *read(&self.normalize_calls)
    }
}

#[async_trait]
impl NotificationNormalizer for FakeNotificationNormalizer {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn decode(
        &self,
        body: &[u8],
        _credential: Option<&str>,
    ) -> Result<DecodedNotification, StoreError> {
        if read(&self.rejected).iter().any(|rejected| rejected == body) {
            return Err(StoreError::InvalidSignature("scripted rejection".to_string()));
        }
        read(&self.scripted)
            .get(body)
            .map(|s| s.notification.clone())
            .ok_or_else(|| StoreError::MalformedPayload("unknown notification body".to_string()))
    }

    async fn normalize(
        &self,
        _app: &App,
        notification: &DecodedNotification,
    ) -> Result<Option<SubscriptionFact>, StoreError> {
        *write(&self.normalize_calls) += 1;
        if let Some(err) = read(&self.failure).clone() {
            return Err(err);
        }
        Ok(read(&self.scripted)
            .values()
            .find(|s| s.notification.provider_event_id == notification.provider_event_id)
            .and_then(|s| s.fact.clone()))
    }
}
