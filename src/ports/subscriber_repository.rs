//! SubscriberRepository port.
//!
//! Subscribers are created lazily. There is no plain `insert`: every write
//! path goes through `get_or_create`, which must be atomic with respect to
//! concurrent first purchases for the same `(app, appUserId)`.

use async_trait::async_trait;

use crate::domain::foundation::{AppId, AppUserId, DomainError, SubscriberId};
use crate::domain::subscriber::Subscriber;

#[async_trait]
pub trait SubscriberRepository: Send + Sync {
    /// Returns the subscriber for `(app_id, app_user_id)`, creating it if needed.
    ///
    /// Implementations rely on the `(app_id, app_user_id)` unique constraint
    /// rather than a read-then-write check.
    async fn get_or_create(
        &self,
        app_id: &AppId,
        app_user_id: &AppUserId,
    ) -> Result<Subscriber, DomainError>;

    /// Find a subscriber without creating it.
    async fn find_by_app_user(
        &self,
        app_id: &AppId,
        app_user_id: &AppUserId,
    ) -> Result<Option<Subscriber>, DomainError>;

    async fn find_by_id(&self, id: &SubscriberId) -> Result<Option<Subscriber>, DomainError>;
}
