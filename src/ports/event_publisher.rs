//! EventPublisher port - Interface for publishing subscription changes.
//!
//! Called after a reconciliation has committed. The host system turns these
//! into outbound customer webhooks; the reconciliation core never calls the
//! developer's endpoint itself.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;
use crate::domain::subscription::SubscriptionChanged;

/// Port for publishing subscription change events.
///
/// Failures are reported to the caller, which logs them and carries on: the
/// subscription state is already committed at this point.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &SubscriptionChanged) -> Result<(), DomainError>;
}
