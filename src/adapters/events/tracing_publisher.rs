//! Event publisher that emits subscription changes as structured log records.
//!
//! The default publisher when the host has not wired its own outbound
//! webhook dispatcher.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;
use crate::domain::subscription::SubscriptionChanged;
use crate::ports::EventPublisher;

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventPublisher;

impl TracingEventPublisher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventPublisher for TracingEventPublisher {
    async fn publish(&self, event: &SubscriptionChanged) -> Result<(), DomainError> {
        tracing::info!(
            target: "iap_reconciler::events",
            subscription_id = %event.subscription_id,
            subscriber_id = %event.subscriber_id,
            app_id = %event.app_id,
            platform = %event.platform,
            original_transaction_id = %event.original_transaction_id,
            event = %event.event,
            previous_status = ?event.previous_status,
            status = %event.status,
            "subscription changed"
        );
        Ok(())
    }
}
