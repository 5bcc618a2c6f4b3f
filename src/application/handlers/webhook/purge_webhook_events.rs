//! PurgeWebhookEventsHandler - Drops processed ledger rows past retention.
//!
//! Unprocessed rows are never purged so a stuck claim stays visible.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::ports::WebhookEventRepository;

const MAX_RETENTION_SECS: i64 = 10 * 365 * 24 * 3600;

#[derive(Debug, Clone, Copy)]
pub struct PurgeWebhookEventsCommand {
    pub retention: Duration,
}

pub struct PurgeWebhookEventsHandler {
    ledger: Arc<dyn WebhookEventRepository>,
}

impl PurgeWebhookEventsHandler {
    pub fn new(ledger: Arc<dyn WebhookEventRepository>) -> Self {
        Self { ledger }
    }

    /// Returns the number of rows deleted.
    pub async fn handle(&self, cmd: PurgeWebhookEventsCommand) -> Result<u64, DomainError> {
        let retention_secs = i64::try_from(cmd.retention.as_secs())
            .ok()
            .filter(|secs| *secs <= MAX_RETENTION_SECS)
            .ok_or_else(|| {
                DomainError::new(ErrorCode::ValidationFailed, "Retention period is too large")
            })?;
        let cutoff = Timestamp::now().minus_secs(retention_secs);

        let deleted = self.ledger.delete_processed_before(cutoff).await?;
        if deleted > 0 {
            tracing::info!(deleted, cutoff = %cutoff.as_datetime(), "Purged processed webhook events");
        }
        Ok(deleted)
    }
}
