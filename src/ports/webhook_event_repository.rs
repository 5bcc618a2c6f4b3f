//! WebhookEventRepository port - the store notification ledger.
//!
//! Every inbound store notification is recorded here, keyed by
//! `(platform, provider_event_id)`. The ledger is what makes webhook handling
//! take effect at most once under at-least-once delivery.
//!
//! ## Claim protocol
//!
//! 1. `claim` inserts the row, or re-claims it if an earlier claim lapsed.
//!    It is a single atomic statement backed by the unique constraint.
//! 2. The caller reconciles.
//! 3. On commit, `mark_processed`. On a retryable failure, `release`, so the
//!    store's redelivery can claim the event again.
//!
//! Stores redeliver on non-2xx, on timeouts, and sometimes for no visible
//! reason. All handlers behind the ledger must be idempotent regardless.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::foundation::{AppId, DomainError, Timestamp, ValidationError};
use crate::domain::subscription::Platform;

/// Ledger row to create when a notification arrives.
#[derive(Debug, Clone, PartialEq)]
pub struct NewWebhookEvent {
    pub app_id: AppId,
    pub platform: Platform,
    /// Store event identifier (Apple `notificationUUID`, Pub/Sub `messageId`).
    pub provider_event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub received_at: Timestamp,
}

/// Final outcome recorded on a processed ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingResult {
    /// A subscription was reconciled.
    Success,
    /// Acknowledged without effect (unknown subscription, unmapped type).
    Ignored,
    /// Terminal failure; redelivery would not help.
    Failed,
}

impl ProcessingResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingResult::Success => "success",
            ProcessingResult::Ignored => "ignored",
            ProcessingResult::Failed => "failed",
        }
    }
}

impl fmt::Display for ProcessingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingResult {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(ProcessingResult::Success),
            "ignored" => Ok(ProcessingResult::Ignored),
            "failed" => Ok(ProcessingResult::Failed),
            other => Err(ValidationError::invalid_format(
                "result",
                format!("unknown processing result '{}'", other),
            )),
        }
    }
}

/// Stored ledger row.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEventRecord {
    pub app_id: AppId,
    pub platform: Platform,
    pub provider_event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub received_at: Timestamp,
    /// Set while a delivery holds the event.
    pub claimed_at: Option<Timestamp>,
    /// `None` means received but not yet confirmed processed.
    pub processed_at: Option<Timestamp>,
    pub result: Option<ProcessingResult>,
    /// Last failure or ignore reason.
    pub error_message: Option<String>,
    pub attempts: i32,
}

impl WebhookEventRecord {
    /// Row state right after a first successful claim.
    pub fn claimed(event: NewWebhookEvent, now: Timestamp) -> Self {
        Self {
            app_id: event.app_id,
            platform: event.platform,
            provider_event_id: event.provider_event_id,
            event_type: event.event_type,
            payload: event.payload,
            received_at: event.received_at,
            claimed_at: Some(now),
            processed_at: None,
            result: None,
            error_message: None,
            attempts: 1,
        }
    }

    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }

    /// Returns true if an unprocessed row may be claimed at `now`.
    pub fn is_claimable(&self, now: Timestamp, lease: Duration) -> bool {
        if self.is_processed() {
            return false;
        }
        match self.claimed_at {
            None => true,
            Some(claimed_at) => {
                // Capped at a year so the addition stays in range.
                let lease_secs = i64::try_from(lease.as_secs())
                    .unwrap_or(i64::MAX)
                    .min(365 * 24 * 3600);
                !claimed_at.plus_secs(lease_secs).is_after(&now)
            }
        }
    }
}

/// Result of attempting to claim an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This delivery owns the event and must process it.
    Claimed,
    /// The event was already processed; acknowledge and do nothing.
    AlreadyProcessed,
    /// Another delivery holds an unexpired claim.
    InProgress,
}

/// Port for the webhook event ledger.
///
/// Implementations must use the `(platform, provider_event_id)` unique
/// constraint as the serialization point, never a read-then-write check.
#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    /// Atomically record and claim an event.
    ///
    /// A claim older than `lease` is treated as abandoned and taken over.
    async fn claim(
        &self,
        event: NewWebhookEvent,
        lease: Duration,
    ) -> Result<ClaimOutcome, DomainError>;

    /// Mark a claimed event processed with its final result.
    async fn mark_processed(
        &self,
        platform: Platform,
        provider_event_id: &str,
        result: ProcessingResult,
        message: Option<String>,
    ) -> Result<(), DomainError>;

    /// Drop the claim without marking the event processed.
    async fn release(
        &self,
        platform: Platform,
        provider_event_id: &str,
        error: &str,
    ) -> Result<(), DomainError>;

    async fn find(
        &self,
        platform: Platform,
        provider_event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError>;

    /// Delete processed rows older than `before`. Unprocessed rows are kept.
    ///
    /// Returns the number of rows deleted.
    async fn delete_processed_before(&self, before: Timestamp) -> Result<u64, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> WebhookEventRecord {
        WebhookEventRecord::claimed(
            NewWebhookEvent {
                app_id: AppId::new(),
                platform: Platform::Ios,
                provider_event_id: "evt-1".to_string(),
                event_type: "DID_RENEW".to_string(),
                payload: serde_json::json!({}),
                received_at: Timestamp::now(),
            },
            Timestamp::now(),
        )
    }

    #[test]
    fn webhook_event_repository_is_object_safe() {
        fn _accepts_dyn(_repo: &dyn WebhookEventRepository) {}
    }

    #[test]
    fn fresh_claim_is_not_claimable() {
        let record = record();
        assert!(!record.is_claimable(Timestamp::now(), Duration::from_secs(60)));
    }

    #[test]
    fn lapsed_claim_is_claimable() {
        let mut record = record();
        record.claimed_at = Some(Timestamp::now().plus_secs(-120));
        assert!(record.is_claimable(Timestamp::now(), Duration::from_secs(60)));
    }

    #[test]
    fn released_row_is_claimable() {
        let mut record = record();
        record.claimed_at = None;
        assert!(record.is_claimable(Timestamp::now(), Duration::from_secs(60)));
    }

    #[test]
    fn processed_row_is_never_claimable() {
        let mut record = record();
        record.claimed_at = None;
        record.processed_at = Some(Timestamp::now());
        assert!(!record.is_claimable(Timestamp::now().plus_days(1), Duration::from_secs(0)));
    }

    #[test]
    fn processing_result_round_trips() {
        for r in [
            ProcessingResult::Success,
            ProcessingResult::Ignored,
            ProcessingResult::Failed,
        ] {
            assert_eq!(r.as_str().parse::<ProcessingResult>().unwrap(), r);
        }
    }
}
