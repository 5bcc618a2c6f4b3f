//! In-memory webhook ledger.
//!
//! The write lock around each operation plays the role of the unique
//! constraint: claim is a single critical section.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::domain::subscription::Platform;
use crate::ports::{
    ClaimOutcome, NewWebhookEvent, ProcessingResult, WebhookEventRecord, WebhookEventRepository,
};

use super::{read, write};

#[derive(Default)]
pub struct InMemoryWebhookEventRepository {
    records: RwLock<HashMap<(Platform, String), WebhookEventRecord>>,
}

impl InMemoryWebhookEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        read(&self.records).len()
    }
}

fn not_found(platform: Platform, provider_event_id: &str) -> DomainError {
    DomainError::new(
        ErrorCode::NotFound,
        format!("Webhook event {}:{} not found", platform, provider_event_id),
    )
}

#[async_trait]
impl WebhookEventRepository for InMemoryWebhookEventRepository {
    async fn claim(
        &self,
        event: NewWebhookEvent,
        lease: Duration,
    ) -> Result<ClaimOutcome, DomainError> {
        let now = Timestamp::now();
        let mut records = write(&self.records);
        let key = (event.platform, event.provider_event_id.clone());

        match records.get_mut(&key) {
            None => {
                records.insert(key, WebhookEventRecord::claimed(event, now));
                Ok(ClaimOutcome::Claimed)
            }
            Some(existing) if existing.is_processed() => Ok(ClaimOutcome::AlreadyProcessed),
            Some(existing) if existing.is_claimable(now, lease) => {
                existing.claimed_at = Some(now);
                existing.attempts += 1;
                Ok(ClaimOutcome::Claimed)
            }
            Some(_) => Ok(ClaimOutcome::InProgress),
        }
    }

    async fn mark_processed(
        &self,
        platform: Platform,
        provider_event_id: &str,
        result: ProcessingResult,
        message: Option<String>,
    ) -> Result<(), DomainError> {
        let mut records = write(&self.records);
        let record = records
            .get_mut(&(platform, provider_event_id.to_string()))
            .ok_or_else(|| not_found(platform, provider_event_id))?;
        record.processed_at = Some(Timestamp::now());
        record.claimed_at = None;
        record.result = Some(result);
        record.error_message = message;
        Ok(())
    }

    async fn release(
        &self,
        platform: Platform,
        provider_event_id: &str,
        error: &str,
    ) -> Result<(), DomainError> {
        let mut records = write(&self.records);
        let record = records
            .get_mut(&(platform, provider_event_id.to_string()))
            .ok_or_else(|| not_found(platform, provider_event_id))?;
        if !record.is_processed() {
            record.claimed_at = None;
            record.error_message = Some(error.to_string());
        }
        Ok(())
    }

    async fn find(
        &self,
        platform: Platform,
        provider_event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError> {
        Ok(read(&self.records)
            .get(&(platform, provider_event_id.to_string()))
            .cloned())
    }

    async fn delete_processed_before(&self, before: Timestamp) -> Result<u64, DomainError> {
        let mut records = write(&self.records);
        let before_count = records.len();
        records.retain(|_, r| match r.processed_at {
            Some(processed_at) => !processed_at.is_before(&before),
            None => true,
        });
        Ok((before_count - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::AppId;

    const LEASE: Duration = Duration::from_secs(60);

    fn event(id: &str) -> NewWebhookEvent {
        NewWebhookEvent {
            app_id: AppId::new(),
            platform: Platform::Ios,
            provider_event_id: id.to_string(),
            event_type: "DID_RENEW".to_string(),
            payload: serde_json::json!({}),
            received_at: Timestamp::now(),
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Claim protocol
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn first_delivery_claims() {
        let repo = InMemoryWebhookEventRepository::new();
        assert_eq!(repo.claim(event("a"), LEASE).await.unwrap(), ClaimOutcome::Claimed);
    }

    #[tokio::test]
    async fn concurrent_delivery_sees_in_progress() {
        let repo = InMemoryWebhookEventRepository::new();
        repo.claim(event("a"), LEASE).await.unwrap();
        assert_eq!(repo.claim(event("a"), LEASE).await.unwrap(), ClaimOutcome::InProgress);
    }

    #[tokio::test]
    async fn processed_event_is_duplicate() {
        let repo = InMemoryWebhookEventRepository::new();
        repo.claim(event("a"), LEASE).await.unwrap();
        repo.mark_processed(Platform::Ios, "a", ProcessingResult::Success, None)
            .await
            .unwrap();

        assert_eq!(
            repo.claim(event("a"), LEASE).await.unwrap(),
            ClaimOutcome::AlreadyProcessed
        );
    }

    #[tokio::test]
    async fn released_event_can_be_reclaimed() {
        let repo = InMemoryWebhookEventRepository::new();
        repo.claim(event("a"), LEASE).await.unwrap();
        repo.release(Platform::Ios, "a", "store unavailable").await.unwrap();

        assert_eq!(repo.claim(event("a"), LEASE).await.unwrap(), ClaimOutcome::Claimed);
        let record = repo.find(Platform::Ios, "a").await.unwrap().unwrap();
        assert_eq!(record.attempts, 2);
        assert_eq!(record.error_message.as_deref(), Some("store unavailable"));
    }

    #[tokio::test]
    async fn abandoned_claim_is_taken_over() {
        let repo = InMemoryWebhookEventRepository::new();
        repo.claim(event("a"), LEASE).await.unwrap();
        assert_eq!(
            repo.claim(event("a"), Duration::from_secs(0)).await.unwrap(),
            ClaimOutcome::Claimed
        );
    }

    #[tokio::test]
    async fn same_id_on_other_platform_is_separate() {
        let repo = InMemoryWebhookEventRepository::new();
        repo.claim(event("a"), LEASE).await.unwrap();
        let mut android = event("a");
        android.platform = Platform::Android;
        assert_eq!(repo.claim(android, LEASE).await.unwrap(), ClaimOutcome::Claimed);
    }

    // ══════════════════════════════════════════════════════════════
    // Retention
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn purge_keeps_unprocessed_rows() {
        let repo = InMemoryWebhookEventRepository::new();
        repo.claim(event("done"), LEASE).await.unwrap();
        repo.claim(event("pending"), LEASE).await.unwrap();
        repo.mark_processed(Platform::Ios, "done", ProcessingResult::Ignored, None)
            .await
            .unwrap();

        let deleted = repo
            .delete_processed_before(Timestamp::now().plus_days(1))
            .await
            .unwrap();

        assert_eq!(deleted, 1);
        assert!(repo.find(Platform::Ios, "pending").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn marking_unknown_event_fails() {
        let repo = InMemoryWebhookEventRepository::new();
        let err = repo
            .mark_processed(Platform::Ios, "missing", ProcessingResult::Success, None)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }
}
