//! PostgreSQL webhook event ledger.
//!
//! `claim` is a single `INSERT ... ON CONFLICT DO UPDATE ... WHERE` so the
//! primary key on `(platform, provider_event_id)` serializes concurrent
//! deliveries of the same event.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::foundation::{AppId, DomainError, ErrorCode, Timestamp};
use crate::domain::subscription::Platform;
use crate::ports::{
    ClaimOutcome, NewWebhookEvent, ProcessingResult, WebhookEventRecord, WebhookEventRepository,
};

use super::{db_error, parse_column};

/// Upper bound on claim leases (one year).
const MAX_LEASE_SECS: i64 = 365 * 24 * 3600;

pub struct PostgresWebhookEventRepository {
    pool: PgPool,
}

impl PostgresWebhookEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WebhookEventRow {
    app_id: Uuid,
    platform: String,
    provider_event_id: String,
    event_type: String,
    payload: Json<serde_json::Value>,
    received_at: DateTime<Utc>,
    claimed_at: Option<DateTime<Utc>>,
    processed_at: Option<DateTime<Utc>>,
    result: Option<String>,
    error_message: Option<String>,
    attempts: i32,
}

impl TryFrom<WebhookEventRow> for WebhookEventRecord {
    type Error = DomainError;

    fn try_from(row: WebhookEventRow) -> Result<Self, Self::Error> {
        Ok(WebhookEventRecord {
            app_id: AppId::from_uuid(row.app_id),
            platform: parse_column("platform", &row.platform)?,
            provider_event_id: row.provider_event_id,
            event_type: row.event_type,
            payload: row.payload.0,
            received_at: Timestamp::from_datetime(row.received_at),
            claimed_at: row.claimed_at.map(Timestamp::from_datetime),
            processed_at: row.processed_at.map(Timestamp::from_datetime),
            result: row
                .result
                .as_deref()
                .map(|r| parse_column::<ProcessingResult>("result", r))
                .transpose()?,
            error_message: row.error_message,
            attempts: row.attempts,
        })
    }
}

fn not_found(platform: Platform, provider_event_id: &str) -> DomainError {
    DomainError::new(
        ErrorCode::NotFound,
        format!("Webhook event {}:{} not found", platform, provider_event_id),
    )
}

#[async_trait]
impl WebhookEventRepository for PostgresWebhookEventRepository {
    async fn claim(
        &self,
        event: NewWebhookEvent,
        lease: Duration,
    ) -> Result<ClaimOutcome, DomainError> {
        let now = Timestamp::now();
        let lease_secs = i64::try_from(lease.as_secs())
            .unwrap_or(MAX_LEASE_SECS)
            .min(MAX_LEASE_SECS);
        let stale_before = now.plus_secs(-lease_secs);

        let claimed: Option<(i32,)> = sqlx::query_as(
            r#"
            INSERT INTO webhook_events (
                platform, provider_event_id, app_id, event_type, payload,
                received_at, claimed_at, attempts
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, 1)
            ON CONFLICT (platform, provider_event_id) DO UPDATE SET
                claimed_at = EXCLUDED.claimed_at,
                attempts = webhook_events.attempts + 1
            WHERE webhook_events.processed_at IS NULL
              AND (webhook_events.claimed_at IS NULL OR webhook_events.claimed_at <= $8)
            RETURNING attempts
            "#,
        )
        .bind(event.platform.as_str())
        .bind(&event.provider_event_id)
        .bind(event.app_id.as_uuid())
        .bind(&event.event_type)
        .bind(Json(&event.payload))
        .bind(event.received_at.as_datetime())
        .bind(now.as_datetime())
        .bind(stale_before.as_datetime())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to claim webhook event", e))?;

        if let Some((attempts,)) = claimed {
            if attempts > 1 {
                tracing::info!(
                    platform = %event.platform,
                    event_id = %event.provider_event_id,
                    attempts,
                    "Re-claimed webhook event"
                );
            }
            return Ok(ClaimOutcome::Claimed);
        }

        let processed: Option<(Option<DateTime<Utc>>,)> = sqlx::query_as(
            "SELECT processed_at FROM webhook_events WHERE platform = $1 AND provider_event_id = $2",
        )
        .bind(event.platform.as_str())
        .bind(&event.provider_event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to read webhook event", e))?;

        match processed {
            Some((Some(_),)) => Ok(ClaimOutcome::AlreadyProcessed),
            _ => Ok(ClaimOutcome::InProgress),
        }
    }

    async fn mark_processed(
        &self,
        platform: Platform,
        provider_event_id: &str,
        result: ProcessingResult,
        message: Option<String>,
    ) -> Result<(), DomainError> {
        let outcome = sqlx::query(
            r#"
            UPDATE webhook_events SET
                processed_at = $3,
                claimed_at = NULL,
                result = $4,
                error_message = $5
            WHERE platform = $1 AND provider_event_id = $2
            "#,
        )
        .bind(platform.as_str())
        .bind(provider_event_id)
        .bind(Timestamp::now().as_datetime())
        .bind(result.as_str())
        .bind(message)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to mark webhook event processed", e))?;

        if outcome.rows_affected() == 0 {
            return Err(not_found(platform, provider_event_id));
        }
        Ok(())
    }

    async fn release(
        &self,
        platform: Platform,
        provider_event_id: &str,
        error: &str,
    ) -> Result<(), DomainError> {
        let outcome = sqlx::query(
            r#"
            UPDATE webhook_events SET
                claimed_at = NULL,
                error_message = $3
            WHERE platform = $1 AND provider_event_id = $2 AND processed_at IS NULL
            "#,
        )
        .bind(platform.as_str())
        .bind(provider_event_id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to release webhook event", e))?;

        if outcome.rows_affected() == 0 {
            tracing::debug!(
                platform = %platform,
                event_id = provider_event_id,
                "Release found no unprocessed webhook event"
            );
        }
        Ok(())
    }

    async fn find(
        &self,
        platform: Platform,
        provider_event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError> {
        let row: Option<WebhookEventRow> = sqlx::query_as(
            r#"
            SELECT app_id, platform, provider_event_id, event_type, payload, received_at,
                   claimed_at, processed_at, result, error_message, attempts
            FROM webhook_events
            WHERE platform = $1 AND provider_event_id = $2
            "#,
        )
        .bind(platform.as_str())
        .bind(provider_event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load webhook event", e))?;

        row.map(WebhookEventRecord::try_from).transpose()
    }

    async fn delete_processed_before(&self, before: Timestamp) -> Result<u64, DomainError> {
        let result = sqlx::query(
            "DELETE FROM webhook_events WHERE processed_at IS NOT NULL AND processed_at < $1",
        )
        .bind(before.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to purge webhook events", e))?;

        Ok(result.rows_affected())
    }
}
