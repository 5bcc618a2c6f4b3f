//! PostgreSQL implementations of EntitlementRepository and EntitlementOverrideRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entitlement::{ManualOverride, SubscriberEntitlement};
use crate::domain::foundation::{
    DomainError, EntitlementId, SubscriberId, SubscriptionId, Timestamp,
};
use crate::ports::{EntitlementOverrideRepository, EntitlementRepository};

use super::{db_error, parse_column};

pub struct PostgresEntitlementRepository {
    pool: PgPool,
}

impl PostgresEntitlementRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriberEntitlementRow {
    subscriber_id: Uuid,
    entitlement_id: Uuid,
    identifier: String,
    is_active: bool,
    expires_at: Option<DateTime<Utc>>,
    source: String,
    at_risk: bool,
    subscription_id: Option<Uuid>,
}

impl TryFrom<SubscriberEntitlementRow> for SubscriberEntitlement {
    type Error = DomainError;

    fn try_from(row: SubscriberEntitlementRow) -> Result<Self, Self::Error> {
        Ok(SubscriberEntitlement {
            subscriber_id: SubscriberId::from_uuid(row.subscriber_id),
            entitlement_id: EntitlementId::from_uuid(row.entitlement_id),
            identifier: row.identifier,
            is_active: row.is_active,
            expires_at: row.expires_at.map(Timestamp::from_datetime),
            source: parse_column("source", &row.source)?,
            at_risk: row.at_risk,
            subscription_id: row.subscription_id.map(SubscriptionId::from_uuid),
        })
    }
}

#[async_trait]
impl EntitlementRepository for PostgresEntitlementRepository {
    /// Delete-then-insert inside one transaction; readers see either set.
    async fn replace_for_subscriber(
        &self,
        subscriber_id: &SubscriberId,
        entitlements: &[SubscriberEntitlement],
    ) -> Result<(), DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        sqlx::query("DELETE FROM subscriber_entitlements WHERE subscriber_id = $1")
            .bind(subscriber_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to clear subscriber entitlements", e))?;

        let now = Timestamp::now();
        for entitlement in entitlements {
            sqlx::query(
                r#"
                INSERT INTO subscriber_entitlements (
                    subscriber_id, entitlement_id, identifier, is_active, expires_at,
                    source, at_risk, subscription_id, updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(subscriber_id.as_uuid())
            .bind(entitlement.entitlement_id.as_uuid())
            .bind(&entitlement.identifier)
            .bind(entitlement.is_active)
            .bind(entitlement.expires_at.map(|t| *t.as_datetime()))
            .bind(entitlement.source.as_str())
            .bind(entitlement.at_risk)
            .bind(entitlement.subscription_id.map(|id| *id.as_uuid()))
            .bind(now.as_datetime())
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to insert subscriber entitlement", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit entitlements", e))?;

        Ok(())
    }

    async fn list_for_subscriber(
        &self,
        subscriber_id: &SubscriberId,
    ) -> Result<Vec<SubscriberEntitlement>, DomainError> {
        let rows: Vec<SubscriberEntitlementRow> = sqlx::query_as(
            r#"
            SELECT subscriber_id, entitlement_id, identifier, is_active, expires_at,
                   source, at_risk, subscription_id
            FROM subscriber_entitlements
            WHERE subscriber_id = $1
            ORDER BY identifier, entitlement_id
            "#,
        )
        .bind(subscriber_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list subscriber entitlements", e))?;

        rows.into_iter().map(SubscriberEntitlement::try_from).collect()
    }
}

pub struct PostgresEntitlementOverrideRepository {
    pool: PgPool,
}

impl PostgresEntitlementOverrideRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OverrideRow {
    subscriber_id: Uuid,
    entitlement_id: Uuid,
    entitlement_identifier: String,
    kind: String,
    expires_at: Option<DateTime<Utc>>,
    reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<OverrideRow> for ManualOverride {
    type Error = DomainError;

    fn try_from(row: OverrideRow) -> Result<Self, Self::Error> {
        Ok(ManualOverride {
            subscriber_id: SubscriberId::from_uuid(row.subscriber_id),
            entitlement_id: EntitlementId::from_uuid(row.entitlement_id),
            entitlement_identifier: row.entitlement_identifier,
            kind: parse_column("kind", &row.kind)?,
            expires_at: row.expires_at.map(Timestamp::from_datetime),
            reason: row.reason,
            created_at: Timestamp::from_datetime(row.created_at),
        })
    }
}

#[async_trait]
impl EntitlementOverrideRepository for PostgresEntitlementOverrideRepository {
    async fn list_for_subscriber(
        &self,
        subscriber_id: &SubscriberId,
    ) -> Result<Vec<ManualOverride>, DomainError> {
        let rows: Vec<OverrideRow> = sqlx::query_as(
            r#"
            SELECT subscriber_id, entitlement_id, entitlement_identifier, kind,
                   expires_at, reason, created_at
            FROM entitlement_overrides
            WHERE subscriber_id = $1
            "#,
        )
        .bind(subscriber_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list entitlement overrides", e))?;

        rows.into_iter().map(ManualOverride::try_from).collect()
    }

    async fn upsert(&self, entry: &ManualOverride) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO entitlement_overrides (
                subscriber_id, entitlement_id, entitlement_identifier, kind,
                expires_at, reason, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (subscriber_id, entitlement_id) DO UPDATE SET
                entitlement_identifier = EXCLUDED.entitlement_identifier,
                kind = EXCLUDED.kind,
                expires_at = EXCLUDED.expires_at,
                reason = EXCLUDED.reason,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(entry.subscriber_id.as_uuid())
        .bind(entry.entitlement_id.as_uuid())
        .bind(&entry.entitlement_identifier)
        .bind(entry.kind.as_str())
        .bind(entry.expires_at.map(|t| *t.as_datetime()))
        .bind(&entry.reason)
        .bind(entry.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to upsert entitlement override", e))?;

        Ok(())
    }

    async fn delete(
        &self,
        subscriber_id: &SubscriberId,
        entitlement_id: &EntitlementId,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(
            "DELETE FROM entitlement_overrides WHERE subscriber_id = $1 AND entitlement_id = $2",
        )
        .bind(subscriber_id.as_uuid())
        .bind(entitlement_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to delete entitlement override", e))?;

        Ok(result.rows_affected() > 0)
    }
}
