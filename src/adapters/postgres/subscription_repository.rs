//! PostgreSQL implementation of SubscriptionRepository.
//!
//! Updates are guarded by the `version` column; a row that moved on since
//! it was loaded yields `ConcurrencyConflict`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{
    AppId, DomainError, ErrorCode, ProductId, SubscriberId, SubscriptionId, Timestamp,
};
use crate::domain::subscription::{Subscription, SubscriptionKey};
use crate::ports::SubscriptionRepository;

use super::{db_error, is_unique_violation, parse_column};

const NATURAL_KEY_CONSTRAINT: &str = "subscriptions_platform_original_transaction_id_key";

const COLUMNS: &str = r#"
    id, subscriber_id, app_id, platform, product_id, store_product_id, status,
    original_transaction_id, latest_transaction_id, purchase_date, expires_date,
    auto_renew_enabled, is_trial_period, is_in_intro_offer_period,
    grace_period_expires_date, canceled_at, cancellation_reason, environment,
    created_at, updated_at, version
"#;

pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    subscriber_id: Uuid,
    app_id: Uuid,
    platform: String,
    product_id: Uuid,
    store_product_id: String,
    status: String,
    original_transaction_id: String,
    latest_transaction_id: String,
    purchase_date: DateTime<Utc>,
    expires_date: Option<DateTime<Utc>>,
    auto_renew_enabled: bool,
    is_trial_period: bool,
    is_in_intro_offer_period: bool,
    grace_period_expires_date: Option<DateTime<Utc>>,
    canceled_at: Option<DateTime<Utc>>,
    cancellation_reason: Option<String>,
    environment: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i32,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            subscriber_id: SubscriberId::from_uuid(row.subscriber_id),
            app_id: AppId::from_uuid(row.app_id),
            platform: parse_column("platform", &row.platform)?,
            product_id: ProductId::from_uuid(row.product_id),
            store_product_id: row.store_product_id,
            status: parse_column("status", &row.status)?,
            original_transaction_id: row.original_transaction_id,
            latest_transaction_id: row.latest_transaction_id,
            purchase_date: Timestamp::from_datetime(row.purchase_date),
            expires_date: row.expires_date.map(Timestamp::from_datetime),
            auto_renew_enabled: row.auto_renew_enabled,
            is_trial_period: row.is_trial_period,
            is_in_intro_offer_period: row.is_in_intro_offer_period,
            grace_period_expires_date: row.grace_period_expires_date.map(Timestamp::from_datetime),
            canceled_at: row.canceled_at.map(Timestamp::from_datetime),
            cancellation_reason: row.cancellation_reason,
            environment: parse_column("environment", &row.environment)?,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
            version: row.version,
        })
    }
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn insert(&self, subscription: &Subscription) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, subscriber_id, app_id, platform, product_id, store_product_id, status,
                original_transaction_id, latest_transaction_id, purchase_date, expires_date,
                auto_renew_enabled, is_trial_period, is_in_intro_offer_period,
                grace_period_expires_date, canceled_at, cancellation_reason, environment,
                created_at, updated_at, version
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                $18, $19, $20, $21
            )
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.subscriber_id.as_uuid())
        .bind(subscription.app_id.as_uuid())
        .bind(subscription.platform.as_str())
        .bind(subscription.product_id.as_uuid())
        .bind(&subscription.store_product_id)
        .bind(subscription.status.as_str())
        .bind(&subscription.original_transaction_id)
        .bind(&subscription.latest_transaction_id)
        .bind(subscription.purchase_date.as_datetime())
        .bind(subscription.expires_date.map(|t| *t.as_datetime()))
        .bind(subscription.auto_renew_enabled)
        .bind(subscription.is_trial_period)
        .bind(subscription.is_in_intro_offer_period)
        .bind(subscription.grace_period_expires_date.map(|t| *t.as_datetime()))
        .bind(subscription.canceled_at.map(|t| *t.as_datetime()))
        .bind(&subscription.cancellation_reason)
        .bind(subscription.environment.as_str())
        .bind(subscription.created_at.as_datetime())
        .bind(subscription.updated_at.as_datetime())
        .bind(subscription.version)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, NATURAL_KEY_CONSTRAINT) {
                return DomainError::new(
                    ErrorCode::AlreadyExists,
                    format!("Subscription {} already exists", subscription.key()),
                );
            }
            db_error("Failed to insert subscription", e)
        })?;

        Ok(())
    }

    async fn update(
        &self,
        subscription: &Subscription,
        expected_version: i32,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET
                subscriber_id = $2,
                product_id = $3,
                store_product_id = $4,
                status = $5,
                latest_transaction_id = $6,
                purchase_date = $7,
                expires_date = $8,
                auto_renew_enabled = $9,
                is_trial_period = $10,
                is_in_intro_offer_period = $11,
                grace_period_expires_date = $12,
                canceled_at = $13,
                cancellation_reason = $14,
                environment = $15,
                updated_at = $16,
                version = $17
            WHERE id = $1 AND version = $18
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.subscriber_id.as_uuid())
        .bind(subscription.product_id.as_uuid())
        .bind(&subscription.store_product_id)
        .bind(subscription.status.as_str())
        .bind(&subscription.latest_transaction_id)
        .bind(subscription.purchase_date.as_datetime())
        .bind(subscription.expires_date.map(|t| *t.as_datetime()))
        .bind(subscription.auto_renew_enabled)
        .bind(subscription.is_trial_period)
        .bind(subscription.is_in_intro_offer_period)
        .bind(subscription.grace_period_expires_date.map(|t| *t.as_datetime()))
        .bind(subscription.canceled_at.map(|t| *t.as_datetime()))
        .bind(&subscription.cancellation_reason)
        .bind(subscription.environment.as_str())
        .bind(subscription.updated_at.as_datetime())
        .bind(subscription.version)
        .bind(expected_version)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update subscription", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::ConcurrencyConflict,
                format!(
                    "Subscription {} is not at version {}",
                    subscription.id, expected_version
                ),
            ));
        }

        Ok(())
    }

    async fn find_by_key(
        &self,
        key: &SubscriptionKey,
    ) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM subscriptions WHERE platform = $1 AND original_transaction_id = $2",
            COLUMNS
        ))
        .bind(key.platform.as_str())
        .bind(&key.original_transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load subscription", e))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> =
            sqlx::query_as(&format!("SELECT {} FROM subscriptions WHERE id = $1", COLUMNS))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("Failed to load subscription", e))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn list_for_subscriber(
        &self,
        subscriber_id: &SubscriberId,
    ) -> Result<Vec<Subscription>, DomainError> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM subscriptions WHERE subscriber_id = $1 ORDER BY created_at",
            COLUMNS
        ))
        .bind(subscriber_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list subscriptions", e))?;

        rows.into_iter().map(Subscription::try_from).collect()
    }
}
