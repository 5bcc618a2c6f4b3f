//! PostgreSQL implementation of SubscriberRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::foundation::{
    AppId, AppUserId, DomainError, ErrorCode, SubscriberId, Timestamp,
};
use crate::domain::subscriber::Subscriber;
use crate::ports::SubscriberRepository;

use super::db_error;

pub struct PostgresSubscriberRepository {
    pool: PgPool,
}

impl PostgresSubscriberRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriberRow {
    id: Uuid,
    app_id: Uuid,
    app_user_id: String,
    attributes: Json<HashMap<String, String>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<SubscriberRow> for Subscriber {
    type Error = DomainError;

    fn try_from(row: SubscriberRow) -> Result<Self, Self::Error> {
        Ok(Subscriber {
            id: SubscriberId::from_uuid(row.id),
            app_id: AppId::from_uuid(row.app_id),
            app_user_id: AppUserId::new(row.app_user_id).map_err(|e| {
                DomainError::new(ErrorCode::DatabaseError, format!("Invalid app_user_id: {}", e))
            })?,
            attributes: row.attributes.0,
            created_at: Timestamp::from_datetime(row.created_at),
        })
    }
}

#[async_trait]
impl SubscriberRepository for PostgresSubscriberRepository {
    async fn get_or_create(
        &self,
        app_id: &AppId,
        app_user_id: &AppUserId,
    ) -> Result<Subscriber, DomainError> {
        let candidate = Subscriber::new(*app_id, app_user_id.clone());

        // The no-op update makes RETURNING yield the existing row on conflict.
        let row: SubscriberRow = sqlx::query_as(
            r#"
            INSERT INTO subscribers (id, app_id, app_user_id, attributes, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT ON CONSTRAINT subscribers_app_user_key
            DO UPDATE SET app_user_id = EXCLUDED.app_user_id
            RETURNING id, app_id, app_user_id, attributes, created_at
            "#,
        )
        .bind(candidate.id.as_uuid())
        .bind(app_id.as_uuid())
        .bind(app_user_id.as_str())
        .bind(Json(&candidate.attributes))
        .bind(candidate.created_at.as_datetime())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get or create subscriber", e))?;

        let subscriber = Subscriber::try_from(row)?;
        if subscriber.id == candidate.id {
            tracing::info!(
                subscriber_id = %subscriber.id,
                app_id = %app_id,
                "Created subscriber"
            );
        }
        Ok(subscriber)
    }

    async fn find_by_app_user(
        &self,
        app_id: &AppId,
        app_user_id: &AppUserId,
    ) -> Result<Option<Subscriber>, DomainError> {
        let row: Option<SubscriberRow> = sqlx::query_as(
            r#"
            SELECT id, app_id, app_user_id, attributes, created_at
            FROM subscribers
            WHERE app_id = $1 AND app_user_id = $2
            "#,
        )
        .bind(app_id.as_uuid())
        .bind(app_user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load subscriber", e))?;

        row.map(Subscriber::try_from).transpose()
    }

    async fn find_by_id(&self, id: &SubscriberId) -> Result<Option<Subscriber>, DomainError> {
        let row: Option<SubscriberRow> = sqlx::query_as(
            r#"
            SELECT id, app_id, app_user_id, attributes, created_at
            FROM subscribers
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load subscriber", e))?;

        row.map(Subscriber::try_from).transpose()
    }
}
