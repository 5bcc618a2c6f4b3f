//! PostgreSQL advisory-lock implementation of SubscriptionLocker.
//!
//! Each lock is a `pg_advisory_xact_lock` taken inside a transaction that
//! the guard owns. Dropping the guard rolls the transaction back, which
//! releases the lock, so a panicking or cancelled task never leaks it.
//!
//! Lock transactions come from a dedicated pool; the reconciliation's own
//! queries use the data pool. Key locks may occupy all but one lock
//! connection, so a key holder can always obtain its subscriber lock.

use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::domain::foundation::{DomainError, ErrorCode, SubscriberId};
use crate::domain::subscription::SubscriptionKey;
use crate::ports::{SubscriptionLockGuard, SubscriptionLocker};

use super::db_error;

pub struct PostgresSubscriptionLocker {
    lock_pool: PgPool,
    key_slots: Arc<Semaphore>,
}

impl PostgresSubscriptionLocker {
    /// `lock_pool` must not be shared with data queries.
    pub fn new(lock_pool: PgPool) -> Self {
        let max = lock_pool.options().get_max_connections();
        Self {
            key_slots: Arc::new(Semaphore::new(key_slot_count(max))),
            lock_pool,
        }
    }

    async fn advisory_lock(
        &self,
        scope: &str,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Result<Box<dyn SubscriptionLockGuard>, DomainError> {
        let mut tx = self.lock_pool.begin().await.map_err(|e| {
            tracing::error!(error = %e, scope, "Cannot open lock transaction");
            DomainError::new(
                ErrorCode::LockUnavailable,
                format!("Cannot lock {}: {}", scope, e),
            )
        })?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(advisory_key(scope))
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to take advisory lock", e))?;

        Ok(Box::new(AdvisoryLockGuard {
            _tx: tx,
            _permit: permit,
        }))
    }
}

/// Field order matters: the transaction is released before the permit.
struct AdvisoryLockGuard {
    _tx: Transaction<'static, Postgres>,
    _permit: Option<OwnedSemaphorePermit>,
}

impl SubscriptionLockGuard for AdvisoryLockGuard {}

fn key_slot_count(lock_connections: u32) -> usize {
    (lock_connections.saturating_sub(1) as usize).max(1)
}

/// Stable 64-bit advisory lock key for a lock scope.
fn advisory_key(scope: &str) -> i64 {
    let digest = Sha256::digest(scope.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(bytes)
}

fn key_scope(key: &SubscriptionKey) -> String {
    format!("subscription:{}", key)
}

fn subscriber_scope(subscriber_id: &SubscriberId) -> String {
    format!("subscriber:{}", subscriber_id)
}

#[async_trait]
impl SubscriptionLocker for PostgresSubscriptionLocker {
    async fn lock(
        &self,
        key: &SubscriptionKey,
    ) -> Result<Box<dyn SubscriptionLockGuard>, DomainError> {
        let permit = self.key_slots.clone().acquire_owned().await.map_err(|e| {
            DomainError::new(
                ErrorCode::LockUnavailable,
                format!("Cannot lock subscription {}: {}", key, e),
            )
        })?;
        self.advisory_lock(&key_scope(key), Some(permit)).await
    }

    async fn lock_subscriber(
        &self,
        subscriber_id: &SubscriberId,
    ) -> Result<Box<dyn SubscriptionLockGuard>, DomainError> {
        self.advisory_lock(&subscriber_scope(subscriber_id), None)
            .await
    }
}
