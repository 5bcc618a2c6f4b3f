//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresCatalog` - app registry and product catalog (read-only)
//! - `PostgresSubscriberRepository` / `PostgresSubscriptionRepository`
//! - `PostgresEntitlementRepository` / `PostgresEntitlementOverrideRepository`
//! - `PostgresWebhookEventRepository` - idempotency ledger
//! - `PostgresSubscriptionLocker` - transaction-scoped advisory locks on a dedicated pool
//!
//! Queries are runtime-checked (`sqlx::query`) and bind enum columns as
//! their snake_case names.

mod catalog;
mod entitlement_repository;
mod subscriber_repository;
mod subscription_locker;
mod subscription_repository;
mod webhook_event_repository;

pub use catalog::PostgresCatalog;
pub use entitlement_repository::{
    PostgresEntitlementOverrideRepository, PostgresEntitlementRepository,
};
pub use subscriber_repository::PostgresSubscriberRepository;
pub use subscription_locker::PostgresSubscriptionLocker;
pub use subscription_repository::PostgresSubscriptionRepository;
pub use webhook_event_repository::PostgresWebhookEventRepository;

use std::fmt::Display;
use std::str::FromStr;

use crate::domain::foundation::{DomainError, ErrorCode};

/// Wraps a sqlx error as a `DatabaseError` with context.
fn db_error(context: &str, err: sqlx::Error) -> DomainError {
    tracing::error!(error = %err, context, "Database operation failed");
    DomainError::new(ErrorCode::DatabaseError, format!("{}: {}", context, err))
}

/// Returns true if `err` violated the named unique constraint.
fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint() == Some(constraint),
        _ => false,
    }
}

/// Parses a stored enum column.
fn parse_column<T>(column: &str, value: &str) -> Result<T, DomainError>
where
    T: FromStr,
    T::Err: Display,
{
    value.parse::<T>().map_err(|e| {
        DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid {} value '{}': {}", column, value, e),
        )
    })
}
