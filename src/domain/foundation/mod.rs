//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, timestamps and error types that form the
//! vocabulary of the reconciliation domain.

mod errors;
mod ids;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{AppId, AppUserId, EntitlementId, ProductId, SubscriberId, SubscriptionId};
pub use timestamp::Timestamp;
