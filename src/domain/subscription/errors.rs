//! Reconciliation error taxonomy.
//!
//! Every failure on the receipt and webhook paths ends up as one of these
//! variants. The HTTP layer maps them to status codes that drive store
//! redelivery: 2xx stops retries, non-2xx asks the store to redeliver.

use axum::http::StatusCode;
use thiserror::Error;

use crate::domain::foundation::{AppId, DomainError, ErrorCode};

use super::SubscriptionKey;

/// Errors that occur while reconciling store input.
#[derive(Debug, Clone, Error)]
pub enum ReconcileError {
    /// Input cannot be parsed. Terminal.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Signature verification failed. Terminal, treated as a security event.
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Store API call failed.
    #[error("Store API error ({}): {body}", display_status(.status_code))]
    StoreApi {
        status_code: Option<u16>,
        body: String,
        transient: bool,
    },

    /// No subscription exists for the referenced original transaction.
    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(SubscriptionKey),

    /// The store rejected the receipt, or it does not match the request.
    #[error("Receipt invalid: {0}")]
    ReceiptInvalid(String),

    /// The ledger already shows this event as processed.
    #[error("Duplicate event: {0}")]
    DuplicateEvent(String),

    /// Another delivery of the same event currently holds the ledger claim.
    #[error("Event in progress: {0}")]
    EventInProgress(String),

    /// The app referenced by the request is not registered.
    #[error("App not found: {0}")]
    AppNotFound(AppId),

    /// Request input failed validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Optimistic concurrency check failed or the row lock could not be taken.
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// Persistence failed.
    #[error("Database error: {0}")]
    Database(String),
}

fn display_status(status_code: &Option<u16>) -> String {
    status_code
        .map(|code| code.to_string())
        .unwrap_or_else(|| "network".to_string())
}

impl ReconcileError {
    /// Creates a store API error, classifying 5xx and 429 as transient.
    pub fn store_api(status_code: u16, body: impl Into<String>) -> Self {
        ReconcileError::StoreApi {
            status_code: Some(status_code),
            body: body.into(),
            transient: status_code >= 500 || status_code == 429,
        }
    }

    /// Creates a transient store error for network failures and timeouts.
    pub fn store_unreachable(reason: impl Into<String>) -> Self {
        ReconcileError::StoreApi {
            status_code: None,
            body: reason.into(),
            transient: true,
        }
    }

    /// Returns true if the caller should retry (the store should redeliver).
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::StoreApi { transient, .. } => *transient,
            ReconcileError::EventInProgress(_)
            | ReconcileError::ConcurrencyConflict(_)
            | ReconcileError::Database(_) => true,
            _ => false,
        }
    }

    /// Returns true for failures that can never succeed on redelivery.
    pub fn is_terminal(&self) -> bool {
        !self.is_retryable()
    }

    /// Stable machine-readable code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            ReconcileError::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            ReconcileError::InvalidSignature(_) => "INVALID_SIGNATURE",
            ReconcileError::StoreApi { transient: true, .. } => "STORE_UNAVAILABLE",
            ReconcileError::StoreApi { transient: false, .. } => "STORE_REJECTED",
            ReconcileError::SubscriptionNotFound(_) => "SUBSCRIPTION_NOT_FOUND",
            ReconcileError::ReceiptInvalid(_) => "RECEIPT_INVALID",
            ReconcileError::DuplicateEvent(_) => "DUPLICATE_EVENT",
            ReconcileError::EventInProgress(_) => "EVENT_IN_PROGRESS",
            ReconcileError::AppNotFound(_) => "APP_NOT_FOUND",
            ReconcileError::Validation(_) => "VALIDATION_FAILED",
            ReconcileError::ConcurrencyConflict(_) => "CONCURRENCY_CONFLICT",
            ReconcileError::Database(_) => "INTERNAL_ERROR",
        }
    }

    /// Maps the error to an HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ReconcileError::MalformedPayload(_) | ReconcileError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            ReconcileError::InvalidSignature(_) => StatusCode::UNAUTHORIZED,
            ReconcileError::StoreApi { transient: true, .. } => StatusCode::SERVICE_UNAVAILABLE,
            ReconcileError::StoreApi { transient: false, .. } => StatusCode::BAD_GATEWAY,
            ReconcileError::SubscriptionNotFound(_) | ReconcileError::AppNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            ReconcileError::ReceiptInvalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ReconcileError::DuplicateEvent(_) => StatusCode::OK,
            ReconcileError::EventInProgress(_) | ReconcileError::ConcurrencyConflict(_) => {
                StatusCode::CONFLICT
            }
            ReconcileError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DomainError> for ReconcileError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::ConcurrencyConflict | ErrorCode::LockUnavailable => {
                ReconcileError::ConcurrencyConflict(err.message)
            }
            ErrorCode::ValidationFailed => ReconcileError::Validation(err.message),
            _ => ReconcileError::Database(err.to_string()),
        }
    }
}
