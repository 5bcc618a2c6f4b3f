//! StoreAdapter port - per-platform store access.
//!
//! One implementation per store. Callers depend only on this trait and on
//! the normalized types in `domain::subscription`.
//!
//! # Operations
//!
//! - `verify_signature` / `decode_transaction` / `decode_renewal_info`
//!   work on client- or store-supplied payloads without network access
//! - `fetch_latest_transaction_info` / `fetch_subscription_status` are
//!   server-to-server calls used to re-verify instead of trusting
//!   client-submitted identifiers

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::catalog::App;
use crate::domain::subscription::{
    Platform, ReconcileError, RenewalInfo, StoreSubscriptionStatus, StoreTransaction,
};

/// Errors raised by store adapters.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Wrong segment count, bad base64, bad JSON or missing fields.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Certificate chain or payload signature did not verify.
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Store API answered with a non-2xx status.
    #[error("Store API returned {status_code}: {body}")]
    Api { status_code: u16, body: String },

    /// Connection failure or timeout.
    #[error("Store unreachable: {0}")]
    Network(String),

    /// Server API credentials are missing for this app or platform.
    #[error("Store API not configured: {0}")]
    NotConfigured(String),
}

impl StoreError {
    /// Returns true for failures a later retry may resolve.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Api { status_code, .. } => *status_code >= 500 || *status_code == 429,
            StoreError::Network(_) => true,
            _ => false,
        }
    }

    /// Returns true if the store answered 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::Api { status_code: 404, .. })
    }
}

impl From<StoreError> for ReconcileError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MalformedPayload(msg) => ReconcileError::MalformedPayload(msg),
            StoreError::InvalidSignature(msg) => ReconcileError::InvalidSignature(msg),
            StoreError::Api { status_code, body } => ReconcileError::store_api(status_code, body),
            StoreError::Network(msg) => ReconcileError::store_unreachable(msg),
            StoreError::NotConfigured(msg) => ReconcileError::StoreApi {
                status_code: None,
                body: msg,
                transient: false,
            },
        }
    }
}

/// Port for decoding and verifying store payloads and calling store APIs.
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Verify a store-signed payload and return its decoded claims.
    ///
    /// # Errors
    ///
    /// - `MalformedPayload` if the payload cannot be parsed
    /// - `InvalidSignature` if verification fails
    fn verify_signature(&self, signed_payload: &str) -> Result<serde_json::Value, StoreError>;

    /// Decode a transaction payload (Apple JWS, Play purchase JSON or token).
    fn decode_transaction(&self, raw: &str) -> Result<StoreTransaction, StoreError>;

    /// Decode renewal information. Stores without a separate renewal payload return `None`.
    fn decode_renewal_info(&self, _raw: &str) -> Result<Option<RenewalInfo>, StoreError> {
        Ok(None)
    }

    /// Returns true if server-to-server calls can be made.
    fn has_server_api(&self) -> bool;

    /// Latest transaction for a subscription, as reported by the store.
    async fn fetch_latest_transaction_info(
        &self,
        app: &App,
        original_transaction_id: &str,
    ) -> Result<StoreTransaction, StoreError>;

    /// Current subscription status, as reported by the store.
    async fn fetch_subscription_status(
        &self,
        app: &App,
        original_transaction_id: &str,
    ) -> Result<StoreSubscriptionStatus, StoreError>;
}
