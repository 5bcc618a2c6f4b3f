//! Scriptable store adapter for tests and local runs.
//!
//! Receipts are resolved through a lookup table instead of real signature
//! checks, and server-to-server answers are whatever was last scripted.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::catalog::App;
use crate::domain::subscription::{
    Platform, RenewalInfo, StoreSubscriptionStatus, StoreTransaction, SubscriptionStatus,
};
use crate::ports::{StoreAdapter, StoreError};

use super::{read, write};

pub struct FakeStoreAdapter {
    platform: Platform,
    server_api: bool,
    receipts: RwLock<HashMap<String, StoreTransaction>>,
    renewals: RwLock<HashMap<String, RenewalInfo>>,
    latest: RwLock<HashMap<String, StoreTransaction>>,
    statuses: RwLock<HashMap<String, StoreSubscriptionStatus>>,
    failure: RwLock<Option<StoreError>>,
    fetches: RwLock<usize>,
}

impl FakeStoreAdapter {
    /// Adapter with server-to-server calls enabled.
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            server_api: true,
            receipts: RwLock::default(),
            renewals: RwLock::default(),
            latest: RwLock::default(),
            statuses: RwLock::default(),
            failure: RwLock::default(),
            fetches: RwLock::default(),
        }
    }

    /// Adapter that can only decode payloads.
    pub fn without_server_api(platform: Platform) -> Self {
        Self {
            server_api: false,
            ..Self::new(platform)
        }
    }

    /// Make `raw` decode to `transaction`.
    pub fn add_receipt(&self, raw: impl Into<String>, transaction: StoreTransaction) {
        write(&self.receipts).insert(raw.into(), transaction);
    }

    pub fn add_renewal_info(&self, raw: impl Into<String>, renewal: RenewalInfo) {
        write(&self.renewals).insert(raw.into(), renewal);
    }

    /// Script the store's view of a subscription.
    ///
    /// The status defaults to active and is derived from the transaction.
    pub fn set_latest(&self, transaction: StoreTransaction) {
        let id = transaction.original_transaction_id.clone();
        let status = if transaction.is_revoked() {
            SubscriptionStatus::Revoked
        } else {
            SubscriptionStatus::Active
        };
        write(&self.statuses).insert(
            id.clone(),
            StoreSubscriptionStatus {
                status,
                last_transactions: vec![transaction.clone()],
                renewal_info: None,
            },
        );
        write(&self.latest).insert(id, transaction);
    }

    pub fn set_status(&self, original_transaction_id: impl Into<String>, status: StoreSubscriptionStatus) {
        write(&self.statuses).insert(original_transaction_id.into(), status);
    }

    /// Make every server-to-server call fail until cleared.
    pub fn fail_with(&self, error: Option<StoreError>) {
        *write(&self.failure) = error;
    }

    pub fn fetch_count(&self) -> usize {
        *read(&self.fetches)
    }

    fn before_fetch(&self) -> Result<(), StoreError> {
        *write(&self.fetches) += 1;
        if !self.server_api {
            return Err(StoreError::NotConfigured(format!(
                "{} server API",
                self.platform
            )));
        }
        match read(&self.failure).clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn not_found(original_transaction_id: &str) -> StoreError {
    StoreError::Api {
        status_code: 404,
        body: format!("{} not found", original_transaction_id),
    }
}

#[async_trait]
impl StoreAdapter for FakeStoreAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn verify_signature(&self, signed_payload: &str) -> Result<serde_json::Value, StoreError> {
        read(&self.receipts)
            .get(signed_payload)
            .map(|tx| serde_json::to_value(tx).unwrap_or_default())
            .ok_or_else(|| StoreError::InvalidSignature("unknown payload".to_string()))
    }

    fn decode_transaction(&self, raw: &str) -> Result<StoreTransaction, StoreError> {
        read(&self.receipts)
            .get(raw)
            .cloned()
            .ok_or_else(|| StoreError::MalformedPayload(format!("unknown receipt '{}'", raw)))
    }

    fn decode_renewal_info(&self, raw: &str) -> Result<Option<RenewalInfo>, StoreError> {
        Ok(read(&self.renewals).get(raw).cloned())
    }

    fn has_server_api(&self) -> bool {
        self.server_api
    }

    async fn fetch_latest_transaction_info(
        &self,
        _app: &App,
        original_transaction_id: &str,
    ) -> Result<StoreTransaction, StoreError> {
        self.before_fetch()?;
        read(&self.latest)
            .get(original_transaction_id)
            .cloned()
            .ok_or_else(|| not_found(original_transaction_id))
    }

    async fn fetch_subscription_status(
        &self,
        _app: &App,
        original_transaction_id: &str,
    ) -> Result<StoreSubscriptionStatus, StoreError> {
        self.before_fetch()?;
        read(&self.statuses)
            .get(original_transaction_id)
            .cloned()
            .ok_or_else(|| not_found(original_transaction_id))
    }
}
