//! App Store implementation of the `StoreAdapter` port.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::catalog::App;
use crate::domain::subscription::{
    OfferType, Platform, RenewalInfo, StoreSubscriptionStatus, StoreTransaction,
};
use crate::ports::{StoreAdapter, StoreError};

use super::api::AppStoreServerClient;
use super::jws::AppleJwsVerifier;
use super::models::{
    millis, parse_environment, AutoRenewStatus, JwsRenewalInfoDecodedPayload,
    JwsTransactionDecodedPayload, LastTransactionsItem, StatusResponse,
};

const FREE_TRIAL: &str = "FREE_TRIAL";

/// App Store adapter: JWS verification plus optional App Store Server API access.
#[derive(Clone)]
pub struct AppleStoreAdapter {
    verifier: AppleJwsVerifier,
    api: Option<Arc<AppStoreServerClient>>,
}

impl AppleStoreAdapter {
    pub fn new(verifier: AppleJwsVerifier, api: Option<AppStoreServerClient>) -> Self {
        Self {
            verifier,
            api: api.map(Arc::new),
        }
    }

    pub fn verifier(&self) -> &AppleJwsVerifier {
        &self.verifier
    }

    /// Verify and convert a `signedTransactionInfo` value.
    pub fn decode_signed_transaction(&self, jws: &str) -> Result<StoreTransaction, StoreError> {
        let payload: JwsTransactionDecodedPayload = self.verifier.verify(jws)?;
        transaction_from_payload(payload)
    }

    /// Verify and convert a `signedRenewalInfo` value.
    pub fn decode_signed_renewal(&self, jws: &str) -> Result<RenewalInfo, StoreError> {
        let payload: JwsRenewalInfoDecodedPayload = self.verifier.verify(jws)?;
        renewal_from_payload(payload)
    }

    fn client(&self) -> Result<&AppStoreServerClient, StoreError> {
        self.api
            .as_deref()
            .ok_or_else(|| StoreError::NotConfigured("App Store Server API".to_string()))
    }

    async fn matching_status_item(
        &self,
        bundle_id: &str,
        original_transaction_id: &str,
    ) -> Result<Option<LastTransactionsItem>, StoreError> {
        let response = self
            .client()?
            .get_all_subscription_statuses(bundle_id, original_transaction_id)
            .await?;
        Ok(find_item(response, original_transaction_id))
    }
}

impl std::fmt::Debug for AppleStoreAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppleStoreAdapter")
            .field("verification", &self.verifier.mode())
            .field("server_api", &self.api.is_some())
            .finish()
    }
}

fn bundle_id(app: &App) -> Result<&str, StoreError> {
    app.bundle_id
        .as_deref()
        .ok_or_else(|| StoreError::NotConfigured(format!("app {} has no bundle id", app.id)))
}

fn find_item(response: StatusResponse, original_transaction_id: &str) -> Option<LastTransactionsItem> {
    response
        .data
        .into_iter()
        .flat_map(|group| group.last_transactions)
        .find(|item| item.original_transaction_id == original_transaction_id)
}

/// Converts a decoded App Store transaction.
pub fn transaction_from_payload(
    payload: JwsTransactionDecodedPayload,
) -> Result<StoreTransaction, StoreError> {
    let is_trial_period = payload.offer_discount_type.as_deref() == Some(FREE_TRIAL);
    let offer_type: Option<OfferType> = payload.offer_type.map(Into::into);
    let is_in_intro_offer_period = offer_type == Some(OfferType::Introductory) && !is_trial_period;

    Ok(StoreTransaction {
        platform: Platform::Ios,
        purchase_date: millis(payload.purchase_date, "purchaseDate")?,
        expires_date: payload
            .expires_date
            .map(|v| millis(v, "expiresDate"))
            .transpose()?,
        revocation_date: payload
            .revocation_date
            .map(|v| millis(v, "revocationDate"))
            .transpose()?,
        revocation_reason: payload.revocation_reason.map(|r| r.as_str().to_string()),
        environment: parse_environment(payload.environment.as_deref()),
        transaction_id: payload.transaction_id,
        original_transaction_id: payload.original_transaction_id,
        product_id: payload.product_id,
        app_identifier: payload.bundle_id,
        is_trial_period,
        is_in_intro_offer_period,
        offer_type,
        auto_renew_enabled: None,
        linked_original_transaction_id: None,
    })
}

/// Converts decoded App Store renewal info.
pub fn renewal_from_payload(payload: JwsRenewalInfoDecodedPayload) -> Result<RenewalInfo, StoreError> {
    Ok(RenewalInfo {
        auto_renew_enabled: payload.auto_renew_status != Some(AutoRenewStatus::Off),
        grace_period_expires_date: payload
            .grace_period_expires_date
            .map(|v| millis(v, "gracePeriodExpiresDate"))
            .transpose()?,
        expiration_intent: payload.expiration_intent,
        // 0 = pending customer consent
        price_increase_pending: payload.price_increase_status == Some(0),
    })
}

#[async_trait]
impl StoreAdapter for AppleStoreAdapter {
    fn platform(&self) -> Platform {
        Platform::Ios
    }

    fn verify_signature(&self, signed_payload: &str) -> Result<serde_json::Value, StoreError> {
        self.verifier.verify_value(signed_payload)
    }

    fn decode_transaction(&self, raw: &str) -> Result<StoreTransaction, StoreError> {
        self.decode_signed_transaction(raw)
    }

    fn decode_renewal_info(&self, raw: &str) -> Result<Option<RenewalInfo>, StoreError> {
        self.decode_signed_renewal(raw).map(Some)
    }

    fn has_server_api(&self) -> bool {
        self.api.is_some()
    }

    async fn fetch_latest_transaction_info(
        &self,
        app: &App,
        original_transaction_id: &str,
    ) -> Result<StoreTransaction, StoreError> {
        let bundle_id = bundle_id(app)?;

        // Non-subscription products have no status entry.
        let item = match self.matching_status_item(bundle_id, original_transaction_id).await {
            Ok(item) => item,
            Err(err) if err.is_not_found() => None,
            Err(err) => return Err(err),
        };
        if let Some(item) = item {
            return self.decode_signed_transaction(&item.signed_transaction_info);
        }

        tracing::debug!(
            original_transaction_id,
            "No subscription status, reading transaction info"
        );
        let info = self
            .client()?
            .get_transaction_info(bundle_id, original_transaction_id)
            .await?;
        self.decode_signed_transaction(&info.signed_transaction_info)
    }

    async fn fetch_subscription_status(
        &self,
        app: &App,
        original_transaction_id: &str,
    ) -> Result<StoreSubscriptionStatus, StoreError> {
        let bundle_id = bundle_id(app)?;
        let item = self
            .matching_status_item(bundle_id, original_transaction_id)
            .await?
            .ok_or_else(|| StoreError::Api {
                status_code: 404,
                body: format!("no status for {}", original_transaction_id),
            })?;

        let transaction = self.decode_signed_transaction(&item.signed_transaction_info)?;
        let renewal_info = item
            .signed_renewal_info
            .as_deref()
            .map(|jws| self.decode_signed_renewal(jws))
            .transpose()?;

        Ok(StoreSubscriptionStatus {
            status: item.status.into(),
            last_transactions: vec![transaction],
            renewal_info,
        })
    }
}
