//! Google Play implementation of the `StoreAdapter` port.
//!
//! Play purchases are identified by their purchase token, which doubles as
//! the original transaction id. Client-supplied purchase data is only a
//! pointer: the authoritative state always comes from the Developer API.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::catalog::App;
use crate::domain::foundation::Timestamp;
use crate::domain::subscription::{
    OfferType, Platform, RenewalInfo, StoreEnvironment, StoreSubscriptionStatus, StoreTransaction,
    SubscriptionStatus,
};
use crate::ports::{StoreAdapter, StoreError};

use super::api::PlayDeveloperClient;
use super::models::{rfc3339, status_from_state, ClientPurchase, SubscriptionPurchaseV2};

#[derive(Clone, Default)]
pub struct GoogleStoreAdapter {
    api: Option<Arc<PlayDeveloperClient>>,
}

impl GoogleStoreAdapter {
    pub fn new(api: Option<PlayDeveloperClient>) -> Self {
        Self {
            api: api.map(Arc::new),
        }
    }

    async fn fetch(
        &self,
        app: &App,
        purchase_token: &str,
    ) -> Result<SubscriptionPurchaseV2, StoreError> {
        let api = self
            .api
            .as_deref()
            .ok_or_else(|| StoreError::NotConfigured("Play Developer API".to_string()))?;
        let package_name = app.package_name.as_deref().ok_or_else(|| {
            StoreError::NotConfigured(format!("app {} has no package name", app.id))
        })?;
        api.get_subscription(package_name, purchase_token).await
    }
}

impl std::fmt::Debug for GoogleStoreAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleStoreAdapter")
            .field("server_api", &self.api.is_some())
            .finish()
    }
}

/// Parses client purchase data: either the Play Billing purchase JSON or a bare token.
fn parse_client_purchase(raw: &str) -> Result<ClientPurchase, StoreError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(StoreError::MalformedPayload(
            "empty purchase token".to_string(),
        ));
    }
    if raw.starts_with('{') {
        let purchase: ClientPurchase = serde_json::from_str(raw)
            .map_err(|e| StoreError::MalformedPayload(format!("Invalid purchase JSON: {}", e)))?;
        if purchase.purchase_token.trim().is_empty() {
            return Err(StoreError::MalformedPayload(
                "empty purchase token".to_string(),
            ));
        }
        return Ok(purchase);
    }
    if raw.chars().any(char::is_whitespace) {
        return Err(StoreError::MalformedPayload(
            "purchase token contains whitespace".to_string(),
        ));
    }
    Ok(ClientPurchase {
        purchase_token: raw.to_string(),
        order_id: None,
        package_name: None,
        product_id: None,
        purchase_time: None,
        auto_renewing: None,
    })
}

/// Converts a Developer API subscription resource.
///
/// Multi-line-item subscriptions report the line item that expires last.
pub fn transaction_from_subscription(
    purchase_token: &str,
    package_name: Option<&str>,
    purchase: &SubscriptionPurchaseV2,
) -> Result<StoreTransaction, StoreError> {
    let mut line_item = None;
    let mut expires_date: Option<Timestamp> = None;
    for item in &purchase.line_items {
        let expiry = item
            .expiry_time
            .as_deref()
            .map(|v| rfc3339(v, "expiryTime"))
            .transpose()?;
        if line_item.is_none() || expiry > expires_date {
            line_item = Some(item);
            expires_date = expiry;
        }
    }
    let line_item = line_item.ok_or_else(|| {
        StoreError::MalformedPayload("subscription has no line items".to_string())
    })?;

    let phase = line_item.offer_phase.as_ref();
    let is_trial_period = phase.map_or(false, |p| p.free_trial.is_some());
    let is_in_intro_offer_period = phase.map_or(false, |p| p.introductory_price.is_some());
    let offer_type = if is_trial_period || is_in_intro_offer_period {
        Some(OfferType::Introductory)
    } else if line_item
        .offer_details
        .as_ref()
        .map_or(false, |d| d.offer_id.is_some())
    {
        Some(OfferType::Promotional)
    } else {
        None
    };

    let purchase_date = match purchase.start_time.as_deref() {
        Some(v) => rfc3339(v, "startTime")?,
        None => Timestamp::now(),
    };

    Ok(StoreTransaction {
        platform: Platform::Android,
        transaction_id: purchase
            .latest_order_id
            .clone()
            .unwrap_or_else(|| purchase_token.to_string()),
        original_transaction_id: purchase_token.to_string(),
        product_id: line_item.product_id.clone(),
        app_identifier: package_name.map(str::to_string),
        purchase_date,
        expires_date,
        is_trial_period,
        is_in_intro_offer_period,
        offer_type,
        environment: if purchase.test_purchase.is_some() {
            StoreEnvironment::Sandbox
        } else {
            StoreEnvironment::Production
        },
        revocation_date: None,
        revocation_reason: None,
        auto_renew_enabled: line_item
            .auto_renewing_plan
            .as_ref()
            .and_then(|p| p.auto_renew_enabled),
        linked_original_transaction_id: purchase.linked_purchase_token.clone(),
    })
}

#[async_trait]
impl StoreAdapter for GoogleStoreAdapter {
    fn platform(&self) -> Platform {
        Platform::Android
    }

    /// Play purchase data carries no verifiable signature of ours; this only parses it.
    fn verify_signature(&self, signed_payload: &str) -> Result<serde_json::Value, StoreError> {
        let purchase = parse_client_purchase(signed_payload)?;
        Ok(serde_json::json!({
            "purchaseToken": purchase.purchase_token,
            "orderId": purchase.order_id,
            "packageName": purchase.package_name,
            "productId": purchase.product_id,
        }))
    }

    /// Provisional transaction from client data. Product and expiry are
    /// unknown until the Developer API is consulted.
    fn decode_transaction(&self, raw: &str) -> Result<StoreTransaction, StoreError> {
        let purchase = parse_client_purchase(raw)?;
        let purchase_date = purchase
            .purchase_time
            .and_then(Timestamp::from_unix_millis)
            .unwrap_or_else(Timestamp::now);

        Ok(StoreTransaction {
            platform: Platform::Android,
            transaction_id: purchase
                .order_id
                .clone()
                .unwrap_or_else(|| purchase.purchase_token.clone()),
            original_transaction_id: purchase.purchase_token,
            product_id: purchase.product_id.unwrap_or_default(),
            app_identifier: purchase.package_name,
            purchase_date,
            expires_date: None,
            is_trial_period: false,
            is_in_intro_offer_period: false,
            offer_type: None,
            environment: StoreEnvironment::Production,
            revocation_date: None,
            revocation_reason: None,
            auto_renew_enabled: purchase.auto_renewing,
            linked_original_transaction_id: None,
        })
    }

    fn has_server_api(&self) -> bool {
        self.api.is_some()
    }

    async fn fetch_latest_transaction_info(
        &self,
        app: &App,
        original_transaction_id: &str,
    ) -> Result<StoreTransaction, StoreError> {
        let purchase = self.fetch(app, original_transaction_id).await?;
        transaction_from_subscription(
            original_transaction_id,
            app.package_name.as_deref(),
            &purchase,
        )
    }

    async fn fetch_subscription_status(
        &self,
        app: &App,
        original_transaction_id: &str,
    ) -> Result<StoreSubscriptionStatus, StoreError> {
        let purchase = self.fetch(app, original_transaction_id).await?;
        let transaction = transaction_from_subscription(
            original_transaction_id,
            app.package_name.as_deref(),
            &purchase,
        )?;
        let status = status_from_state(purchase.subscription_state.as_deref());

        let renewal_info = RenewalInfo {
            auto_renew_enabled: transaction.auto_renew_enabled.unwrap_or(false),
            grace_period_expires_date: if status == SubscriptionStatus::InGracePeriod {
                transaction.expires_date
            } else {
                None
            },
            expiration_intent: None,
            price_increase_pending: false,
        };

        Ok(StoreSubscriptionStatus {
            status,
            last_transactions: vec![transaction],
            renewal_info: Some(renewal_info),
        })
    }
}
