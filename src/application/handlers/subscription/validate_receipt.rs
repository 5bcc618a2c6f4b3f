//! ValidateReceiptHandler - Command handler for client-submitted receipts.
//!
//! The receipt is verified before anything is written:
//!
//! - iOS: the client JWS is verified, then the latest transaction is
//!   re-fetched from the App Store Server API when it is configured.
//! - Android: the purchase token is always verified against the Play
//!   Developer API; there is no offline path.
//!
//! Any mismatch between the request and the verified transaction is a
//! terminal `ReceiptInvalid` with no subscription or entitlement mutation.

use std::sync::Arc;

use crate::domain::catalog::App;
use crate::domain::foundation::{AppId, AppUserId, SubscriberId, Timestamp};
use crate::domain::subscription::{
    CanonicalEvent, Platform, ReconcileError, StoreTransaction, Subscription, SubscriptionFact,
};
use crate::ports::{AppRegistry, ProductCatalog, StoreError, SubscriberRepository, SubscriptionRepository};

use super::{ReceiptReconciliation, ReconcileResult, StoreAdapters, SubscriptionReconciler};
use crate::application::handlers::entitlement::EntitlementSnapshot;

/// Command to validate a receipt for an app user.
#[derive(Debug, Clone)]
pub struct ValidateReceiptCommand {
    pub app_id: AppId,
    pub app_user_id: String,
    pub platform: Platform,
    /// iOS: signed transaction JWS. Android: purchase JSON or bare purchase token.
    pub receipt_data: String,
    /// Product the client believes it bought.
    pub product_id: Option<String>,
    /// Transaction the client believes it holds.
    pub transaction_id: Option<String>,
    /// Play Billing subscription id; checked like `product_id`.
    pub subscription_id: Option<String>,
}

/// Result of a successful validation.
#[derive(Debug, Clone)]
pub struct ValidateReceiptResult {
    pub snapshot: EntitlementSnapshot,
    pub subscription: Subscription,
    pub created: bool,
    /// Set when the subscription was restored away from another subscriber.
    pub previous_subscriber_id: Option<SubscriberId>,
}

pub struct ValidateReceiptHandler {
    apps: Arc<dyn AppRegistry>,
    catalog: Arc<dyn ProductCatalog>,
    subscribers: Arc<dyn SubscriberRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    stores: StoreAdapters,
    reconciler: Arc<SubscriptionReconciler>,
}

impl ValidateReceiptHandler {
    pub fn new(
        apps: Arc<dyn AppRegistry>,
        catalog: Arc<dyn ProductCatalog>,
        subscribers: Arc<dyn SubscriberRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        stores: StoreAdapters,
        reconciler: Arc<SubscriptionReconciler>,
    ) -> Self {
        Self {
            apps,
            catalog,
            subscribers,
            subscriptions,
            stores,
            reconciler,
        }
    }

    pub async fn handle(
        &self,
        cmd: ValidateReceiptCommand,
    ) -> Result<ValidateReceiptResult, ReconcileError> {
        let app_user_id = AppUserId::new(cmd.app_user_id.clone())
            .map_err(|e| ReconcileError::Validation(e.to_string()))?;
        if cmd.receipt_data.trim().is_empty() {
            return Err(ReconcileError::Validation("receiptData is required".to_string()));
        }
        let app = self
            .apps
            .find_by_id(&cmd.app_id)
            .await?
            .ok_or(ReconcileError::AppNotFound(cmd.app_id))?;

        let transaction = self.verify(&app, &cmd).await?;

        let product = self
            .catalog
            .find_by_store_product_id(&app.id, cmd.platform, &transaction.product_id)
            .await?
            .ok_or_else(|| {
                ReconcileError::ReceiptInvalid(format!(
                    "Product '{}' is not in the catalog",
                    transaction.product_id
                ))
            })?;

        let subscriber = self.subscribers.get_or_create(&app.id, &app_user_id).await?;
        let linked = transaction
            .linked_original_transaction_id
            .clone()
            .filter(|linked| *linked != transaction.original_transaction_id);

        let result = self
            .reconciler
            .apply_receipt(ReceiptReconciliation {
                subscriber_id: subscriber.id,
                product,
                transaction,
                renewal: None,
            })
            .await?;

        let created = result.created();
        let ReconcileResult {
            subscription,
            previous_subscriber_id,
            mut entitlements,
            ..
        } = result;
        if let Some(linked) = linked {
            if let Some(superseded) = self.expire_superseded(cmd.platform, &linked).await? {
                if superseded.subscription.subscriber_id == subscriber.id {
                    entitlements = superseded.entitlements;
                }
            }
        }

        let subscriptions = self.subscriptions.list_for_subscriber(&subscriber.id).await?;

        Ok(ValidateReceiptResult {
            snapshot: EntitlementSnapshot {
                app_user_id,
                subscriber_id: Some(subscriber.id),
                entitlements,
                subscriptions,
                as_of: Timestamp::now(),
            },
            created,
            previous_subscriber_id,
            subscription,
        })
    }

    /// Resolves the receipt to a store-verified transaction and checks it
    /// against the request.
    async fn verify(
        &self,
        app: &App,
        cmd: &ValidateReceiptCommand,
    ) -> Result<StoreTransaction, ReconcileError> {
        let adapter = self.stores.get(cmd.platform)?;
        let decoded = adapter
            .decode_transaction(&cmd.receipt_data)
            .map_err(receipt_rejected)?;

        let verified = if adapter.has_server_api() {
            adapter
                .fetch_latest_transaction_info(app, &decoded.original_transaction_id)
                .await
                .map_err(receipt_rejected)?
        } else if cmd.platform == Platform::Ios {
            tracing::debug!(
                original_transaction_id = %decoded.original_transaction_id,
                "App Store Server API not configured; using the verified client transaction"
            );
            decoded.clone()
        } else {
            return Err(StoreError::NotConfigured(format!(
                "{} receipts require the store server API",
                cmd.platform
            ))
            .into());
        };

        check_receipt(app, cmd, &decoded, &verified)?;
        Ok(verified)
    }

    /// Expires the subscription an Android upgrade/downgrade replaced.
    async fn expire_superseded(
        &self,
        platform: Platform,
        original_transaction_id: &str,
    ) -> Result<Option<ReconcileResult>, ReconcileError> {
        let fact = SubscriptionFact::without_transaction(
            original_transaction_id,
            CanonicalEvent::Expired,
            Timestamp::now(),
        );
        match self.reconciler.apply_event(platform, fact).await {
            Ok(result) => {
                tracing::info!(
                    platform = %platform,
                    original_transaction_id,
                    "Expired superseded subscription"
                );
                Ok(Some(result))
            }
            Err(ReconcileError::SubscriptionNotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// Maps store failures on the receipt path.
///
/// A receipt the store cannot find or parse is invalid; authentication and
/// server-side failures are not the receipt's fault and keep their class.
fn receipt_rejected(err: StoreError) -> ReconcileError {
    match err {
        StoreError::MalformedPayload(msg) => {
            ReconcileError::ReceiptInvalid(format!("Malformed receipt: {}", msg))
        }
        StoreError::InvalidSignature(msg) => {
            tracing::warn!(reason = %msg, "Receipt failed signature verification");
            ReconcileError::ReceiptInvalid(format!("Invalid receipt signature: {}", msg))
        }
        StoreError::Api { status_code, body } if matches!(status_code, 400 | 404 | 410) => {
            ReconcileError::ReceiptInvalid(format!(
                "Store rejected receipt ({}): {}",
                status_code, body
            ))
        }
        other => other.into(),
    }
}

fn check_receipt(
    app: &App,
    cmd: &ValidateReceiptCommand,
    decoded: &StoreTransaction,
    verified: &StoreTransaction,
) -> Result<(), ReconcileError> {
    let invalid = |msg: String| -> Result<(), ReconcileError> {
        Err(ReconcileError::ReceiptInvalid(msg))
    };

    if verified.platform != cmd.platform {
        return invalid(format!(
            "Receipt is for {}, request says {}",
            verified.platform, cmd.platform
        ));
    }
    for reported in [&decoded.app_identifier, &verified.app_identifier] {
        if !app.matches_store_identifier(cmd.platform, reported.as_deref()) {
            return invalid(format!(
                "Receipt belongs to '{}', not to this app",
                reported.as_deref().unwrap_or_default()
            ));
        }
    }
    if verified.original_transaction_id != decoded.original_transaction_id {
        return invalid("Store returned a different original transaction".to_string());
    }
    let claimed_product = cmd.product_id.as_deref().or(cmd.subscription_id.as_deref());
    if let Some(claimed) = claimed_product {
        if claimed != verified.product_id && claimed != decoded.product_id {
            return invalid(format!(
                "Receipt is for product '{}', not '{}'",
                verified.product_id, claimed
            ));
        }
    }
    if let Some(claimed) = cmd.transaction_id.as_deref() {
        let known = [
            decoded.transaction_id.as_str(),
            verified.transaction_id.as_str(),
            verified.original_transaction_id.as_str(),
        ];
        if !known.contains(&claimed) {
            return invalid(format!("Receipt does not contain transaction '{}'", claimed));
        }
    }
    if verified.is_revoked() {
        return invalid(format!(
            "Transaction was revoked ({})",
            verified.revocation_reason.as_deref().unwrap_or("no reason given")
        ));
    }
    Ok(())
}
