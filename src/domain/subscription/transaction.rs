//! Normalized store facts.
//!
//! Both store adapters decode their native payloads into these types so the
//! reconciler never sees a platform-specific shape.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::Timestamp;

use super::{CanonicalEvent, OfferType, Platform, StoreEnvironment, SubscriptionStatus};

/// One store transaction, decoded from a signed payload or a store API response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreTransaction {
    pub platform: Platform,
    pub transaction_id: String,
    /// Stable across renewals. On Google Play this is the purchase token.
    pub original_transaction_id: String,
    pub product_id: String,
    /// Bundle identifier (Apple) or package name (Google), when the payload carries one.
    pub app_identifier: Option<String>,
    pub purchase_date: Timestamp,
    /// `None` for non-expiring purchases.
    pub expires_date: Option<Timestamp>,
    pub is_trial_period: bool,
    pub is_in_intro_offer_period: bool,
    pub offer_type: Option<OfferType>,
    pub environment: StoreEnvironment,
    pub revocation_date: Option<Timestamp>,
    pub revocation_reason: Option<String>,
    /// Only Google reports this on the purchase itself; Apple uses renewal info.
    pub auto_renew_enabled: Option<bool>,
    /// Google Play purchase token superseded by this purchase (upgrade/downgrade/resubscribe).
    pub linked_original_transaction_id: Option<String>,
}

impl StoreTransaction {
    /// Returns true if the store has revoked or refunded this transaction.
    pub fn is_revoked(&self) -> bool {
        self.revocation_date.is_some()
    }

    /// Lookup key of the subscription this transaction belongs to.
    pub fn subscription_key(&self) -> SubscriptionKey {
        SubscriptionKey::new(self.platform, self.original_transaction_id.clone())
    }
}

/// Apple renewal information ("will this renew, is a grace period active").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewalInfo {
    pub auto_renew_enabled: bool,
    pub grace_period_expires_date: Option<Timestamp>,
    /// Store-defined reason code for an expiration (Apple `expirationIntent`).
    pub expiration_intent: Option<u8>,
    pub price_increase_pending: bool,
}

/// Server-to-server view of a subscription as reported by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSubscriptionStatus {
    pub status: SubscriptionStatus,
    /// Most recent transaction first.
    pub last_transactions: Vec<StoreTransaction>,
    pub renewal_info: Option<RenewalInfo>,
}

impl StoreSubscriptionStatus {
    /// The latest transaction reported by the store, if any.
    pub fn latest_transaction(&self) -> Option<&StoreTransaction> {
        self.last_transactions.first()
    }
}

/// Natural key of a subscription: `(platform, originalTransactionId)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey {
    pub platform: Platform,
    pub original_transaction_id: String,
}

impl SubscriptionKey {
    pub fn new(platform: Platform, original_transaction_id: impl Into<String>) -> Self {
        Self {
            platform,
            original_transaction_id: original_transaction_id.into(),
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.platform, self.original_transaction_id)
    }
}

/// A canonical event together with whatever store facts accompanied it.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionFact {
    pub original_transaction_id: String,
    pub event: CanonicalEvent,
    pub transaction: Option<StoreTransaction>,
    pub renewal: Option<RenewalInfo>,
    /// When the store says the event happened (falls back to receipt time).
    pub occurred_at: Timestamp,
}

impl SubscriptionFact {
    /// Builds a fact from a transaction, keyed by its original transaction id.
    pub fn from_transaction(
        event: CanonicalEvent,
        transaction: StoreTransaction,
        renewal: Option<RenewalInfo>,
        occurred_at: Timestamp,
    ) -> Self {
        Self {
            original_transaction_id: transaction.original_transaction_id.clone(),
            event,
            transaction: Some(transaction),
            renewal,
            occurred_at,
        }
    }

    /// Builds a fact that carries no transaction payload.
    pub fn without_transaction(
        original_transaction_id: impl Into<String>,
        event: CanonicalEvent,
        occurred_at: Timestamp,
    ) -> Self {
        Self {
            original_transaction_id: original_transaction_id.into(),
            event,
            transaction: None,
            renewal: None,
            occurred_at,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Active auto-renewable Apple transaction used across domain tests.
    pub fn apple_transaction(
        original_transaction_id: &str,
        transaction_id: &str,
        expires_date: Option<Timestamp>,
    ) -> StoreTransaction {
        StoreTransaction {
            platform: Platform::Ios,
            transaction_id: transaction_id.to_string(),
            original_transaction_id: original_transaction_id.to_string(),
            product_id: "com.example.pro.monthly".to_string(),
            app_identifier: Some("com.example.app".to_string()),
            purchase_date: Timestamp::now(),
            expires_date,
            is_trial_period: false,
            is_in_intro_offer_period: false,
            offer_type: None,
            environment: StoreEnvironment::Production,
            revocation_date: None,
            revocation_reason: None,
            auto_renew_enabled: None,
            linked_original_transaction_id: None,
        }
    }
}
