//! NotificationNormalizer port - store webhook decoding and canonical mapping.
//!
//! Decoding is split from normalization so the ledger row can be claimed
//! between the two: decoding yields the ledger identity, normalization may
//! call the store API and produces the canonical fact.

use async_trait::async_trait;

use crate::domain::catalog::App;
use crate::domain::foundation::Timestamp;
use crate::domain::subscription::{Platform, StoreEnvironment, SubscriptionFact};

use super::StoreError;

/// Authenticated store notification, before canonical mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedNotification {
    pub platform: Platform,
    /// Ledger identity of the notification.
    pub provider_event_id: String,
    /// Store-native type, e.g. `DID_FAIL_TO_RENEW/GRACE_PERIOD` or `SUBSCRIPTION_RENEWED`.
    pub event_type: String,
    pub app_identifier: Option<String>,
    pub environment: Option<StoreEnvironment>,
    /// Decoded notification body, stored on the ledger row.
    pub payload: serde_json::Value,
    pub signed_at: Option<Timestamp>,
}

#[async_trait]
pub trait NotificationNormalizer: Send + Sync {
    fn platform(&self) -> Platform;

    /// Authenticate and decode a raw webhook body.
    ///
    /// `credential` is the out-of-band push credential (the Pub/Sub push
    /// token), if the store uses one.
    ///
    /// # Errors
    ///
    /// - `MalformedPayload` if the body cannot be parsed
    /// - `InvalidSignature` if authentication fails
    fn decode(
        &self,
        body: &[u8],
        credential: Option<&str>,
    ) -> Result<DecodedNotification, StoreError>;

    /// Map a decoded notification to a canonical fact.
    ///
    /// Returns `None` for notification types that do not affect subscription state.
    async fn normalize(
        &self,
        app: &App,
        notification: &DecodedNotification,
    ) -> Result<Option<SubscriptionFact>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_normalizer_is_object_safe() {
        fn _accepts_dyn(_normalizer: &dyn NotificationNormalizer) {}
    }
}
