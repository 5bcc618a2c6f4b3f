//! Subscription status.
//!
//! Every store-specific lifecycle is folded into these five states.
//! A missing subscription row is the implicit sixth state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// Authoritative subscription status derived from store events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Paid (or free-trial) period in effect.
    Active,

    /// Renewal failed; the store preserves access while it retries payment.
    InGracePeriod,

    /// Renewal failed and the store is retrying payment.
    /// Still treated as entitled, but at risk.
    InBillingRetry,

    /// Subscription lapsed. No access.
    Expired,

    /// Refunded or revoked by the store. No access.
    Revoked,
}

impl SubscriptionStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [SubscriptionStatus; 5] = [
        SubscriptionStatus::Active,
        SubscriptionStatus::InGracePeriod,
        SubscriptionStatus::InBillingRetry,
        SubscriptionStatus::Expired,
        SubscriptionStatus::Revoked,
    ];

    /// Returns true if a subscription in this status can grant entitlements.
    ///
    /// Expiry dates are checked separately by the entitlement computation.
    pub fn is_entitling(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Active
                | SubscriptionStatus::InGracePeriod
                | SubscriptionStatus::InBillingRetry
        )
    }

    /// Returns true if access is preserved only while the store retries payment.
    pub fn is_at_risk(&self) -> bool {
        matches!(self, SubscriptionStatus::InBillingRetry)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::InGracePeriod => "in_grace_period",
            SubscriptionStatus::InBillingRetry => "in_billing_retry",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Revoked => "revoked",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SubscriptionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                ValidationError::invalid_format("status", format!("unknown status '{}'", s))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_grace_and_retry_are_entitling() {
        assert!(SubscriptionStatus::Active.is_entitling());
        assert!(SubscriptionStatus::InGracePeriod.is_entitling());
        assert!(SubscriptionStatus::InBillingRetry.is_entitling());
    }

    #[test]
    fn expired_and_revoked_are_not_entitling() {
        assert!(!SubscriptionStatus::Expired.is_entitling());
        assert!(!SubscriptionStatus::Revoked.is_entitling());
    }

    #[test]
    fn only_billing_retry_is_at_risk() {
        for status in SubscriptionStatus::ALL {
            assert_eq!(
                status.is_at_risk(),
                status == SubscriptionStatus::InBillingRetry,
                "{:?}",
                status
            );
        }
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in SubscriptionStatus::ALL {
            assert_eq!(status.as_str().parse::<SubscriptionStatus>().unwrap(), status);
        }
        assert!("past_due".parse::<SubscriptionStatus>().is_err());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&SubscriptionStatus::InGracePeriod).unwrap();
        assert_eq!(json, "\"in_grace_period\"");
    }
}
