//! Canonical subscription events.
//!
//! Store notification vocabularies (App Store Server Notifications v2,
//! Play real-time developer notifications) are mapped onto this enum before
//! they reach the reconciler.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;

use super::SubscriptionStatus;

/// Store-independent subscription status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CanonicalEvent {
    Activated,
    Renewed,
    RenewalStatusChanged { auto_renew_enabled: bool },
    EnteredBillingRetry,
    EnteredGracePeriod { grace_period_expires_at: Option<Timestamp> },
    GracePeriodExpired,
    Expired,
    Refunded,
    Revoked { reason: Option<String> },
    OfferRedeemed,
}

impl CanonicalEvent {
    /// Stable name used in logs, ledger rows and published events.
    pub fn name(&self) -> &'static str {
        match self {
            CanonicalEvent::Activated => "activated",
            CanonicalEvent::Renewed => "renewed",
            CanonicalEvent::RenewalStatusChanged { .. } => "renewal_status_changed",
            CanonicalEvent::EnteredBillingRetry => "entered_billing_retry",
            CanonicalEvent::EnteredGracePeriod { .. } => "entered_grace_period",
            CanonicalEvent::GracePeriodExpired => "grace_period_expired",
            CanonicalEvent::Expired => "expired",
            CanonicalEvent::Refunded => "refunded",
            CanonicalEvent::Revoked { .. } => "revoked",
            CanonicalEvent::OfferRedeemed => "offer_redeemed",
        }
    }

    /// Status a subscription ends up in after this event, given its current status.
    pub fn target_status(&self, current: SubscriptionStatus) -> SubscriptionStatus {
        match self {
            CanonicalEvent::Activated
            | CanonicalEvent::Renewed
            | CanonicalEvent::OfferRedeemed => SubscriptionStatus::Active,
            CanonicalEvent::RenewalStatusChanged { .. } => current,
            CanonicalEvent::EnteredBillingRetry | CanonicalEvent::GracePeriodExpired => {
                SubscriptionStatus::InBillingRetry
            }
            CanonicalEvent::EnteredGracePeriod { .. } => SubscriptionStatus::InGracePeriod,
            CanonicalEvent::Expired => SubscriptionStatus::Expired,
            CanonicalEvent::Refunded | CanonicalEvent::Revoked { .. } => {
                SubscriptionStatus::Revoked
            }
        }
    }

    /// Statuses the transition table lists as the expected source of this event.
    ///
    /// `None` means the event applies from any status. Events arriving from
    /// other statuses are still applied; callers only log them.
    pub fn nominal_sources(&self) -> Option<&'static [SubscriptionStatus]> {
        use SubscriptionStatus::*;
        match self {
            // Creation; an existing row is already out of the expected order.
            CanonicalEvent::Activated => Some(&[]),
            CanonicalEvent::Renewed => Some(&[Active, InGracePeriod, InBillingRetry]),
            CanonicalEvent::EnteredBillingRetry => Some(&[Active]),
            CanonicalEvent::EnteredGracePeriod { .. } => Some(&[Active]),
            CanonicalEvent::GracePeriodExpired => Some(&[InGracePeriod]),
            CanonicalEvent::RenewalStatusChanged { .. }
            | CanonicalEvent::Expired
            | CanonicalEvent::Refunded
            | CanonicalEvent::Revoked { .. }
            | CanonicalEvent::OfferRedeemed => None,
        }
    }

    /// Returns true if the table lists `current` as a source for this event.
    pub fn is_nominal_from(&self, current: SubscriptionStatus) -> bool {
        match self.nominal_sources() {
            None => true,
            Some(sources) => sources.contains(&current),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SubscriptionStatus::*;

    #[test]
    fn target_status_follows_transition_table() {
        let cases = [
            (CanonicalEvent::Activated, Expired, Active),
            (CanonicalEvent::Renewed, InBillingRetry, Active),
            (
                CanonicalEvent::RenewalStatusChanged {
                    auto_renew_enabled: false,
                },
                InGracePeriod,
                InGracePeriod,
            ),
            (CanonicalEvent::EnteredBillingRetry, Active, InBillingRetry),
            (
                CanonicalEvent::EnteredGracePeriod {
                    grace_period_expires_at: None,
                },
                Active,
                InGracePeriod,
            ),
            (CanonicalEvent::GracePeriodExpired, InGracePeriod, InBillingRetry),
            (CanonicalEvent::Expired, Active, Expired),
            (CanonicalEvent::Refunded, Active, Revoked),
            (CanonicalEvent::Revoked { reason: None }, InBillingRetry, Revoked),
            (CanonicalEvent::OfferRedeemed, Expired, Active),
        ];

        for (event, from, to) in cases {
            assert_eq!(event.target_status(from), to, "{} from {}", event.name(), from);
        }
    }

    #[test]
    fn any_source_events_are_always_nominal() {
        for status in SubscriptionStatus::ALL {
            assert!(CanonicalEvent::Expired.is_nominal_from(status));
            assert!(CanonicalEvent::Refunded.is_nominal_from(status));
            assert!(CanonicalEvent::OfferRedeemed.is_nominal_from(status));
        }
    }

    #[test]
    fn renewed_after_expired_is_out_of_order() {
        assert!(!CanonicalEvent::Renewed.is_nominal_from(Expired));
        assert!(CanonicalEvent::Renewed.is_nominal_from(InGracePeriod));
    }

    #[test]
    fn grace_period_from_billing_retry_is_out_of_order() {
        let event = CanonicalEvent::EnteredGracePeriod {
            grace_period_expires_at: None,
        };
        assert!(!event.is_nominal_from(InBillingRetry));
    }

    #[test]
    fn activated_on_existing_row_is_out_of_order() {
        for status in SubscriptionStatus::ALL {
            assert!(!CanonicalEvent::Activated.is_nominal_from(status));
        }
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let json = serde_json::to_value(CanonicalEvent::RenewalStatusChanged {
            auto_renew_enabled: false,
        })
        .unwrap();
        assert_eq!(json["type"], "renewal_status_changed");
        assert_eq!(json["auto_renew_enabled"], false);
    }
}
