//! Entitlement derivation.
//!
//! The subscriber's entitlement set is always rebuilt from scratch out of
//! the current subscriptions and manual overrides, never patched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::domain::catalog::{Entitlement, ProductType};
use crate::domain::foundation::{
    EntitlementId, SubscriberId, SubscriptionId, Timestamp, ValidationError,
};
use crate::domain::subscription::{Subscription, SubscriptionStatus};

use super::{ManualOverride, OverrideKind};

/// Where a derived entitlement comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementSource {
    Subscription,
    ManualGrant,
}

impl EntitlementSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntitlementSource::Subscription => "subscription",
            EntitlementSource::ManualGrant => "manual_grant",
        }
    }
}

impl fmt::Display for EntitlementSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntitlementSource {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "subscription" => Ok(EntitlementSource::Subscription),
            "manual_grant" => Ok(EntitlementSource::ManualGrant),
            other => Err(ValidationError::invalid_format(
                "entitlement_source",
                format!("unknown entitlement source '{}'", other),
            )),
        }
    }
}

/// Derived subscriber × entitlement row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberEntitlement {
    pub subscriber_id: SubscriberId,
    pub entitlement_id: EntitlementId,
    pub identifier: String,
    pub is_active: bool,
    /// `None` means no expiry.
    pub expires_at: Option<Timestamp>,
    pub source: EntitlementSource,
    /// Every entitling source is in billing retry.
    pub at_risk: bool,
    /// Subscription contributing the latest expiry, if any.
    pub subscription_id: Option<SubscriptionId>,
}

impl SubscriberEntitlement {
    /// Whether the row still grants access at `now`.
    ///
    /// Rows are written at reconciliation time, so an expiry that has since
    /// passed turns the row inactive. At-risk rows (billing retry) stay
    /// active until the store reports the subscription expired.
    pub fn is_active_at(&self, now: Timestamp) -> bool {
        self.is_active && (self.at_risk || not_expired(self.expires_at, now))
    }
}

/// A subscription together with the entitlements its product grants.
#[derive(Debug, Clone, PartialEq)]
pub struct GrantSource {
    pub subscription_id: SubscriptionId,
    pub status: SubscriptionStatus,
    /// Latest access instant, grace period included. `None` means no expiry.
    pub access_expires_at: Option<Timestamp>,
    pub product_type: ProductType,
    pub entitlements: Vec<Entitlement>,
}

impl GrantSource {
    pub fn from_subscription(
        subscription: &Subscription,
        product_type: ProductType,
        entitlements: Vec<Entitlement>,
    ) -> Self {
        Self {
            subscription_id: subscription.id,
            status: subscription.status,
            access_expires_at: subscription.access_expires_at(),
            product_type,
            entitlements,
        }
    }

    /// Returns `Some(at_risk)` if this source currently grants access.
    fn entitling(&self, now: Timestamp) -> Option<bool> {
        match self.status {
            SubscriptionStatus::Active | SubscriptionStatus::InGracePeriod => {
                if not_expired(self.access_expires_at, now) {
                    Some(false)
                } else {
                    None
                }
            }
            SubscriptionStatus::InBillingRetry => Some(true),
            SubscriptionStatus::Expired | SubscriptionStatus::Revoked => None,
        }
    }
}

fn not_expired(expires_at: Option<Timestamp>, now: Timestamp) -> bool {
    expires_at.map_or(true, |t| t.is_after(&now))
}

/// Later of two expiries where `None` is unbounded.
fn later(a: Option<Timestamp>, b: Option<Timestamp>) -> Option<Timestamp> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        _ => None,
    }
}

/// `None` sorts after every concrete instant.
fn expiry_rank(expires_at: Option<Timestamp>) -> (bool, Option<Timestamp>) {
    (expires_at.is_none(), expires_at)
}

#[derive(Default)]
struct Accumulator {
    identifier: String,
    active: bool,
    all_at_risk: bool,
    /// Latest expiry among contributions of the current `active` class.
    expires_at: Option<Option<Timestamp>>,
    from_subscription: bool,
    subscription: Option<(Option<Timestamp>, SubscriptionId)>,
}

impl Accumulator {
    fn new(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            all_at_risk: true,
            ..Default::default()
        }
    }

    fn add(&mut self, active: bool, at_risk: bool, expires_at: Option<Timestamp>) {
        if active && !self.active {
            // First entitling contribution replaces history from inactive sources.
            self.active = true;
            self.expires_at = None;
            self.subscription = None;
        } else if !active && self.active {
            return;
        }
        if active {
            self.all_at_risk &= at_risk;
        }
        self.expires_at = Some(match self.expires_at {
            None => expires_at,
            Some(current) => later(current, expires_at),
        });
    }

    fn add_subscription(
        &mut self,
        active: bool,
        at_risk: bool,
        expires_at: Option<Timestamp>,
        id: SubscriptionId,
    ) {
        self.from_subscription = true;
        if !active && self.active {
            return;
        }
        self.add(active, at_risk, expires_at);
        let candidate = (expires_at, id);
        let replace = match self.subscription {
            None => true,
            Some((current_expiry, current_id)) => {
                (expiry_rank(expires_at), id) > (expiry_rank(current_expiry), current_id)
            }
        };
        if replace {
            self.subscription = Some(candidate);
        }
    }
}

/// Derives the full entitlement set of a subscriber.
///
/// Pure: the same inputs always yield the same output, sorted by identifier.
pub fn compute_entitlements(
    subscriber_id: SubscriberId,
    sources: &[GrantSource],
    overrides: &[ManualOverride],
    now: Timestamp,
) -> Vec<SubscriberEntitlement> {
    let mut merged: BTreeMap<EntitlementId, Accumulator> = BTreeMap::new();

    for source in sources {
        if !source.product_type.grants_entitlements() {
            continue;
        }
        let entitling = source.entitling(now);
        for entitlement in &source.entitlements {
            merged
                .entry(entitlement.id)
                .or_insert_with(|| Accumulator::new(&entitlement.identifier))
                .add_subscription(
                    entitling.is_some(),
                    entitling.unwrap_or(false),
                    source.access_expires_at,
                    source.subscription_id,
                );
        }
    }

    for grant in overrides
        .iter()
        .filter(|o| o.kind == OverrideKind::Grant && o.is_in_effect(now))
    {
        merged
            .entry(grant.entitlement_id)
            .or_insert_with(|| Accumulator::new(&grant.entitlement_identifier))
            .add(true, false, grant.expires_at);
    }

    let revoked: Vec<EntitlementId> = overrides
        .iter()
        .filter(|o| o.kind == OverrideKind::Revoke && o.is_in_effect(now))
        .map(|o| o.entitlement_id)
        .collect();

    let mut result: Vec<SubscriberEntitlement> = merged
        .into_iter()
        .map(|(entitlement_id, acc)| {
            let is_revoked = revoked.contains(&entitlement_id);
            let is_active = acc.active && !is_revoked;
            SubscriberEntitlement {
                subscriber_id,
                entitlement_id,
                identifier: acc.identifier,
                is_active,
                expires_at: acc.expires_at.flatten(),
                source: if acc.from_subscription {
                    EntitlementSource::Subscription
                } else {
                    EntitlementSource::ManualGrant
                },
                at_risk: is_active && acc.all_at_risk,
                subscription_id: acc.subscription.map(|(_, id)| id),
            }
        })
        .collect();

    result.sort_by(|a, b| {
        a.identifier
            .cmp(&b.identifier)
            .then(a.entitlement_id.cmp(&b.entitlement_id))
    });
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::AppId;
    use proptest::prelude::*;

    #[test]
    fn stored_row_lapses_once_expiry_passes() {
        let now = Timestamp::now();
        let row = SubscriberEntitlement {
            subscriber_id: SubscriberId::new(),
            entitlement_id: EntitlementId::new(),
            identifier: "pro".to_string(),
            is_active: true,
            expires_at: Some(now.plus_days(1)),
            source: EntitlementSource::Subscription,
            at_risk: false,
            subscription_id: None,
        };
        assert!(row.is_active_at(now));
        assert!(!row.is_active_at(now.plus_days(2)));

        let at_risk = SubscriberEntitlement {
            at_risk: true,
            ..row
        };
        assert!(at_risk.is_active_at(now.plus_days(2)));
    }

    fn entitlement(identifier: &str) -> Entitlement {
        Entitlement {
            id: EntitlementId::new(),
            app_id: AppId::new(),
            identifier: identifier.to_string(),
            description: None,
        }
    }

    fn source(
        status: SubscriptionStatus,
        access_expires_at: Option<Timestamp>,
        entitlements: Vec<Entitlement>,
    ) -> GrantSource {
        GrantSource {
            subscription_id: SubscriptionId::new(),
            status,
            access_expires_at,
            product_type: ProductType::AutoRenewableSubscription,
            entitlements,
        }
    }

    fn manual(
        subscriber_id: SubscriberId,
        entitlement: &Entitlement,
        kind: OverrideKind,
        expires_at: Option<Timestamp>,
    ) -> ManualOverride {
        ManualOverride {
            subscriber_id,
            entitlement_id: entitlement.id,
            entitlement_identifier: entitlement.identifier.clone(),
            kind,
            expires_at,
            reason: None,
            created_at: Timestamp::now(),
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Subscription-derived grants
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn active_subscription_grants_product_entitlements() {
        let now = Timestamp::now();
        let pro = entitlement("pro");
        let expires = now.plus_days(10);
        let result = compute_entitlements(
            SubscriberId::new(),
            &[source(SubscriptionStatus::Active, Some(expires), vec![pro.clone()])],
            &[],
            now,
        );

        assert_eq!(result.len(), 1);
        assert!(result[0].is_active);
        assert_eq!(result[0].expires_at, Some(expires));
        assert_eq!(result[0].source, EntitlementSource::Subscription);
        assert!(!result[0].at_risk);
    }

    #[test]
    fn active_subscription_past_expiry_is_inactive() {
        let now = Timestamp::now();
        let result = compute_entitlements(
            SubscriberId::new(),
            &[source(
                SubscriptionStatus::Active,
                Some(now.minus_days(1)),
                vec![entitlement("pro")],
            )],
            &[],
            now,
        );
        assert!(!result[0].is_active);
    }

    #[test]
    fn grace_period_with_future_grace_expiry_is_entitled() {
        let now = Timestamp::now();
        let result = compute_entitlements(
            SubscriberId::new(),
            &[source(
                SubscriptionStatus::InGracePeriod,
                Some(now.plus_days(5)),
                vec![entitlement("pro")],
            )],
            &[],
            now,
        );
        assert!(result[0].is_active);
        assert!(!result[0].at_risk);
    }

    #[test]
    fn billing_retry_is_entitled_but_at_risk() {
        let now = Timestamp::now();
        let result = compute_entitlements(
            SubscriberId::new(),
            &[source(
                SubscriptionStatus::InBillingRetry,
                Some(now.minus_days(2)),
                vec![entitlement("pro")],
            )],
            &[],
            now,
        );
        assert!(result[0].is_active);
        assert!(result[0].at_risk);
    }

    #[test]
    fn expired_and_revoked_subscriptions_are_inactive() {
        let now = Timestamp::now();
        for status in [SubscriptionStatus::Expired, SubscriptionStatus::Revoked] {
            let result = compute_entitlements(
                SubscriberId::new(),
                &[source(status, Some(now.plus_days(5)), vec![entitlement("pro")])],
                &[],
                now,
            );
            assert!(!result[0].is_active, "{} should not entitle", status);
        }
    }

    #[test]
    fn non_expiring_purchase_is_active_without_expiry() {
        let now = Timestamp::now();
        let mut lifetime = source(SubscriptionStatus::Active, None, vec![entitlement("pro")]);
        lifetime.product_type = ProductType::NonConsumable;
        let result = compute_entitlements(SubscriberId::new(), &[lifetime], &[], now);
        assert!(result[0].is_active);
        assert_eq!(result[0].expires_at, None);
    }

    #[test]
    fn consumables_grant_nothing() {
        let now = Timestamp::now();
        let mut coins = source(SubscriptionStatus::Active, None, vec![entitlement("coins")]);
        coins.product_type = ProductType::Consumable;
        let result = compute_entitlements(SubscriberId::new(), &[coins], &[], now);
        assert!(result.is_empty());
    }

    #[test]
    fn overlapping_subscriptions_merge_to_latest_expiry() {
        let now = Timestamp::now();
        let pro = entitlement("pro");
        let short = source(SubscriptionStatus::Active, Some(now.plus_days(3)), vec![pro.clone()]);
        let long = source(SubscriptionStatus::Active, Some(now.plus_days(30)), vec![pro.clone()]);
        let long_id = long.subscription_id;

        let result = compute_entitlements(SubscriberId::new(), &[short, long], &[], now);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].expires_at, Some(now.plus_days(30)));
        assert_eq!(result[0].subscription_id, Some(long_id));
    }

    #[test]
    fn healthy_source_clears_at_risk() {
        let now = Timestamp::now();
        let pro = entitlement("pro");
        let retry = source(SubscriptionStatus::InBillingRetry, Some(now), vec![pro.clone()]);
        let active = source(SubscriptionStatus::Active, Some(now.plus_days(3)), vec![pro]);

        let result = compute_entitlements(SubscriberId::new(), &[retry, active], &[], now);
        assert!(result[0].is_active);
        assert!(!result[0].at_risk);
    }

    #[test]
    fn expired_source_does_not_shorten_active_expiry() {
        let now = Timestamp::now();
        let pro = entitlement("pro");
        let old = source(SubscriptionStatus::Expired, Some(now.plus_days(90)), vec![pro.clone()]);
        let active = source(SubscriptionStatus::Active, Some(now.plus_days(3)), vec![pro]);

        let result = compute_entitlements(SubscriberId::new(), &[old, active], &[], now);
        assert!(result[0].is_active);
        assert_eq!(result[0].expires_at, Some(now.plus_days(3)));
    }

    // ══════════════════════════════════════════════════════════════
    // Manual overrides
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn manual_revoke_overrides_subscription_grant() {
        let now = Timestamp::now();
        let subscriber_id = SubscriberId::new();
        let pro = entitlement("pro");
        let result = compute_entitlements(
            subscriber_id,
            &[source(SubscriptionStatus::Active, Some(now.plus_days(10)), vec![pro.clone()])],
            &[manual(subscriber_id, &pro, OverrideKind::Revoke, None)],
            now,
        );
        assert!(result.iter().all(|e| !(e.identifier == "pro" && e.is_active)));
    }

    #[test]
    fn lapsed_revoke_no_longer_applies() {
        let now = Timestamp::now();
        let subscriber_id = SubscriberId::new();
        let pro = entitlement("pro");
        let result = compute_entitlements(
            subscriber_id,
            &[source(SubscriptionStatus::Active, Some(now.plus_days(10)), vec![pro.clone()])],
            &[manual(subscriber_id, &pro, OverrideKind::Revoke, Some(now.minus_days(1)))],
            now,
        );
        assert!(result[0].is_active);
    }

    #[test]
    fn manual_grant_adds_entitlement() {
        let now = Timestamp::now();
        let subscriber_id = SubscriberId::new();
        let beta = entitlement("beta");
        let result = compute_entitlements(
            subscriber_id,
            &[],
            &[manual(subscriber_id, &beta, OverrideKind::Grant, Some(now.plus_days(7)))],
            now,
        );
        assert_eq!(result.len(), 1);
        assert!(result[0].is_active);
        assert_eq!(result[0].source, EntitlementSource::ManualGrant);
        assert_eq!(result[0].expires_at, Some(now.plus_days(7)));
        assert_eq!(result[0].subscription_id, None);
    }

    #[test]
    fn expired_manual_grant_is_ignored() {
        let now = Timestamp::now();
        let subscriber_id = SubscriberId::new();
        let beta = entitlement("beta");
        let result = compute_entitlements(
            subscriber_id,
            &[],
            &[manual(subscriber_id, &beta, OverrideKind::Grant, Some(now.minus_days(1)))],
            now,
        );
        assert!(result.is_empty());
    }

    #[test]
    fn manual_grant_revives_entitlement_of_expired_subscription() {
        let now = Timestamp::now();
        let subscriber_id = SubscriberId::new();
        let pro = entitlement("pro");
        let result = compute_entitlements(
            subscriber_id,
            &[source(SubscriptionStatus::Expired, Some(now.minus_days(1)), vec![pro.clone()])],
            &[manual(subscriber_id, &pro, OverrideKind::Grant, None)],
            now,
        );
        assert!(result[0].is_active);
        assert_eq!(result[0].expires_at, None);
        assert_eq!(result[0].source, EntitlementSource::Subscription);
    }

    #[test]
    fn output_is_sorted_by_identifier() {
        let now = Timestamp::now();
        let result = compute_entitlements(
            SubscriberId::new(),
            &[source(
                SubscriptionStatus::Active,
                None,
                vec![entitlement("zeta"), entitlement("alpha"), entitlement("mid")],
            )],
            &[],
            now,
        );
        let identifiers: Vec<&str> = result.iter().map(|e| e.identifier.as_str()).collect();
        assert_eq!(identifiers, vec!["alpha", "mid", "zeta"]);
    }

    // ══════════════════════════════════════════════════════════════
    // Properties
    // ══════════════════════════════════════════════════════════════

    fn status_strategy() -> impl Strategy<Value = SubscriptionStatus> {
        prop::sample::select(SubscriptionStatus::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn recomputation_is_idempotent(
            specs in prop::collection::vec(
                (status_strategy(), prop::option::of(-30i64..30), prop::collection::vec(0usize..4, 0..4)),
                0..6,
            ),
            revoke_idx in prop::option::of(0usize..4),
        ) {
            let now = Timestamp::now();
            let subscriber_id = SubscriberId::new();
            let pool: Vec<Entitlement> =
                ["a", "b", "c", "d"].iter().map(|i| entitlement(i)).collect();

            let sources: Vec<GrantSource> = specs
                .iter()
                .map(|(status, days, idx)| {
                    source(
                        *status,
                        days.map(|d| now.plus_days(d)),
                        idx.iter().map(|i| pool[*i].clone()).collect(),
                    )
                })
                .collect();
            let overrides: Vec<ManualOverride> = revoke_idx
                .map(|i| vec![manual(subscriber_id, &pool[i], OverrideKind::Revoke, None)])
                .unwrap_or_default();

            let first = compute_entitlements(subscriber_id, &sources, &overrides, now);
            let second = compute_entitlements(subscriber_id, &sources, &overrides, now);
            prop_assert_eq!(&first, &second);

            let mut reversed = sources.clone();
            reversed.reverse();
            let third = compute_entitlements(subscriber_id, &reversed, &overrides, now);
            prop_assert_eq!(&first, &third);

            if let Some(i) = revoke_idx {
                prop_assert!(first.iter().all(|e| e.entitlement_id != pool[i].id || !e.is_active));
            }
        }
    }
}
