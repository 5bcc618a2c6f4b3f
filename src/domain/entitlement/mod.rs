//! Entitlement domain.
//!
//! - `overrides` - Manual grants and revokes
//! - `compute` - Pure derivation of a subscriber's entitlement set

mod compute;
mod overrides;

pub use compute::{compute_entitlements, EntitlementSource, GrantSource, SubscriberEntitlement};
pub use overrides::{ManualOverride, OverrideKind};
