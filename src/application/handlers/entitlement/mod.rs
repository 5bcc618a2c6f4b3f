//! Entitlement handlers.
//!
//! ## Commands
//! - Recomputing a subscriber's entitlement set
//! - Manual grants, revokes and clearing them
//!
//! ## Queries
//! - Entitlement snapshot for an app user

mod clear_entitlement_override;
mod get_entitlements;
mod grant_entitlement;
mod recompute_entitlements;
mod revoke_entitlement;

// Commands
pub use clear_entitlement_override::{
    ClearEntitlementOverrideCommand, ClearEntitlementOverrideHandler,
    ClearEntitlementOverrideResult,
};
pub use grant_entitlement::{GrantEntitlementCommand, GrantEntitlementHandler, ManualOverrideResult};
pub use recompute_entitlements::EntitlementRecomputer;
pub use revoke_entitlement::{RevokeEntitlementCommand, RevokeEntitlementHandler};

// Queries
pub use get_entitlements::{EntitlementSnapshot, GetEntitlementsHandler, GetEntitlementsQuery};
