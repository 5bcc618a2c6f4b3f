//! Domain layer containing reconciliation logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared primitives (IDs, timestamps, errors)
//! - `catalog` - Apps, products and entitlements (read-only)
//! - `subscriber` - End users of an app
//! - `subscription` - Subscription aggregate and canonical event state machine
//! - `entitlement` - Manual overrides and entitlement derivation

pub mod catalog;
pub mod entitlement;
pub mod foundation;
pub mod subscriber;
pub mod subscription;
