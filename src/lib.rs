//! IAP Reconciler - In-app purchase subscription reconciliation engine
//!
//! Keeps App Store and Google Play subscription state, and the entitlements
//! derived from it, consistent across client receipts, store webhooks and
//! server-to-server store lookups.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
