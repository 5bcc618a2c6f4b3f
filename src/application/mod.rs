//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! All subscription writes go through `SubscriptionReconciler`; the other
//! handlers validate input and decide what to reconcile.

pub mod handlers;

pub use handlers::{
    // Receipts and resync
    ResyncSubscriptionCommand, ResyncSubscriptionHandler, StoreAdapters, SubscriptionReconciler,
    ValidateReceiptCommand, ValidateReceiptHandler, ValidateReceiptResult,
    // Webhooks
    HandleStoreWebhookCommand, HandleStoreWebhookHandler, PurgeWebhookEventsCommand,
    PurgeWebhookEventsHandler, WebhookOutcome,
    // Entitlements
    EntitlementRecomputer, EntitlementSnapshot, GetEntitlementsHandler, GetEntitlementsQuery,
    ClearEntitlementOverrideCommand, ClearEntitlementOverrideHandler, GrantEntitlementCommand,
    GrantEntitlementHandler, RevokeEntitlementCommand, RevokeEntitlementHandler,
};
