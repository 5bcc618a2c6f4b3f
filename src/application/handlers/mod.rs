//! Application handlers.
//!
//! Command and query handlers that orchestrate domain operations.

pub mod entitlement;
pub mod subscription;
pub mod webhook;

#[cfg(test)]
mod test_support;

pub use entitlement::{
    // Commands
    ClearEntitlementOverrideCommand,
    ClearEntitlementOverrideHandler,
    ClearEntitlementOverrideResult,
    EntitlementRecomputer,
    GrantEntitlementCommand,
    GrantEntitlementHandler,
    ManualOverrideResult,
    RevokeEntitlementCommand,
    RevokeEntitlementHandler,
    // Queries
    EntitlementSnapshot,
    GetEntitlementsHandler,
    GetEntitlementsQuery,
};
pub use subscription::{
    // Reconciliation
    ReceiptReconciliation,
    ReconcileResult,
    StoreAdapters,
    SubscriptionReconciler,
    // Commands
    ResyncSubscriptionCommand,
    ResyncSubscriptionHandler,
    ValidateReceiptCommand,
    ValidateReceiptHandler,
    ValidateReceiptResult,
};
pub use webhook::{
    HandleStoreWebhookCommand, HandleStoreWebhookHandler, PurgeWebhookEventsCommand,
    PurgeWebhookEventsHandler, WebhookOutcome,
};
