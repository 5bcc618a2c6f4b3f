//! Subscription handlers.
//!
//! ## Commands
//! - Validating a client receipt
//! - Resyncing a subscription from the store's status API
//!
//! `SubscriptionReconciler` is the shared write path used by the commands
//! above and by the webhook handler.

mod reconcile_subscription;
mod resync_subscription;
mod store_adapters;
mod validate_receipt;

pub use reconcile_subscription::{ReceiptReconciliation, ReconcileResult, SubscriptionReconciler};
pub use store_adapters::StoreAdapters;

// Commands
pub use resync_subscription::{ResyncSubscriptionCommand, ResyncSubscriptionHandler};
pub use validate_receipt::{ValidateReceiptCommand, ValidateReceiptHandler, ValidateReceiptResult};
