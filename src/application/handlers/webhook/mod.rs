//! Store webhook handlers.
//!
//! ## Commands
//! - Handling an App Store Server Notification or Play RTDN delivery
//! - Purging processed ledger rows past retention

mod handle_store_webhook;
mod purge_webhook_events;

// Commands
pub use handle_store_webhook::{HandleStoreWebhookCommand, HandleStoreWebhookHandler, WebhookOutcome};
pub use purge_webhook_events::{PurgeWebhookEventsCommand, PurgeWebhookEventsHandler};
