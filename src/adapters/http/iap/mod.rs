//! HTTP adapter for receipt validation, entitlement queries and store webhooks.
//!
//! - `POST /v1/apps/:app_id/receipts` - Validate a receipt
//! - `GET /v1/apps/:app_id/subscribers/:app_user_id/entitlements` - Entitlement snapshot
//! - `POST /v1/apps/:app_id/subscriptions/:platform/:original_transaction_id/resync` - Resync
//! - `POST /webhooks/apple/:app_id` - App Store Server Notifications
//! - `POST /webhooks/google/:app_id?token=` - Play RTDN via Pub/Sub push

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::*;
pub use handlers::{IapApiError, IapAppState};
pub use routes::iap_router;
