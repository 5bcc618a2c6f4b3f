//! Google Play adapters.
//!
//! - `auth` - service-account access tokens
//! - `api` - Play Developer API client (`subscriptionsv2`)
//! - `store_adapter` - `StoreAdapter` implementation
//! - `normalizer` - Pub/Sub real-time developer notifications

mod api;
mod auth;
mod models;
mod normalizer;
mod store_adapter;

pub use api::{GooglePlayConfig, PlayDeveloperClient, ANDROID_PUBLISHER_BASE_URL};
pub use auth::{ServiceAccountKey, ServiceAccountTokenProvider, ANDROID_PUBLISHER_SCOPE};
pub use normalizer::GoogleNotificationNormalizer;
pub use store_adapter::{transaction_from_subscription, GoogleStoreAdapter};
