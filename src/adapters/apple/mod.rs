//! Apple App Store adapters.
//!
//! - `jws` - signed payload verification against the pinned Apple root
//! - `api` - App Store Server API client
//! - `store_adapter` - `StoreAdapter` implementation
//! - `normalizer` - App Store Server Notifications v2 mapping

mod api;
mod jws;
mod models;
mod normalizer;
mod store_adapter;

pub use api::{AppStoreServerClient, AppleApiConfig, PRODUCTION_BASE_URL, SANDBOX_BASE_URL};
pub use jws::{unsigned_jws, AppleJwsVerifier, VerificationMode, APPLE_ROOT_CA_G3_FINGERPRINT};
pub use normalizer::AppleNotificationNormalizer;
pub use store_adapter::{renewal_from_payload, transaction_from_payload, AppleStoreAdapter};
