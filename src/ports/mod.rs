//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the reconciliation core and the outside world. Adapters implement these ports.
//!
//! ## Persistence Ports
//!
//! - `AppRegistry`, `ProductCatalog` - read-only catalog owned by the host
//! - `SubscriberRepository`, `SubscriptionRepository` - reconciled state
//! - `EntitlementRepository`, `EntitlementOverrideRepository` - derived set and manual overrides
//! - `WebhookEventRepository` - store notification ledger
//! - `SubscriptionLocker` - single writer per subscription key
//!
//! ## Store Ports
//!
//! - `StoreAdapter` - payload decoding and server-to-server store calls
//! - `NotificationNormalizer` - webhook decoding and canonical event mapping
//!
//! ## Event Ports
//!
//! - `EventPublisher` - post-commit subscription change notifications

mod app_registry;
mod entitlement_override_repository;
mod entitlement_repository;
mod event_publisher;
mod notification_normalizer;
mod product_catalog;
mod store_adapter;
mod subscriber_repository;
mod subscription_locker;
mod subscription_repository;
mod webhook_event_repository;

pub use app_registry::AppRegistry;
pub use entitlement_override_repository::EntitlementOverrideRepository;
pub use entitlement_repository::EntitlementRepository;
pub use event_publisher::EventPublisher;
pub use notification_normalizer::{DecodedNotification, NotificationNormalizer};
pub use product_catalog::ProductCatalog;
pub use store_adapter::{StoreAdapter, StoreError};
pub use subscriber_repository::SubscriberRepository;
pub use subscription_locker::{SubscriptionLockGuard, SubscriptionLocker};
pub use subscription_repository::SubscriptionRepository;
pub use webhook_event_repository::{
    ClaimOutcome, NewWebhookEvent, ProcessingResult, WebhookEventRecord, WebhookEventRepository,
};
