//! Shared test infrastructure: one app wired to the in-memory adapters and
//! scriptable stores.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use iap_reconciler::adapters::events::InMemoryEventPublisher;
use iap_reconciler::adapters::http::IapAppState;
use iap_reconciler::adapters::memory::{
    FakeNotificationNormalizer, FakeStoreAdapter, InMemoryCatalog,
    InMemoryEntitlementOverrideRepository, InMemoryEntitlementRepository,
    InMemorySubscriberRepository, InMemorySubscriptionLocker, InMemorySubscriptionRepository,
    InMemoryWebhookEventRepository,
};
use iap_reconciler::application::{
    EntitlementRecomputer, HandleStoreWebhookHandler, StoreAdapters, SubscriptionReconciler,
};
use iap_reconciler::domain::catalog::{App, Entitlement, Product, ProductType};
use iap_reconciler::domain::foundation::{AppId, EntitlementId, ProductId, Timestamp};
use iap_reconciler::domain::subscription::{
    CanonicalEvent, Platform, StoreEnvironment, StoreTransaction, SubscriptionFact,
};
use iap_reconciler::ports::{DecodedNotification, NotificationNormalizer};

pub const BUNDLE_ID: &str = "com.example.app";
pub const MONTHLY: &str = "com.example.pro.monthly";

pub struct TestWorld {
    pub app: App,
    pub catalog: Arc<InMemoryCatalog>,
    pub subscribers: Arc<InMemorySubscriberRepository>,
    pub subscriptions: Arc<InMemorySubscriptionRepository>,
    pub entitlements: Arc<InMemoryEntitlementRepository>,
    pub overrides: Arc<InMemoryEntitlementOverrideRepository>,
    pub ledger: Arc<InMemoryWebhookEventRepository>,
    pub publisher: Arc<InMemoryEventPublisher>,
    pub ios: Arc<FakeStoreAdapter>,
    pub android: Arc<FakeStoreAdapter>,
    pub apple_webhooks: Arc<FakeNotificationNormalizer>,
    pub google_webhooks: Arc<FakeNotificationNormalizer>,
    pub recomputer: Arc<EntitlementRecomputer>,
    pub reconciler: Arc<SubscriptionReconciler>,
}

impl TestWorld {
    /// One app whose monthly product grants `pro` on both platforms.
    pub fn new() -> Self {
        let app = App {
            id: AppId::new(),
            name: "Example".to_string(),
            bundle_id: Some(BUNDLE_ID.to_string()),
            package_name: Some(BUNDLE_ID.to_string()),
        };
        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.add_app(app.clone());

        let pro = Entitlement {
            id: EntitlementId::new(),
            app_id: app.id,
            identifier: "pro".to_string(),
            description: None,
        };
        catalog.add_entitlement(pro.clone());
        for platform in [Platform::Ios, Platform::Android] {
            let product = Product {
                id: ProductId::new(),
                app_id: app.id,
                platform,
                store_product_id: MONTHLY.to_string(),
                product_type: ProductType::AutoRenewableSubscription,
                display_name: None,
            };
            catalog.attach(product.id, pro.id);
            catalog.add_product(product);
        }

        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        let entitlements = Arc::new(InMemoryEntitlementRepository::new());
        let overrides = Arc::new(InMemoryEntitlementOverrideRepository::new());
        let publisher = Arc::new(InMemoryEventPublisher::new());

        let locker = Arc::new(InMemorySubscriptionLocker::new());
        let recomputer = Arc::new(EntitlementRecomputer::new(
            subscriptions.clone(),
            catalog.clone(),
            overrides.clone(),
            entitlements.clone(),
            locker.clone(),
        ));
        let reconciler = Arc::new(SubscriptionReconciler::new(
            subscriptions.clone(),
            catalog.clone(),
            locker,
            recomputer.clone(),
            publisher.clone(),
        ));

        Self {
            app,
            catalog,
            subscribers: Arc::new(InMemorySubscriberRepository::new()),
            subscriptions,
            entitlements,
            overrides,
            ledger: Arc::new(InMemoryWebhookEventRepository::new()),
            publisher,
            ios: Arc::new(FakeStoreAdapter::new(Platform::Ios)),
            android: Arc::new(FakeStoreAdapter::new(Platform::Android)),
            apple_webhooks: Arc::new(FakeNotificationNormalizer::new(Platform::Ios)),
            google_webhooks: Arc::new(FakeNotificationNormalizer::new(Platform::Android)),
            recomputer,
            reconciler,
        }
    }

    pub fn stores(&self) -> StoreAdapters {
        StoreAdapters::new()
            .with(self.ios.clone())
            .with(self.android.clone())
    }

    pub fn normalizers(&self) -> Vec<Arc<dyn NotificationNormalizer>> {
        vec![
            self.apple_webhooks.clone() as Arc<dyn NotificationNormalizer>,
            self.google_webhooks.clone() as Arc<dyn NotificationNormalizer>,
        ]
    }

    pub fn webhook_handler(&self) -> HandleStoreWebhookHandler {
        HandleStoreWebhookHandler::new(
            self.catalog.clone(),
            self.normalizers(),
            self.ledger.clone(),
            self.reconciler.clone(),
            Duration::from_secs(60),
        )
    }

    pub fn app_state(&self) -> IapAppState {
        IapAppState {
            apps: self.catalog.clone(),
            catalog: self.catalog.clone(),
            subscribers: self.subscribers.clone(),
            subscriptions: self.subscriptions.clone(),
            entitlements: self.entitlements.clone(),
            ledger: self.ledger.clone(),
            stores: self.stores(),
            normalizers: self.normalizers(),
            reconciler: self.reconciler.clone(),
            webhook_claim_lease: Duration::from_secs(60),
        }
    }

    /// Scripts an iOS receipt that both decodes and verifies server-side.
    pub fn script_ios_receipt(&self, raw: &str, transaction: StoreTransaction) {
        self.ios.add_receipt(raw, transaction.clone());
        self.ios.set_latest(transaction);
    }

    /// Scripts an Apple webhook body carrying `fact`.
    pub fn script_apple_webhook(&self, body: &str, event_id: &str, fact: Option<SubscriptionFact>) {
        self.apple_webhooks.add(body, apple_notification(event_id), fact);
    }
}

pub fn apple_notification(event_id: &str) -> DecodedNotification {
    DecodedNotification {
        platform: Platform::Ios,
        provider_event_id: event_id.to_string(),
        event_type: "DID_RENEW".to_string(),
        app_identifier: Some(BUNDLE_ID.to_string()),
        environment: Some(StoreEnvironment::Production),
        payload: serde_json::json!({ "notificationUUID": event_id }),
        signed_at: None,
    }
}

/// Verified iOS monthly transaction expiring `expires_in_days` from now.
pub fn ios_transaction(
    original_transaction_id: &str,
    transaction_id: &str,
    expires_in_days: i64,
) -> StoreTransaction {
    let now = Timestamp::now();
    StoreTransaction {
        platform: Platform::Ios,
        transaction_id: transaction_id.to_string(),
        original_transaction_id: original_transaction_id.to_string(),
        product_id: MONTHLY.to_string(),
        app_identifier: Some(BUNDLE_ID.to_string()),
        purchase_date: now,
        expires_date: Some(now.plus_days(expires_in_days)),
        is_trial_period: false,
        is_in_intro_offer_period: false,
        offer_type: None,
        environment: StoreEnvironment::Production,
        revocation_date: None,
        revocation_reason: None,
        auto_renew_enabled: Some(true),
        linked_original_transaction_id: None,
    }
}

pub fn ios_fact(
    original_transaction_id: &str,
    transaction_id: &str,
    event: CanonicalEvent,
    expires_in_days: i64,
) -> SubscriptionFact {
    SubscriptionFact::from_transaction(
        event,
        ios_transaction(original_transaction_id, transaction_id, expires_in_days),
        None,
        Timestamp::now(),
    )
}

pub fn bare_fact(original_transaction_id: &str, event: CanonicalEvent) -> SubscriptionFact {
    SubscriptionFact::without_transaction(original_transaction_id, event, Timestamp::now())
}
