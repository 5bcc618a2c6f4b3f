//! Shared fixtures for handler tests, backed by the in-memory adapters.

use std::sync::Arc;

use crate::adapters::events::InMemoryEventPublisher;
use crate::adapters::memory::{
    FakeStoreAdapter, InMemoryCatalog, InMemoryEntitlementOverrideRepository,
    InMemoryEntitlementRepository, InMemorySubscriberRepository, InMemorySubscriptionLocker,
    InMemorySubscriptionRepository, InMemoryWebhookEventRepository,
};
use crate::domain::catalog::{App, Entitlement, Product, ProductType};
use crate::domain::foundation::{
    AppId, AppUserId, EntitlementId, ProductId, SubscriberId, Timestamp,
};
use crate::domain::subscriber::Subscriber;
use crate::domain::subscription::{
    CanonicalEvent, Platform, StoreEnvironment, StoreTransaction, Subscription, SubscriptionFact,
    SubscriptionStatus,
};
use crate::ports::{SubscriberRepository, SubscriptionRepository};

use super::entitlement::EntitlementRecomputer;
use super::subscription::{StoreAdapters, SubscriptionReconciler};

pub const BUNDLE_ID: &str = "com.example.app";
pub const MONTHLY: &str = "com.example.pro.monthly";
pub const YEARLY: &str = "com.example.pro.yearly";
pub const COINS: &str = "com.example.coins";

pub struct Harness {
    pub app: App,
    pub catalog: Arc<InMemoryCatalog>,
    pub subscribers: Arc<InMemorySubscriberRepository>,
    pub subscriptions: Arc<InMemorySubscriptionRepository>,
    pub entitlements: Arc<InMemoryEntitlementRepository>,
    pub overrides: Arc<InMemoryEntitlementOverrideRepository>,
    pub ledger: Arc<InMemoryWebhookEventRepository>,
    pub locker: Arc<InMemorySubscriptionLocker>,
    pub publisher: Arc<InMemoryEventPublisher>,
    pub ios: Arc<FakeStoreAdapter>,
    pub android: Arc<FakeStoreAdapter>,
    pub monthly: Product,
    pub yearly: Product,
    pub pro: Entitlement,
    pub premium: Entitlement,
}

impl Harness {
    /// One app with pro monthly/yearly products on both platforms.
    ///
    /// Monthly grants `pro`; yearly grants `pro` and `premium`.
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
        let premium = Entitlement {
            id: EntitlementId::new(),
            app_id: app.id,
            identifier: "premium".to_string(),
            description: None,
        };
        catalog.add_entitlement(pro.clone());
        catalog.add_entitlement(premium.clone());

        let mut monthly = None;
        let mut yearly = None;
        for platform in [Platform::Ios, Platform::Android] {
            let m = product(&app, platform, MONTHLY, ProductType::AutoRenewableSubscription);
            let y = product(&app, platform, YEARLY, ProductType::AutoRenewableSubscription);
            let c = product(&app, platform, COINS, ProductType::Consumable);
            catalog.attach(m.id, pro.id);
            catalog.attach(y.id, pro.id);
            catalog.attach(y.id, premium.id);
            catalog.attach(c.id, pro.id);
            catalog.add_product(m.clone());
            catalog.add_product(y.clone());
            catalog.add_product(c);
            if platform == Platform::Ios {
                monthly = Some(m);
                yearly = Some(y);
            }
        }

        Self {
            app,
            catalog,
            subscribers: Arc::new(InMemorySubscriberRepository::new()),
            subscriptions: Arc::new(InMemorySubscriptionRepository::new()),
            entitlements: Arc::new(InMemoryEntitlementRepository::new()),
            overrides: Arc::new(InMemoryEntitlementOverrideRepository::new()),
            ledger: Arc::new(InMemoryWebhookEventRepository::new()),
            locker: Arc::new(InMemorySubscriptionLocker::new()),
            publisher: Arc::new(InMemoryEventPublisher::new()),
            ios: Arc::new(FakeStoreAdapter::new(Platform::Ios)),
            android: Arc::new(FakeStoreAdapter::new(Platform::Android)),
            monthly: monthly.unwrap(),
            yearly: yearly.unwrap(),
            pro,
            premium,
        }
    }

    pub fn recomputer(&self) -> Arc<EntitlementRecomputer> {
        Arc::new(EntitlementRecomputer::new(
            self.subscriptions.clone(),
            self.catalog.clone(),
            self.overrides.clone(),
            self.entitlements.clone(),
            self.locker.clone(),
        ))
    }

    pub fn reconciler(&self) -> Arc<SubscriptionReconciler> {
        Arc::new(SubscriptionReconciler::new(
            self.subscriptions.clone(),
            self.catalog.clone(),
            self.locker.clone(),
            self.recomputer(),
            self.publisher.clone(),
        ))
    }

    pub fn stores(&self) -> StoreAdapters {
        StoreAdapters::new()
            .with(self.ios.clone())
            .with(self.android.clone())
    }

    pub async fn subscriber(&self, app_user_id: &str) -> Subscriber {
        self.subscribers
            .get_or_create(&self.app.id, &AppUserId::new(app_user_id).unwrap())
            .await
            .unwrap()
    }

    /// Inserts an iOS monthly subscription directly, bypassing the reconciler.
    pub async fn seed_subscription(
        &self,
        subscriber_id: &SubscriberId,
        original_transaction_id: &str,
        status: SubscriptionStatus,
        expires_in_days: Option<i64>,
    ) -> Subscription {
        let now = Timestamp::now();
        let tx = ios_transaction(
            original_transaction_id,
            original_transaction_id,
            expires_in_days.map(|d| now.plus_days(d)),
        );
        let mut subscription = Subscription::activate(
            *subscriber_id,
            self.app.id,
            self.monthly.id,
            &tx,
            None,
            now,
        );
        subscription.status = status;
        if status == SubscriptionStatus::InGracePeriod {
            subscription.grace_period_expires_date = Some(now.plus_days(7));
        }
        self.subscriptions.insert(&subscription).await.unwrap();
        subscription
    }
}

fn product(app: &App, platform: Platform, store_product_id: &str, product_type: ProductType) -> Product {
    Product {
        id: ProductId::new(),
        app_id: app.id,
        platform,
        store_product_id: store_product_id.to_string(),
        product_type,
        display_name: None,
    }
}

/// Verified iOS monthly transaction.
pub fn ios_transaction(
    original_transaction_id: &str,
    transaction_id: &str,
    expires_date: Option<Timestamp>,
) -> StoreTransaction {
    StoreTransaction {
        platform: Platform::Ios,
        transaction_id: transaction_id.to_string(),
        original_transaction_id: original_transaction_id.to_string(),
        product_id: MONTHLY.to_string(),
        app_identifier: Some(BUNDLE_ID.to_string()),
        purchase_date: Timestamp::now(),
        expires_date,
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

/// Verified Android monthly purchase keyed by its purchase token.
pub fn android_transaction(purchase_token: &str, expires_date: Option<Timestamp>) -> StoreTransaction {
    StoreTransaction {
        platform: Platform::Android,
        transaction_id: format!("GPA.{}", purchase_token),
        original_transaction_id: purchase_token.to_string(),
        app_identifier: Some(BUNDLE_ID.to_string()),
        ..ios_transaction(purchase_token, purchase_token, expires_date)
    }
}

/// Fact carrying a fresh iOS transaction expiring `expires_in_days` from now.
pub fn ios_fact(
    original_transaction_id: &str,
    transaction_id: &str,
    event: CanonicalEvent,
    expires_in_days: i64,
) -> SubscriptionFact {
    let now = Timestamp::now();
    SubscriptionFact::from_transaction(
        event,
        ios_transaction(
            original_transaction_id,
            transaction_id,
            Some(now.plus_days(expires_in_days)),
        ),
        None,
        now,
    )
}
