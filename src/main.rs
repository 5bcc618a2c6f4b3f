use std::sync::Arc;

use secrecy::SecretString;
use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use iap_reconciler::adapters::apple::{
    AppStoreServerClient, AppleApiConfig, AppleJwsVerifier, AppleNotificationNormalizer,
    AppleStoreAdapter,
};
use iap_reconciler::adapters::events::TracingEventPublisher;
use iap_reconciler::adapters::google::{
    GoogleNotificationNormalizer, GooglePlayConfig, GoogleStoreAdapter, PlayDeveloperClient,
};
use iap_reconciler::adapters::http::{self, IapAppState};
use iap_reconciler::adapters::postgres::{
    PostgresCatalog, PostgresEntitlementOverrideRepository, PostgresEntitlementRepository,
    PostgresSubscriberRepository, PostgresSubscriptionLocker, PostgresSubscriptionRepository,
    PostgresWebhookEventRepository,
};
use iap_reconciler::application::{
    EntitlementRecomputer, PurgeWebhookEventsCommand, PurgeWebhookEventsHandler, StoreAdapters,
    SubscriptionReconciler,
};
use iap_reconciler::config::{AppConfig, AppleConfig, GoogleConfig};
use iap_reconciler::ports::{NotificationNormalizer, StoreAdapter, WebhookEventRepository};

#[tokio::main]
async fn main() {
    let config = AppConfig::load().expect("Failed to load configuration");

    init_tracing(&config);

    config.validate().expect("Invalid configuration");

    let pool = config
        .database
        .pool_options()
        .connect(&config.database.url)
        .await
        .expect("Failed to connect to database");
    let lock_pool = config
        .database
        .lock_pool_options()
        .connect(&config.database.url)
        .await
        .expect("Failed to open lock pool");

    if config.database.run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");
        tracing::info!("Database migrations applied");
    }

    let apple = Arc::new(build_apple_adapter(&config.apple));
    let google: Arc<dyn StoreAdapter> = Arc::new(build_google_adapter(&config.google));

    let stores = StoreAdapters::new()
        .with(apple.clone() as Arc<dyn StoreAdapter>)
        .with(google.clone());

    let normalizers: Vec<Arc<dyn NotificationNormalizer>> = vec![
        Arc::new(AppleNotificationNormalizer::new(apple)),
        Arc::new(GoogleNotificationNormalizer::new(
            google,
            config
                .google
                .pubsub_push_token
                .clone()
                .filter(|t| !t.trim().is_empty())
                .map(SecretString::new),
        )),
    ];

    let state = build_state(pool, lock_pool, &config, stores, normalizers);
    spawn_ledger_purge(state.ledger.clone(), &config);

    let app = http::router(state, config.server.request_timeout());

    let addr = config
        .server
        .socket_addr()
        .expect("Invalid server address");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind server address");

    tracing::info!(
        %addr,
        environment = ?config.server.environment,
        "IAP reconciler listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");

    tracing::info!("Server stopped");
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.is_production() {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn build_apple_adapter(config: &AppleConfig) -> AppleStoreAdapter {
    let verifier = if config.insecure_skip_verification {
        tracing::warn!("App Store signature verification is disabled");
        AppleJwsVerifier::insecure_decode_only()
    } else {
        match config.root_fingerprints() {
            Some(fingerprints) => AppleJwsVerifier::with_root_fingerprints(fingerprints),
            None => AppleJwsVerifier::new(),
        }
    };

    let api = match (&config.issuer_id, &config.key_id, &config.private_key) {
        (Some(issuer_id), Some(key_id), Some(private_key)) if config.has_server_api() => {
            let api_config = AppleApiConfig::new(
                issuer_id.clone(),
                key_id.clone(),
                SecretString::new(private_key.clone()),
            )
            .with_allow_sandbox(config.allow_sandbox)
            .with_timeout(config.api_timeout());
            Some(
                AppStoreServerClient::new(api_config)
                    .expect("Failed to build App Store Server API client"),
            )
        }
        _ => {
            tracing::warn!("App Store Server API not configured, receipts are trusted as signed");
            None
        }
    };

    AppleStoreAdapter::new(verifier, api)
}

fn build_google_adapter(config: &GoogleConfig) -> GoogleStoreAdapter {
    let api = match &config.service_account_json {
        Some(json) if config.has_developer_api() => {
            let play_config = GooglePlayConfig::new(SecretString::new(json.clone()))
                .with_timeout(config.api_timeout());
            Some(
                PlayDeveloperClient::new(play_config)
                    .expect("Failed to build Play Developer API client"),
            )
        }
        _ => {
            tracing::warn!("Play Developer API not configured, Android receipts will be rejected");
            None
        }
    };

    GoogleStoreAdapter::new(api)
}

fn build_state(
    pool: PgPool,
    lock_pool: PgPool,
    config: &AppConfig,
    stores: StoreAdapters,
    normalizers: Vec<Arc<dyn NotificationNormalizer>>,
) -> IapAppState {
    let catalog = Arc::new(PostgresCatalog::new(pool.clone()));
    let subscriptions = Arc::new(PostgresSubscriptionRepository::new(pool.clone()));
    let entitlements = Arc::new(PostgresEntitlementRepository::new(pool.clone()));

    let locker = Arc::new(PostgresSubscriptionLocker::new(lock_pool));

    let recomputer = Arc::new(EntitlementRecomputer::new(
        subscriptions.clone(),
        catalog.clone(),
        Arc::new(PostgresEntitlementOverrideRepository::new(pool.clone())),
        entitlements.clone(),
        locker.clone(),
    ));
    let reconciler = Arc::new(SubscriptionReconciler::new(
        subscriptions.clone(),
        catalog.clone(),
        locker,
        recomputer,
        Arc::new(TracingEventPublisher::new()),
    ));

    IapAppState {
        apps: catalog.clone(),
        catalog,
        subscribers: Arc::new(PostgresSubscriberRepository::new(pool.clone())),
        subscriptions,
        entitlements,
        ledger: Arc::new(PostgresWebhookEventRepository::new(pool)),
        stores,
        normalizers,
        reconciler,
        webhook_claim_lease: config.webhooks.claim_lease(),
    }
}

fn spawn_ledger_purge(ledger: Arc<dyn WebhookEventRepository>, config: &AppConfig) {
    let handler = PurgeWebhookEventsHandler::new(ledger);
    let cmd = PurgeWebhookEventsCommand {
        retention: config.webhooks.retention(),
    };
    let period = config.webhooks.purge_interval();

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            if let Err(e) = handler.handle(cmd).await {
                tracing::error!(error = %e, "Webhook ledger purge failed");
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, stopping server...");
}
