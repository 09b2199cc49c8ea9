pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod middleware;
pub mod models;
pub mod redis_client;
pub mod services;
pub mod snapshot;
pub mod store;
pub mod wallet;

use axum::{routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use config::Config;
use database::Database;
use middleware::Caller;
use services::{NotificationDispatcher, Notifier, PayoutService, PayoutSettings};
use store::{EventStore, NotificationOutbox, UserStore};
use wallet::{DerivationPath, WalletResolver};

// Shared state for the whole application
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Config,
    pub events: EventStore,
    pub users: UserStore,
    pub wallets: Arc<dyn WalletResolver>,
    pub notifications: Arc<NotificationDispatcher>,
    pub payouts: PayoutService,
}

impl AppState {
    pub fn new(
        config: Config,
        db: Database,
        wallets: Arc<dyn WalletResolver>,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        let events = EventStore::new(&db);
        let users = UserStore::new(&db);
        let notifications = Arc::new(NotificationDispatcher::new(
            NotificationOutbox::new(&db),
            notifier,
            config.notification.max_attempts,
        ));

        let settings = PayoutSettings {
            gas_limit: config.chain.gas_limit,
            notification_delay: Duration::from_secs(config.notification.delay_seconds),
            ..PayoutSettings::new(DerivationPath::from_principal(&config.chain.service_principal))
        };
        let payouts = PayoutService::new(events.clone(), wallets.clone(), notifications.clone(), settings);

        Arc::new(Self {
            db,
            config,
            events,
            users,
            wallets,
            notifications,
            payouts,
        })
    }

    /// Path of the wallet that receives payouts.
    pub fn service_path(&self) -> DerivationPath {
        self.payouts.settings().service_path.clone()
    }

    pub fn is_owner(&self, caller: &Caller) -> bool {
        self.config
            .chain
            .owner_principal
            .as_deref()
            .is_some_and(|owner| owner == caller.principal)
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Event Payout API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        .merge(controllers::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
