#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use fake::{
    faker::{address::en::CityName, company::en::CompanyName, internet::en::Username},
    Fake,
};
use primitive_types::{H256, U256};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

use event_payout::{
    app,
    config::{
        AppConfig, ChainConfig, CircuitBreakerConfig, Config, DatabaseConfig, NotificationConfig,
        RedisConfig, StartupMode,
    },
    database::Database,
    models::{Event, EventUpdate, NewEvent, NewUser, OutboxEntry},
    services::notification::{Notifier, NotifyError},
    wallet::{
        keys::KeyDeriver, Address, DerivationPath, TransferRequest, TxHash, WalletError,
        WalletHandle, WalletResolver,
    },
    AppState,
};

pub const MASTER_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
pub const SERVICE_PRINCIPAL: &str = "wwifi-ux777-77774-qaana-cai";
pub const OWNER_PRINCIPAL: &str = "owner-principal";
pub const CALLER_PRINCIPAL: &str = "rrkah-fqaaa-aaaaa-aaaaq-cai";

pub fn test_config() -> Config {
    Config {
        app: AppConfig {
            host: "127.0.0.1".into(),
            port: 0,
            rust_log: "error".into(),
            log_format: "pretty".into(),
            startup_mode: StartupMode::Init,
            payment_link_base: "http://localhost:8000/payment".into(),
        },
        database: DatabaseConfig { url: "sqlite::memory:".into() },
        redis: RedisConfig {
            url: "redis://127.0.0.1:6379".into(),
            snapshot_key: "DATABASE".into(),
        },
        chain: ChainConfig {
            rpc_url: "http://127.0.0.1:8545".into(),
            chain_id: 84532,
            gas_limit: 21_000,
            master_key: MASTER_KEY.into(),
            service_principal: SERVICE_PRINCIPAL.into(),
            owner_principal: Some(OWNER_PRINCIPAL.into()),
            request_timeout_seconds: 5,
        },
        circuit_breaker: CircuitBreakerConfig { failure_threshold: 5, timeout_seconds: 60 },
        notification: NotificationConfig {
            delay_seconds: 0,
            poll_interval_seconds: 1,
            max_attempts: 3,
        },
    }
}

/// What the payout flow asked of the wallet layer.
#[derive(Default)]
pub struct WalletCalls {
    pub resolves: AtomicUsize,
    pub transfers: AtomicUsize,
    pub fail_transfers: AtomicBool,
    pub transfer_delay_ms: AtomicU64,
    pub sent: Mutex<Vec<(Address, TransferRequest)>>,
}

/// Wallet resolver with real key derivation and no chain behind it.
pub struct MockWalletResolver {
    deriver: KeyDeriver,
    pub calls: Arc<WalletCalls>,
}

impl MockWalletResolver {
    pub fn new() -> Self {
        Self {
            deriver: KeyDeriver::from_hex(MASTER_KEY).unwrap(),
            calls: Arc::new(WalletCalls::default()),
        }
    }

    pub fn address_of(&self, principal: &str) -> Address {
        self.deriver
            .address(&DerivationPath::from_principal(principal))
            .unwrap()
    }

    pub fn fail_transfers(&self, fail: bool) {
        self.calls.fail_transfers.store(fail, Ordering::SeqCst);
    }

    pub fn delay_transfers(&self, delay: Duration) {
        self.calls
            .transfer_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn resolves(&self) -> usize {
        self.calls.resolves.load(Ordering::SeqCst)
    }

    pub fn transfers(&self) -> usize {
        self.calls.transfers.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletResolver for MockWalletResolver {
    async fn resolve(&self, path: &DerivationPath) -> Result<Arc<dyn WalletHandle>, WalletError> {
        self.calls.resolves.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockWallet {
            address: self.deriver.address(path)?,
            calls: self.calls.clone(),
        }))
    }

    async fn balance(&self, address: Address) -> Result<U256, WalletError> {
        Ok(U256::from(address.as_bytes()[19]) * U256::exp10(15))
    }
}

struct MockWallet {
    address: Address,
    calls: Arc<WalletCalls>,
}

#[async_trait]
impl WalletHandle for MockWallet {
    fn address(&self) -> Address {
        self.address
    }

    async fn transfer(&self, request: &TransferRequest) -> Result<TxHash, WalletError> {
        let delay = self.calls.transfer_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.calls.fail_transfers.load(Ordering::SeqCst) {
            return Err(WalletError::Rpc {
                code: -32000,
                message: "insufficient funds for gas * price + value".into(),
            });
        }
        let n = self.calls.transfers.fetch_add(1, Ordering::SeqCst) + 1;
        self.calls.sent.lock().unwrap().push((self.address, request.clone()));
        Ok(TxHash(H256::from_low_u64_be(n as u64)))
    }
}

/// Notifier that remembers what it delivered.
#[derive(Default)]
pub struct RecordingNotifier {
    pub delivered: Mutex<Vec<OutboxEntry>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, entry: &OutboxEntry) -> Result<(), NotifyError> {
        self.delivered.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub wallets: Arc<MockWalletResolver>,
    pub notifier: Arc<RecordingNotifier>,
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(test_config()).await
}

pub async fn spawn_app_with(config: Config) -> TestApp {
    let db = Database::in_memory().await.unwrap();
    let wallets = Arc::new(MockWalletResolver::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let state = AppState::new(config, db, wallets.clone(), notifier.clone());
    TestApp { state, wallets, notifier }
}

pub async fn seed_event(state: &AppState, price: Option<&str>, capacity: i64, booked: i64) -> Event {
    let organizer = state
        .users
        .create(&NewUser {
            username: Username().fake(),
            age: (18i64..80).fake::<i64>(),
        })
        .await
        .unwrap();

    let event = state
        .events
        .create(&NewEvent {
            user_id: organizer.id,
            name: CompanyName().fake(),
            date: "2025-08-10".into(),
            location: CityName().fake(),
            price: price.map(String::from),
            capacity,
            min_age: None,
        })
        .await
        .unwrap();

    if booked == 0 {
        return event;
    }
    state
        .events
        .update_fields(&EventUpdate {
            booked_count: Some(booked),
            ..EventUpdate::new(event.id)
        })
        .await
        .unwrap()
}

/// Sends one request through the router and decodes the body as JSON
/// (plain text bodies come back as a JSON string).
pub async fn send(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, Value) {
    let response = app(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, body)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Polls until `check` holds or a second has passed.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
