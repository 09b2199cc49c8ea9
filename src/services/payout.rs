//! payout.rs
//!
//! Event payment flow: validate the event, take a seat, move the ticket
//! price from the caller's wallet to the service wallet, and queue a
//! confirmation for the caller.
//!
//! The seat is taken with a single conditional update *before* any wallet
//! work, so two callers racing for the last seat cannot both pay. If the
//! transfer fails the seat is handed back.

use primitive_types::U256;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use super::notification::{NotificationDispatcher, NotificationScheduler};
use crate::{
    error::{ApiError, StoreError},
    models::NewNotification,
    store::EventStore,
    wallet::{
        parse_ether, Address, AmountError, DerivationPath, TransferRequest, TxHash, WalletError,
        WalletResolver, TRANSFER_GAS_LIMIT,
    },
};

#[derive(Debug, Error)]
pub enum PayoutError {
    #[error("Event not found")]
    NotFound(i64),
    #[error("Event is fully booked")]
    FullyBooked(i64),
    #[error("Event has no price set")]
    NoPrice(i64),
    #[error("Event price '{price}' is not a valid amount: {source}")]
    InvalidPrice { price: String, source: AmountError },
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<PayoutError> for ApiError {
    fn from(err: PayoutError) -> Self {
        match err {
            PayoutError::NotFound(_) => ApiError::NotFound(err.to_string()),
            PayoutError::FullyBooked(_)
            | PayoutError::NoPrice(_)
            | PayoutError::InvalidPrice { .. } => ApiError::BadRequest(err.to_string()),
            PayoutError::Wallet(_) | PayoutError::Store(_) => {
                ApiError::internal("Failed to send transaction", err.to_string())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct PayoutRequest {
    pub event_id: i64,
    /// Wallet the ticket price is taken from.
    pub caller: DerivationPath,
    /// Confirmation address. Nothing is sent when absent.
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutReceipt {
    pub tx_hash: TxHash,
    pub event_id: i64,
    /// Price exactly as stored on the event.
    pub amount: String,
    pub booked_count: i64,
    #[serde(skip)]
    pub payee: Address,
}

#[derive(Debug, Clone)]
pub struct PayoutSettings {
    /// Path of the service wallet that receives every payment.
    pub service_path: DerivationPath,
    pub gas_limit: u64,
    pub notification_delay: Duration,
}

impl PayoutSettings {
    pub fn new(service_path: DerivationPath) -> Self {
        Self {
            service_path,
            gas_limit: TRANSFER_GAS_LIMIT,
            notification_delay: Duration::from_secs(10),
        }
    }
}

#[derive(Clone)]
pub struct PayoutService {
    events: EventStore,
    wallets: Arc<dyn WalletResolver>,
    notifications: Arc<NotificationDispatcher>,
    scheduler: NotificationScheduler,
    settings: PayoutSettings,
}

impl PayoutService {
    pub fn new(
        events: EventStore,
        wallets: Arc<dyn WalletResolver>,
        notifications: Arc<NotificationDispatcher>,
        settings: PayoutSettings,
    ) -> Self {
        Self {
            events,
            wallets,
            notifications,
            scheduler: NotificationScheduler,
            settings,
        }
    }

    pub fn settings(&self) -> &PayoutSettings {
        &self.settings
    }

    pub async fn payout(&self, request: PayoutRequest) -> Result<PayoutReceipt, PayoutError> {
        let event_id = request.event_id;

        let event = self
            .events
            .get_by_id(event_id)
            .await?
            .ok_or(PayoutError::NotFound(event_id))?;

        if event.is_fully_booked() {
            return Err(PayoutError::FullyBooked(event_id));
        }

        let price = event
            .price_text()
            .ok_or(PayoutError::NoPrice(event_id))?
            .to_string();
        let value = parse_ether(&price).map_err(|source| PayoutError::InvalidPrice {
            price: price.clone(),
            source,
        })?;

        let Some(booked_count) = self.events.reserve_seat(event_id).await? else {
            return Err(match self.events.get_by_id(event_id).await? {
                Some(_) => PayoutError::FullyBooked(event_id),
                None => PayoutError::NotFound(event_id),
            });
        };

        let (tx_hash, payee) = match self.transfer(&request.caller, value).await {
            Ok(sent) => sent,
            Err(e) => {
                self.release_seat(event_id).await;
                return Err(e.into());
            }
        };

        info!(
            "Payout for event {}: {} ETH to {} in {} (booked {}/{})",
            event_id, price, payee, tx_hash, booked_count, event.capacity
        );

        if let Some(email) = request.email.filter(|e| !e.trim().is_empty()) {
            self.schedule_notification(NewNotification {
                event_id,
                email,
                payee: payee.to_string(),
                tx_hash: tx_hash.to_string(),
            })
            .await;
        }

        Ok(PayoutReceipt {
            tx_hash,
            event_id,
            amount: price,
            booked_count,
            payee,
        })
    }

    async fn transfer(
        &self,
        caller: &DerivationPath,
        value: U256,
    ) -> Result<(TxHash, Address), WalletError> {
        let payer = self.wallets.resolve(caller).await?;
        let payee = self.wallets.resolve(&self.settings.service_path).await?.address();

        let tx_hash = payer
            .transfer(&TransferRequest {
                to: payee,
                value,
                gas_limit: self.settings.gas_limit,
            })
            .await?;
        Ok((tx_hash, payee))
    }

    async fn release_seat(&self, event_id: i64) {
        match self.events.release_seat(event_id).await {
            Ok(true) => info!("Released seat for event {} after failed transfer", event_id),
            Ok(false) => warn!("No seat to release for event {}", event_id),
            Err(e) => error!("Failed to release seat for event {}: {}", event_id, e),
        }
    }

    /// Failures are logged, never returned to the payer.
    async fn schedule_notification(&self, notification: NewNotification) {
        let delay = self.settings.notification_delay;
        let id = match self.notifications.enqueue(&notification, delay).await {
            Ok(id) => id,
            Err(e) => {
                error!(
                    "Failed to queue notification for event {}: {}",
                    notification.event_id, e
                );
                return;
            }
        };

        let dispatcher = self.notifications.clone();
        self.scheduler
            .schedule(delay, move || async move {
                if let Err(e) = dispatcher.deliver(id).await {
                    warn!("Scheduled delivery of notification {} failed: {}", id, e);
                }
            });
    }
}
