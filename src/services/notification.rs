//! notification.rs
//!
//! Payout confirmations. A confirmation is written to the outbox table first,
//! then [`NotificationScheduler`] fires a delivery attempt after a short delay.
//! Anything that attempt misses (failure, process restart) is picked up by the
//! periodic [`NotificationDispatcher::run_once`] sweep with exponential backoff.

use async_trait::async_trait;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    error::StoreError,
    models::{NewNotification, OutboxEntry},
    store::NotificationOutbox,
};

const SWEEP_BATCH: i64 = 50;

#[derive(Debug, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Delivery channel for a confirmation.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, entry: &OutboxEntry) -> Result<(), NotifyError>;
}

/// Writes the confirmation to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, entry: &OutboxEntry) -> Result<(), NotifyError> {
        info!("=== Notification ===");
        info!("Event ID: {}", entry.event_id);
        info!("Transfer destination: {}", entry.payee);
        info!("Tx Hash: {}", entry.tx_hash);
        info!("Notification email: {}", entry.email);
        info!("====================");
        Ok(())
    }
}

/// One-shot deferred callbacks on the tokio runtime.
///
/// Nothing is persisted: a callback pending when the process stops is lost,
/// and nothing reports back to the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotificationScheduler;

impl NotificationScheduler {
    pub fn schedule<F, Fut>(&self, delay: Duration, thunk: F) -> JoinHandle<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            thunk().await;
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    AlreadyDelivered,
    Retrying { next_attempt_at: i64 },
    GaveUp,
    Missing,
}

/// Delivers outbox entries through a [`Notifier`].
pub struct NotificationDispatcher {
    outbox: NotificationOutbox,
    notifier: Arc<dyn Notifier>,
    max_attempts: u32,
    base_backoff: Duration,
    max_backoff: Duration,
}

impl NotificationDispatcher {
    pub fn new(outbox: NotificationOutbox, notifier: Arc<dyn Notifier>, max_attempts: u32) -> Self {
        Self {
            outbox,
            notifier,
            max_attempts: max_attempts.max(1),
            base_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(3600),
        }
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_backoff = base;
        self.max_backoff = max;
        self
    }

    pub fn outbox(&self) -> &NotificationOutbox {
        &self.outbox
    }

    /// Delay before the next attempt once `attempts` have failed.
    pub fn backoff(&self, attempts: i64) -> Duration {
        let exponent = attempts.clamp(0, 16) as u32;
        self.base_backoff
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_backoff)
    }

    /// Queues a confirmation that becomes due after `delay`.
    pub async fn enqueue(
        &self,
        notification: &NewNotification,
        delay: Duration,
    ) -> Result<i64, StoreError> {
        let now = now_ms();
        let due_at = now.saturating_add(i64::try_from(delay.as_millis()).unwrap_or(i64::MAX));
        self.outbox.enqueue(notification, now, due_at).await
    }

    /// Single delivery attempt for one entry, regardless of its schedule.
    pub async fn deliver(&self, id: i64) -> Result<DeliveryOutcome, StoreError> {
        let Some(entry) = self.outbox.get(id).await? else {
            return Ok(DeliveryOutcome::Missing);
        };
        if entry.is_delivered() {
            return Ok(DeliveryOutcome::AlreadyDelivered);
        }
        if entry.attempts >= i64::from(self.max_attempts) {
            return Ok(DeliveryOutcome::GaveUp);
        }
        self.attempt(&entry).await
    }

    async fn attempt(&self, entry: &OutboxEntry) -> Result<DeliveryOutcome, StoreError> {
        match self.notifier.deliver(entry).await {
            Ok(()) => {
                if self.outbox.mark_delivered(entry.id, now_ms()).await? {
                    Ok(DeliveryOutcome::Delivered)
                } else {
                    Ok(DeliveryOutcome::AlreadyDelivered)
                }
            }
            Err(e) => {
                let attempts = entry.attempts + 1;
                if attempts >= i64::from(self.max_attempts) {
                    error!("Giving up on notification {} after {} attempts: {}", entry.id, attempts, e);
                    self.outbox.record_failure(entry.id, &e.to_string(), i64::MAX).await?;
                    return Ok(DeliveryOutcome::GaveUp);
                }
                let delay = self.backoff(entry.attempts);
                let next_attempt_at = now_ms().saturating_add(delay.as_millis() as i64);
                warn!(
                    "Notification {} failed (attempt {}), retrying in {:?}: {}",
                    entry.id, attempts, delay, e
                );
                self.outbox.record_failure(entry.id, &e.to_string(), next_attempt_at).await?;
                Ok(DeliveryOutcome::Retrying { next_attempt_at })
            }
        }
    }

    /// Attempts every due entry once. Returns how many were delivered.
    pub async fn run_once(&self) -> Result<usize, StoreError> {
        let due = self.outbox.due(now_ms(), self.max_attempts, SWEEP_BATCH).await?;
        let mut delivered = 0;
        for entry in &due {
            if self.attempt(entry).await? == DeliveryOutcome::Delivered {
                delivered += 1;
            }
        }
        if !due.is_empty() {
            info!("Notification sweep: {} due, {} delivered", due.len(), delivered);
        }
        Ok(delivered)
    }
}

/// Runs [`NotificationDispatcher::run_once`] every `interval` until the task is aborted.
pub fn spawn_delivery_worker(
    dispatcher: Arc<NotificationDispatcher>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = dispatcher.run_once().await {
                error!("Notification sweep failed: {}", e);
            }
            tokio::time::sleep(interval).await;
        }
    })
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
