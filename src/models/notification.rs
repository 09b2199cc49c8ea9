use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Row of the notification outbox. Timestamps are unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: i64,
    pub event_id: i64,
    pub email: String,
    pub payee: String,
    pub tx_hash: String,
    pub attempts: i64,
    pub next_attempt_at: i64,
    pub delivered_at: Option<i64>,
    pub last_error: Option<String>,
    pub created_at: i64,
}

impl OutboxEntry {
    pub fn is_delivered(&self) -> bool {
        self.delivered_at.is_some()
    }
}

/// Confirmation to deliver for a completed payout.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub event_id: i64,
    pub email: String,
    pub payee: String,
    pub tx_hash: String,
}
