use sqlx::SqlitePool;

use crate::{
    database::Database,
    error::StoreError,
    models::{NewNotification, OutboxEntry},
};

const SELECT_ENTRY: &str = r#"
    SELECT id, event_id, email, payee, tx_hash, attempts, next_attempt_at,
           delivered_at, last_error, created_at
    FROM notification_outbox
"#;

/// Pending payout confirmations, persisted next to the events they belong to.
#[derive(Clone)]
pub struct NotificationOutbox {
    pool: SqlitePool,
}

impl NotificationOutbox {
    pub fn new(db: &Database) -> Self {
        Self { pool: db.pool.clone() }
    }

    /// Stores a new entry that no sweep picks up before `next_attempt_at`.
    pub async fn enqueue(
        &self,
        new: &NewNotification,
        now_ms: i64,
        next_attempt_at: i64,
    ) -> Result<i64, StoreError> {
        let id = sqlx::query(
            r#"
            INSERT INTO notification_outbox
                (event_id, email, payee, tx_hash, attempts, next_attempt_at, created_at)
            VALUES (?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(new.event_id)
        .bind(&new.email)
        .bind(&new.payee)
        .bind(&new.tx_hash)
        .bind(next_attempt_at)
        .bind(now_ms)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    pub async fn get(&self, id: i64) -> Result<Option<OutboxEntry>, StoreError> {
        let entry = sqlx::query_as::<_, OutboxEntry>(&format!("{SELECT_ENTRY} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(entry)
    }

    /// Undelivered entries whose next attempt is due and that still have attempts left.
    pub async fn due(
        &self,
        now_ms: i64,
        max_attempts: u32,
        limit: i64,
    ) -> Result<Vec<OutboxEntry>, StoreError> {
        let entries = sqlx::query_as::<_, OutboxEntry>(&format!(
            r#"{SELECT_ENTRY}
            WHERE delivered_at IS NULL AND next_attempt_at <= ? AND attempts < ?
            ORDER BY next_attempt_at ASC, id ASC
            LIMIT ?"#
        ))
        .bind(now_ms)
        .bind(i64::from(max_attempts))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    /// Marks an entry delivered. Returns false if it was already delivered.
    pub async fn mark_delivered(&self, id: i64, now_ms: i64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE notification_outbox
            SET delivered_at = ?, attempts = attempts + 1, last_error = NULL
            WHERE id = ? AND delivered_at IS NULL
            "#,
        )
        .bind(now_ms)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn record_failure(
        &self,
        id: i64,
        error: &str,
        next_attempt_at: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE notification_outbox
            SET attempts = attempts + 1, last_error = ?, next_attempt_at = ?
            WHERE id = ? AND delivered_at IS NULL
            "#,
        )
        .bind(error)
        .bind(next_attempt_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn pending_count(&self) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notification_outbox WHERE delivered_at IS NULL",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
