//! snapshot.rs
//!
//! The database is in-memory, so its contents are carried across restarts as
//! a single blob: every table dumped to JSON at shutdown and written back row
//! by row (ids included) at startup in `resume` mode, together with the
//! AUTOINCREMENT counters.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use crate::{
    database::Database,
    models::{OutboxEntry, User},
    redis_client::RedisClient,
};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("no snapshot stored under '{0}'")]
    Missing(String),
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
    #[error("snapshot is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Durable storage for one snapshot blob.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save(&self, blob: Vec<u8>) -> Result<(), SnapshotError>;
    async fn load(&self) -> Result<Option<Vec<u8>>, SnapshotError>;
    /// Where the blob lives, for log and error messages.
    fn location(&self) -> String;
}

pub struct RedisSnapshotStore {
    client: RedisClient,
    key: String,
}

impl RedisSnapshotStore {
    pub fn new(client: RedisClient, key: impl Into<String>) -> Self {
        Self { client, key: key.into() }
    }
}

#[async_trait]
impl SnapshotStore for RedisSnapshotStore {
    async fn save(&self, blob: Vec<u8>) -> Result<(), SnapshotError> {
        self.client.set_bytes(&self.key, &blob).await?;
        Ok(())
    }

    async fn load(&self) -> Result<Option<Vec<u8>>, SnapshotError> {
        Ok(self.client.get_bytes(&self.key).await?)
    }

    fn location(&self) -> String {
        format!("redis key '{}'", self.key)
    }
}

/// Process-local store, used when no Redis is configured and in tests.
#[derive(Default)]
pub struct MemorySnapshotStore {
    blob: Mutex<Option<Vec<u8>>>,
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, blob: Vec<u8>) -> Result<(), SnapshotError> {
        *self.blob.lock().await = Some(blob);
        Ok(())
    }

    async fn load(&self) -> Result<Option<Vec<u8>>, SnapshotError> {
        Ok(self.blob.lock().await.clone())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub date: String,
    pub location: String,
    pub price: Option<String>,
    pub capacity: i64,
    pub booked_count: i64,
    pub min_age: Option<i64>,
}

/// One `sqlite_sequence` row: the highest id ever handed out for `name`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct SequenceRecord {
    pub name: String,
    pub seq: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    pub version: u32,
    pub users: Vec<User>,
    pub events: Vec<EventRecord>,
    #[serde(default)]
    pub notifications: Vec<OutboxEntry>,
    #[serde(default)]
    pub sequences: Vec<SequenceRecord>,
}

impl DatabaseSnapshot {
    pub async fn capture(db: &Database) -> Result<Self, SnapshotError> {
        let users = sqlx::query_as::<_, User>("SELECT id, username, age FROM users ORDER BY id")
            .fetch_all(&db.pool)
            .await?;
        let events = sqlx::query_as::<_, EventRecord>(
            r#"
            SELECT id, user_id, name, date, location, price, capacity, booked_count, min_age
            FROM events ORDER BY id
            "#,
        )
        .fetch_all(&db.pool)
        .await?;
        let notifications = sqlx::query_as::<_, OutboxEntry>(
            r#"
            SELECT id, event_id, email, payee, tx_hash, attempts, next_attempt_at,
                   delivered_at, last_error, created_at
            FROM notification_outbox ORDER BY id
            "#,
        )
        .fetch_all(&db.pool)
        .await?;
        let sequences = sqlx::query_as::<_, SequenceRecord>(
            "SELECT CAST(name AS TEXT) AS name, CAST(seq AS INTEGER) AS seq FROM sqlite_sequence ORDER BY name",
        )
        .fetch_all(&db.pool)
        .await?;

        Ok(Self { version: SNAPSHOT_VERSION, users, events, notifications, sequences })
    }

    /// Replaces every row in the database with the snapshot's rows.
    pub async fn apply(&self, db: &Database) -> Result<(), SnapshotError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.version));
        }

        let mut tx = db.pool.begin().await?;
        sqlx::query("DELETE FROM notification_outbox").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM events").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM users").execute(&mut *tx).await?;

        for user in &self.users {
            sqlx::query("INSERT INTO users (id, username, age) VALUES (?, ?, ?)")
                .bind(user.id)
                .bind(&user.username)
                .bind(user.age)
                .execute(&mut *tx)
                .await?;
        }

        for event in &self.events {
            sqlx::query(
                r#"
                INSERT INTO events
                    (id, user_id, name, date, location, price, capacity, booked_count, min_age)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(event.id)
            .bind(event.user_id)
            .bind(&event.name)
            .bind(&event.date)
            .bind(&event.location)
            .bind(&event.price)
            .bind(event.capacity)
            .bind(event.booked_count)
            .bind(event.min_age)
            .execute(&mut *tx)
            .await?;
        }

        for entry in &self.notifications {
            sqlx::query(
                r#"
                INSERT INTO notification_outbox
                    (id, event_id, email, payee, tx_hash, attempts, next_attempt_at,
                     delivered_at, last_error, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(entry.id)
            .bind(entry.event_id)
            .bind(&entry.email)
            .bind(&entry.payee)
            .bind(&entry.tx_hash)
            .bind(entry.attempts)
            .bind(entry.next_attempt_at)
            .bind(entry.delivered_at)
            .bind(&entry.last_error)
            .bind(entry.created_at)
            .execute(&mut *tx)
            .await?;
        }

        // Ids of rows deleted before the snapshot stay retired.
        if !self.sequences.is_empty() {
            sqlx::query("DELETE FROM sqlite_sequence").execute(&mut *tx).await?;
        }
        for sequence in &self.sequences {
            sqlx::query("INSERT INTO sqlite_sequence (name, seq) VALUES (?, ?)")
                .bind(&sequence.name)
                .bind(sequence.seq)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

pub async fn export(db: &Database) -> Result<Vec<u8>, SnapshotError> {
    let snapshot = DatabaseSnapshot::capture(db).await?;
    Ok(serde_json::to_vec(&snapshot)?)
}

pub async fn import(db: &Database, blob: &[u8]) -> Result<DatabaseSnapshot, SnapshotError> {
    let snapshot: DatabaseSnapshot = serde_json::from_slice(blob)?;
    snapshot.apply(db).await?;
    Ok(snapshot)
}

/// Dumps the database into `store`.
pub async fn persist(db: &Database, store: &dyn SnapshotStore) -> Result<(), SnapshotError> {
    let blob = export(db).await?;
    let size = blob.len();
    store.save(blob).await?;
    info!("Saved database snapshot ({} bytes) to {}", size, store.location());
    Ok(())
}

/// Loads the stored snapshot into `db`. A missing snapshot is an error.
pub async fn restore(db: &Database, store: &dyn SnapshotStore) -> Result<(), SnapshotError> {
    let blob = store
        .load()
        .await?
        .ok_or_else(|| SnapshotError::Missing(store.location()))?;
    let snapshot = import(db, &blob).await?;
    info!(
        "Restored database snapshot from {}: {} users, {} events, {} notifications",
        store.location(),
        snapshot.users.len(),
        snapshot.events.len(),
        snapshot.notifications.len()
    );
    Ok(())
}
