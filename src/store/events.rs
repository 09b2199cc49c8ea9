use sqlx::SqlitePool;
use tracing::debug;

use crate::{
    database::Database,
    error::StoreError,
    models::{event::EventRow, Event, EventUpdate, NewEvent},
};

const SELECT_EVENT: &str = r#"
    SELECT events.id, events.name, events.date, events.location, events.price,
           events.capacity, events.booked_count, events.min_age,
           users.id AS organizer_id, users.username AS organizer_username,
           users.age AS organizer_age
    FROM events
    JOIN users ON events.user_id = users.id
"#;

/// Accessor for the `events` table.
#[derive(Clone)]
pub struct EventStore {
    pool: SqlitePool,
}

impl EventStore {
    pub fn new(db: &Database) -> Self {
        Self { pool: db.pool.clone() }
    }

    /// Single event joined with its organizer.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Event>, StoreError> {
        let row = sqlx::query_as::<_, EventRow>(&format!("{SELECT_EVENT} WHERE events.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Event::from))
    }

    /// Page of events ordered by date. A negative `limit` means no limit.
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Event>, StoreError> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "{SELECT_EVENT} ORDER BY events.date ASC, events.id ASC LIMIT ? OFFSET ?"
        ))
        .bind(limit)
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Event::from).collect())
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM events")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Inserts the row and returns it as stored.
    pub async fn create(&self, new: &NewEvent) -> Result<Event, StoreError> {
        let id = sqlx::query(
            r#"
            INSERT INTO events (user_id, name, date, location, price, capacity, min_age)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.user_id)
        .bind(&new.name)
        .bind(&new.date)
        .bind(&new.location)
        .bind(&new.price)
        .bind(new.capacity)
        .bind(new.min_age)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        self.get_by_id(id)
            .await?
            .ok_or(StoreError::CreateFailed(id))
    }

    /// Applies only the fields present in `update`, then re-reads the row.
    ///
    /// The update is refused when the merged `booked_count` would exceed the
    /// merged `capacity`.
    pub async fn update_fields(&self, update: &EventUpdate) -> Result<Event, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE events
            SET user_id = COALESCE(?, user_id),
                name = COALESCE(?, name),
                date = COALESCE(?, date),
                location = COALESCE(?, location),
                price = COALESCE(?, price),
                capacity = COALESCE(?, capacity),
                booked_count = COALESCE(?, booked_count),
                min_age = COALESCE(?, min_age)
            WHERE id = ? AND COALESCE(?, booked_count) <= COALESCE(?, capacity)
            "#,
        )
        .bind(update.user_id)
        .bind(&update.name)
        .bind(&update.date)
        .bind(&update.location)
        .bind(&update.price)
        .bind(update.capacity)
        .bind(update.booked_count)
        .bind(update.min_age)
        .bind(update.id)
        .bind(update.booked_count)
        .bind(update.capacity)
        .execute(&self.pool)
        .await?;

        let event = self
            .get_by_id(update.id)
            .await?
            .ok_or(StoreError::EventNotFound(update.id))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::CapacityExceeded(update.id));
        }
        Ok(event)
    }

    /// Deletes the row and confirms it is gone.
    ///
    /// Deleting an id that does not exist is an error, so a repeated delete
    /// never reports success.
    pub async fn delete(&self, id: i64) -> Result<i64, StoreError> {
        let result = sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::EventNotFound(id));
        }
        if self.get_by_id(id).await?.is_some() {
            return Err(StoreError::DeleteNotVerified(id));
        }
        Ok(id)
    }

    /// Takes one seat if any is left, as a single conditional update.
    ///
    /// Returns the new `booked_count`, or `None` when the event is full or gone.
    pub async fn reserve_seat(&self, id: i64) -> Result<Option<i64>, StoreError> {
        let booked = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE events
            SET booked_count = booked_count + 1
            WHERE id = ? AND booked_count < capacity
            RETURNING booked_count
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        debug!("reserve_seat event={} -> {:?}", id, booked);
        Ok(booked)
    }

    /// Gives back a seat taken by [`reserve_seat`](Self::reserve_seat).
    pub async fn release_seat(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE events SET booked_count = booked_count - 1 WHERE id = ? AND booked_count > 0",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
