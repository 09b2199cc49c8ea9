use sqlx::SqlitePool;

use crate::{
    database::Database,
    error::StoreError,
    models::{NewUser, User, UserUpdate},
};

/// Accessor for the `users` table.
#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

impl UserStore {
    pub fn new(db: &Database) -> Self {
        Self { pool: db.pool.clone() }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT id, username, age FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// Page of users ordered by id. A negative `limit` means no limit.
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT id, username, age FROM users ORDER BY id ASC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn create(&self, new: &NewUser) -> Result<User, StoreError> {
        let id = sqlx::query("INSERT INTO users (username, age) VALUES (?, ?)")
            .bind(&new.username)
            .bind(new.age)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        self.get_by_id(id)
            .await?
            .ok_or(StoreError::UserNotFound(id))
    }

    /// Applies only the fields present in `update`, then re-reads the row.
    pub async fn update_fields(&self, update: &UserUpdate) -> Result<User, StoreError> {
        sqlx::query(
            r#"
            UPDATE users
            SET username = COALESCE(?, username),
                age = COALESCE(?, age)
            WHERE id = ?
            "#,
        )
        .bind(&update.username)
        .bind(update.age)
        .bind(update.id)
        .execute(&self.pool)
        .await?;

        self.get_by_id(update.id)
            .await?
            .ok_or(StoreError::UserNotFound(update.id))
    }

    /// Number of events organized by the user.
    pub async fn event_count(&self, id: i64) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM events WHERE user_id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Deletes a user that organizes no events and confirms it is gone.
    pub async fn delete(&self, id: i64) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM users
            WHERE id = ? AND NOT EXISTS (SELECT 1 FROM events WHERE events.user_id = users.id)
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            if self.get_by_id(id).await?.is_none() {
                return Err(StoreError::UserNotFound(id));
            }
            return Err(StoreError::UserHasEvents {
                user_id: id,
                events: self.event_count(id).await?,
            });
        }
        if self.get_by_id(id).await?.is_some() {
            return Err(StoreError::UserDeleteNotVerified(id));
        }
        Ok(id)
    }
}
