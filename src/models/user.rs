use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Organizer of one or more events.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub age: i64,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub age: i64,
}

/// Partial update. `None` keeps the stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    pub id: i64,
    pub username: Option<String>,
    pub age: Option<i64>,
}

impl UserUpdate {
    pub fn new(id: i64) -> Self {
        UserUpdate { id, ..Default::default() }
    }
}
