use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::User;

/// A bookable occasion with a finite number of seats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub name: String,
    /// ISO-8601 date, e.g. `2025-08-10`.
    pub date: String,
    pub location: String,
    /// Ticket price in ether as decimal text, e.g. `"0.01"`.
    pub price: Option<String>,
    pub capacity: i64,
    pub booked_count: i64,
    pub min_age: Option<i64>,
    #[serde(rename = "user")]
    pub organizer: User,
}

impl Event {
    pub fn is_fully_booked(&self) -> bool {
        self.booked_count >= self.capacity
    }

    /// Price text, treating a blank value the same as no price at all.
    pub fn price_text(&self) -> Option<&str> {
        self.price
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

// Flat row of `events JOIN users`
#[derive(Debug, FromRow)]
pub(crate) struct EventRow {
    pub id: i64,
    pub name: String,
    pub date: String,
    pub location: String,
    pub price: Option<String>,
    pub capacity: i64,
    pub booked_count: i64,
    pub min_age: Option<i64>,
    pub organizer_id: i64,
    pub organizer_username: String,
    pub organizer_age: i64,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Event {
            id: row.id,
            name: row.name,
            date: row.date,
            location: row.location,
            price: row.price,
            capacity: row.capacity,
            booked_count: row.booked_count,
            min_age: row.min_age,
            organizer: User {
                id: row.organizer_id,
                username: row.organizer_username,
                age: row.organizer_age,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub user_id: i64,
    pub name: String,
    pub date: String,
    pub location: String,
    pub price: Option<String>,
    pub capacity: i64,
    pub min_age: Option<i64>,
}

/// Partial update. `None` keeps the stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventUpdate {
    pub id: i64,
    pub user_id: Option<i64>,
    pub name: Option<String>,
    pub date: Option<String>,
    pub location: Option<String>,
    pub price: Option<String>,
    pub capacity: Option<i64>,
    pub booked_count: Option<i64>,
    pub min_age: Option<i64>,
}

impl EventUpdate {
    pub fn new(id: i64) -> Self {
        EventUpdate { id, ..Default::default() }
    }
}
