use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{Days, NaiveDate};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    error::{ApiError, StoreError},
    models::{Event, EventUpdate, NewEvent, NewUser},
    wallet::{format_ether, parse_ether},
    AppState,
};

pub(crate) const DEFAULT_PAGE_SIZE: i64 = 100;
const MAX_BATCH: u32 = 1000;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/events",
            get(list_events)
                .post(create_event)
                .put(update_event)
                .patch(update_event)
                .delete(delete_event),
        )
        .route("/events/count", get(count_events))
        .route("/events/batch/{num}", post(create_batch))
        .route("/events/{id}", get(get_event))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateEventRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(custom(function = "validate_date"))]
    pub date: String,
    #[validate(length(min = 1, max = 200))]
    pub location: String,
    pub price: Option<String>,
    #[validate(range(min = 0))]
    pub capacity: i64,
    #[validate(range(min = 0, max = 150))]
    pub min_age: Option<i64>,
    pub user_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteEventRequest {
    pub id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteEventResponse {
    pub deleted_id: i64,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

fn validate_date(date: &str) -> Result<(), ValidationError> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| ValidationError::new("date"))
}

/// Rejects a price that the payout flow would not be able to charge.
fn check_price(price: Option<&str>) -> Result<(), ApiError> {
    match price.map(str::trim).filter(|p| !p.is_empty()) {
        Some(p) => parse_ether(p)
            .map(|_| ())
            .map_err(|e| ApiError::BadRequest(format!("Invalid price '{}': {}", p, e))),
        None => Ok(()),
    }
}

pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    let offset = params.offset.unwrap_or(0);
    Ok(Json(state.events.list(limit, offset).await?))
}

pub async fn count_events(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CountResponse>, ApiError> {
    Ok(Json(CountResponse { count: state.events.count().await? }))
}

pub async fn get_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Option<Event>>, ApiError> {
    Ok(Json(state.events.get_by_id(id).await?))
}

pub async fn create_event(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateEventRequest>,
) -> Result<Json<Event>, ApiError> {
    request.validate()?;
    check_price(request.price.as_deref())?;

    let user_id = match request.user_id {
        Some(id) => state
            .users
            .get_by_id(id)
            .await?
            .ok_or(StoreError::UserNotFound(id))?
            .id,
        None => state.users.create(&demo_organizer()).await?.id,
    };

    let event = state
        .events
        .create(&NewEvent {
            user_id,
            name: request.name,
            date: request.date,
            location: request.location,
            price: request.price,
            capacity: request.capacity,
            min_age: request.min_age,
        })
        .await?;

    info!("Created event {} ({}) for organizer {}", event.id, event.name, user_id);
    Ok(Json(event))
}

fn demo_organizer() -> NewUser {
    NewUser {
        username: format!("organizer{}", Uuid::new_v4()),
        age: 30,
    }
}

/// Seeds `num` events, each with its own organizer.
pub async fn create_batch(
    State(state): State<Arc<AppState>>,
    Path(num): Path<u32>,
) -> Result<Json<Vec<Event>>, ApiError> {
    if num > MAX_BATCH {
        return Err(ApiError::BadRequest(format!(
            "Batch size must be at most {}",
            MAX_BATCH
        )));
    }

    let first_date = NaiveDate::from_ymd_opt(2025, 8, 10)
        .ok_or_else(|| ApiError::internal("Failed to seed events", "invalid base date"))?;
    let cent = U256::exp10(16);

    let mut created = Vec::with_capacity(num as usize);
    for i in 0..num {
        let organizer = state.users.create(&demo_organizer()).await?;
        let date = first_date
            .checked_add_days(Days::new(u64::from(i)))
            .unwrap_or(first_date);
        let event = state
            .events
            .create(&NewEvent {
                user_id: organizer.id,
                name: format!("Event {}", i + 1),
                date: date.format("%Y-%m-%d").to_string(),
                location: format!("Venue {}", i + 1),
                price: Some(format_ether(cent * U256::from(i + 1))),
                capacity: 100,
                min_age: None,
            })
            .await?;
        created.push(event);
    }

    info!("Seeded {} events", created.len());
    Ok(Json(created))
}

pub async fn update_event(
    State(state): State<Arc<AppState>>,
    Json(update): Json<EventUpdate>,
) -> Result<Json<Event>, ApiError> {
    check_price(update.price.as_deref())?;
    if let Some(date) = update.date.as_deref() {
        validate_date(date).map_err(|_| ApiError::BadRequest(format!("Invalid date '{}'", date)))?;
    }
    if update.capacity.is_some_and(|c| c < 0) || update.booked_count.is_some_and(|b| b < 0) {
        return Err(ApiError::BadRequest(
            "capacity and booked_count must not be negative".into(),
        ));
    }
    if let Some(user_id) = update.user_id {
        state
            .users
            .get_by_id(user_id)
            .await?
            .ok_or(StoreError::UserNotFound(user_id))?;
    }

    let event = state.events.update_fields(&update).await?;
    info!("Updated event {}", event.id);
    Ok(Json(event))
}

pub async fn delete_event(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeleteEventRequest>,
) -> Result<Json<DeleteEventResponse>, ApiError> {
    let deleted_id = state.events.delete(request.id).await?;
    info!("Deleted event {}", deleted_id);
    Ok(Json(DeleteEventResponse { deleted_id }))
}
