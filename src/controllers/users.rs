use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use super::events::{CountResponse, ListQuery, DEFAULT_PAGE_SIZE};
use crate::{
    error::ApiError,
    models::{NewUser, User, UserUpdate},
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/users",
            get(list_users)
                .post(create_user)
                .put(update_user)
                .patch(update_user)
                .delete(delete_user),
        )
        .route("/users/count", get(count_users))
        .route("/users/{id}", get(get_user))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 100))]
    pub username: String,
    #[validate(range(min = 0, max = 150))]
    pub age: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    pub id: i64,
    #[validate(length(min = 1, max = 100))]
    pub username: Option<String>,
    #[validate(range(min = 0, max = 150))]
    pub age: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteUserRequest {
    pub id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteUserResponse {
    pub deleted_id: i64,
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<User>>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    let offset = params.offset.unwrap_or(0);
    Ok(Json(state.users.list(limit, offset).await?))
}

pub async fn count_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CountResponse>, ApiError> {
    Ok(Json(CountResponse { count: state.users.count().await? }))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Option<User>>, ApiError> {
    Ok(Json(state.users.get_by_id(id).await?))
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateUserRequest>,
) -> Result<Json<User>, ApiError> {
    request.validate()?;
    let user = state
        .users
        .create(&NewUser { username: request.username, age: request.age })
        .await?;
    info!("Created user {} ({})", user.id, user.username);
    Ok(Json(user))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<User>, ApiError> {
    request.validate()?;
    let user = state
        .users
        .update_fields(&UserUpdate {
            id: request.id,
            username: request.username,
            age: request.age,
        })
        .await?;
    info!("Updated user {}", user.id);
    Ok(Json(user))
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeleteUserRequest>,
) -> Result<Json<DeleteUserResponse>, ApiError> {
    let deleted_id = state.users.delete(request.id).await?;
    info!("Deleted user {}", deleted_id);
    Ok(Json(DeleteUserResponse { deleted_id }))
}
