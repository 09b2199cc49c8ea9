use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    error::ApiError,
    middleware::Caller,
    services::{PayoutReceipt, PayoutRequest},
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/payout", get(payout))
        .route("/payments/payout", post(payout))
        .route("/payment/{event_id}", get(payment_link))
}

#[derive(Debug, Deserialize)]
pub struct PayoutQuery {
    #[serde(rename = "eventId")]
    pub event_id: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PayoutResponse {
    pub message: &'static str,
    #[serde(flatten)]
    pub receipt: PayoutReceipt,
}

/// Charges the caller the event's ticket price and books one seat.
pub async fn payout(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(params): Query<PayoutQuery>,
) -> Result<Json<PayoutResponse>, ApiError> {
    let raw_id = params
        .event_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing 'eventId' query parameter".into()))?;
    let event_id: i64 = raw_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid 'eventId' query parameter".into()))?;

    info!("Payout requested for event {} by {}", event_id, caller.principal);

    let result = state
        .payouts
        .payout(PayoutRequest {
            event_id,
            caller: caller.derivation_path(),
            email: params.email,
        })
        .await;

    match result {
        Ok(receipt) => Ok(Json(PayoutResponse { message: "Transaction sent", receipt })),
        Err(e) => {
            warn!("Payout for event {} failed: {}", event_id, e);
            Err(e.into())
        }
    }
}

pub async fn payment_link(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<i64>,
) -> Result<Response, ApiError> {
    if state.events.get_by_id(event_id).await?.is_none() {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "message": "Event not found" })),
        )
            .into_response());
    }

    let base = state.config.app.payment_link_base.trim_end_matches('/');
    Ok(Json(json!({
        "success": true,
        "paymentLink": format!("{}/{}", base, event_id),
    }))
    .into_response())
}
