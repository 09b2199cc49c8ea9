use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    error::ApiError,
    middleware::Caller,
    wallet::{parse_ether, Address, DerivationPath, TransferRequest, WalletError},
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/caller-address", get(caller_address))
        .route("/canister-address", get(service_address))
        .route("/address-balance", get(address_balance))
        .route("/whoami", get(whoami))
        .route("/transfer-from-canister", post(transfer_from_service))
}

#[derive(Debug, Serialize)]
pub struct AddressResponse {
    pub address: Address,
}

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    pub address: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Wei, as a decimal string.
    pub balance: String,
}

#[derive(Debug, Deserialize)]
pub struct TransferBody {
    pub to: Option<String>,
    pub value: Option<String>,
}

fn wallet_failure(e: WalletError) -> ApiError {
    ApiError::internal("Wallet operation failed", e.to_string())
}

async fn address_of(state: &AppState, path: &DerivationPath) -> Result<Address, ApiError> {
    let wallet = state.wallets.resolve(path).await.map_err(wallet_failure)?;
    Ok(wallet.address())
}

pub async fn caller_address(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<AddressResponse>, ApiError> {
    let address = address_of(&state, &caller.derivation_path()).await?;
    Ok(Json(AddressResponse { address }))
}

pub async fn service_address(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AddressResponse>, ApiError> {
    let address = address_of(&state, &state.service_path()).await?;
    Ok(Json(AddressResponse { address }))
}

pub async fn address_balance(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BalanceQuery>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let address: Address = params
        .address
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("Missing 'address' query parameter".into()))?
        .trim()
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid Ethereum address".into()))?;

    let balance = state.wallets.balance(address).await.map_err(wallet_failure)?;
    Ok(Json(BalanceResponse { balance: balance.to_string() }))
}

pub async fn whoami(caller: Caller) -> String {
    caller.principal
}

/// Moves funds out of the service wallet. Owner only.
pub async fn transfer_from_service(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(body): Json<TransferBody>,
) -> Result<String, ApiError> {
    if !state.is_owner(&caller) {
        warn!("Rejected service wallet transfer by {}", caller.principal);
        return Err(ApiError::Forbidden(
            "Access denied: only owner can call this function".into(),
        ));
    }

    let (Some(to), Some(value)) = (body.to.as_deref(), body.value.as_deref()) else {
        return Err(ApiError::BadRequest("Both \"to\" and \"value\" are required".into()));
    };
    let to: Address = to
        .trim()
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid Ethereum address".into()))?;
    let value = parse_ether(value)
        .map_err(|_| ApiError::BadRequest("Invalid ETH value format".into()))?;

    let wallet = state
        .wallets
        .resolve(&state.service_path())
        .await
        .map_err(wallet_failure)?;
    let tx_hash = wallet
        .transfer(&TransferRequest {
            to,
            value,
            gas_limit: state.config.chain.gas_limit,
        })
        .await
        .map_err(|e| ApiError::internal("Failed to send transaction", e.to_string()))?;

    info!("Service wallet transfer to {} sent: {}", to, tx_hash);
    Ok(format!("transaction sent with hash: {}", tx_hash))
}
