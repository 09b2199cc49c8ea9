//! rpc.rs
//!
//! Minimal Ethereum JSON-RPC client. Every call goes through the
//! [`CircuitBreaker`] so an unreachable node fails fast instead of stalling
//! every payout for the full HTTP timeout.

use primitive_types::U256;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::breaker::{CircuitBreaker, CircuitState};
use super::{Address, TxHash, WalletError};
use crate::config::{ChainConfig, CircuitBreakerConfig};

// --- Wire format ---

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// JSON-RPC client for one chain endpoint.
pub struct RpcClient {
    base_url: String,
    http_client: reqwest::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, WalletError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into(),
            http_client,
            circuit_breaker,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn from_config(
        chain: &ChainConfig,
        breaker: &CircuitBreakerConfig,
    ) -> Result<Self, WalletError> {
        Self::new(
            chain.rpc_url.clone(),
            Duration::from_secs(chain.request_timeout_seconds),
            Arc::new(CircuitBreaker::new(breaker.failure_threshold, breaker.timeout_seconds)),
        )
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, WalletError> {
        if !self.circuit_breaker.can_execute() {
            warn!("Circuit breaker is OPEN - blocking {} request", method);
            return Err(WalletError::CircuitOpen);
        }

        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        debug!("rpc -> {} {}", method, request.params);

        let operation = async {
            self.http_client
                .post(&self.base_url)
                .json(&request)
                .send()
                .await?
                .error_for_status()?
                .json::<RpcResponse<T>>()
                .await
        };

        let response = match operation.await {
            Ok(response) => {
                // the node answered, even if with an error object
                self.circuit_breaker.record_success();
                response
            }
            Err(e) => {
                error!("Chain RPC request {} failed: {:?}", method, e);
                self.circuit_breaker.record_failure();
                return Err(WalletError::Transport(e));
            }
        };

        if let Some(err) = response.error {
            return Err(WalletError::Rpc { code: err.code, message: err.message });
        }
        response
            .result
            .ok_or_else(|| WalletError::InvalidResponse(format!("{} returned no result", method)))
    }

    pub async fn chain_id(&self) -> Result<u64, WalletError> {
        let quantity: String = self.call("eth_chainId", json!([])).await?;
        let id = parse_quantity(&quantity)?;
        if id > U256::from(u64::MAX) {
            return Err(WalletError::InvalidResponse(format!("chain id {} out of range", quantity)));
        }
        Ok(id.as_u64())
    }

    pub async fn gas_price(&self) -> Result<U256, WalletError> {
        let quantity: String = self.call("eth_gasPrice", json!([])).await?;
        parse_quantity(&quantity)
    }

    /// Next nonce for `address`, counting transactions still in the mempool.
    pub async fn transaction_count(&self, address: Address) -> Result<U256, WalletError> {
        let quantity: String = self
            .call("eth_getTransactionCount", json!([address.to_string(), "pending"]))
            .await?;
        parse_quantity(&quantity)
    }

    pub async fn balance(&self, address: Address) -> Result<U256, WalletError> {
        let quantity: String = self
            .call("eth_getBalance", json!([address.to_string(), "latest"]))
            .await?;
        parse_quantity(&quantity)
    }

    pub async fn send_raw_transaction(&self, raw_hex: &str) -> Result<TxHash, WalletError> {
        let hash: String = self.call("eth_sendRawTransaction", json!([raw_hex])).await?;
        hash.parse()
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state()
    }
}

/// Hex quantity (`"0x1a"`) as returned by the node.
fn parse_quantity(text: &str) -> Result<U256, WalletError> {
    let digits = text
        .strip_prefix("0x")
        .ok_or_else(|| WalletError::InvalidResponse(format!("bad quantity '{}'", text)))?;
    if digits.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_str_radix(digits, 16)
        .map_err(|_| WalletError::InvalidResponse(format!("bad quantity '{}'", text)))
}
