use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use primitive_types::U256;
use std::sync::Arc;
use tracing::{info, warn};

use super::keys::KeyDeriver;
use super::rpc::RpcClient;
use super::transaction::LegacyTransaction;
use super::{
    Address, DerivationPath, TransferRequest, TxHash, WalletError, WalletHandle, WalletResolver,
};
use crate::config::{ChainConfig, CircuitBreakerConfig};

/// Resolves derivation paths to wallets that sign locally and submit through
/// the chain's JSON-RPC endpoint.
pub struct ChainWalletResolver {
    deriver: KeyDeriver,
    rpc: Arc<RpcClient>,
    chain_id: u64,
}

impl ChainWalletResolver {
    pub fn new(deriver: KeyDeriver, rpc: Arc<RpcClient>, chain_id: u64) -> Self {
        Self { deriver, rpc, chain_id }
    }

    pub fn from_config(
        chain: &ChainConfig,
        breaker: &CircuitBreakerConfig,
    ) -> Result<Self, WalletError> {
        let deriver = KeyDeriver::from_hex(&chain.master_key)?;
        let rpc = Arc::new(RpcClient::from_config(chain, breaker)?);
        Ok(Self::new(deriver, rpc, chain.chain_id))
    }

    pub fn rpc(&self) -> &Arc<RpcClient> {
        &self.rpc
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

#[async_trait]
impl WalletResolver for ChainWalletResolver {
    async fn resolve(&self, path: &DerivationPath) -> Result<Arc<dyn WalletHandle>, WalletError> {
        let key = self.deriver.derive(path)?;
        let address = Address::from_public_key(key.verifying_key());
        Ok(Arc::new(ChainWallet {
            key,
            address,
            rpc: self.rpc.clone(),
            chain_id: self.chain_id,
        }))
    }

    async fn balance(&self, address: Address) -> Result<U256, WalletError> {
        self.rpc.balance(address).await
    }
}

struct ChainWallet {
    key: SigningKey,
    address: Address,
    rpc: Arc<RpcClient>,
    chain_id: u64,
}

#[async_trait]
impl WalletHandle for ChainWallet {
    fn address(&self) -> Address {
        self.address
    }

    async fn transfer(&self, request: &TransferRequest) -> Result<TxHash, WalletError> {
        let (nonce, gas_price) = futures::try_join!(
            self.rpc.transaction_count(self.address),
            self.rpc.gas_price()
        )?;

        let tx = LegacyTransaction {
            nonce,
            gas_price,
            gas_limit: request.gas_limit,
            to: request.to,
            value: request.value,
            data: Vec::new(),
            chain_id: self.chain_id,
        };
        let signed = tx.sign(&self.key)?;

        info!(
            "Submitting transfer from={} to={} value={} nonce={} gas_price={}",
            self.address, request.to, request.value, nonce, gas_price
        );
        let hash = self.rpc.send_raw_transaction(&signed.raw_hex()).await?;
        if hash != signed.hash {
            warn!("Node reported hash {} for locally computed {}", hash, signed.hash);
        }
        Ok(hash)
    }
}
