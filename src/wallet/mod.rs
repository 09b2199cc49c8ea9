//! Wallets derived from identity-specific derivation paths.
//!
//! The payout flow only ever sees the two capabilities defined here:
//! [`WalletResolver`] turns a derivation path into a [`WalletHandle`], and a
//! handle can submit a transfer. [`chain::ChainWalletResolver`] is the
//! implementation backed by an Ethereum JSON-RPC endpoint.

pub mod breaker;
pub mod chain;
pub mod keys;
pub mod rpc;
pub mod transaction;
pub mod units;

use async_trait::async_trait;
use primitive_types::{H160, H256, U256};
use serde::{Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

pub use chain::ChainWalletResolver;
pub use units::{format_ether, parse_ether, AmountError};

/// Gas bound for a plain value transfer.
pub const TRANSFER_GAS_LIMIT: u64 = 21_000;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("key derivation failed: {0}")]
    Derivation(String),
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("circuit breaker is open - chain RPC temporarily unavailable")]
    CircuitOpen,
    #[error("RPC transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("unexpected RPC response: {0}")]
    InvalidResponse(String),
}

/// 20 byte account address. Displays in EIP-55 checksum form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(pub H160);

impl Address {
    pub fn from_public_key(key: &k256::ecdsa::VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        // uncompressed SEC1 point, skip the 0x04 tag
        let hash = Keccak256::digest(&point.as_bytes()[1..]);
        Address(H160::from_slice(&hash[12..]))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn to_checksum(&self) -> String {
        let lower = hex::encode(self.0.as_bytes());
        let hash = Keccak256::digest(lower.as_bytes());
        let mut out = String::with_capacity(42);
        out.push_str("0x");
        for (i, c) in lower.chars().enumerate() {
            let nibble = if i % 2 == 0 { hash[i / 2] >> 4 } else { hash[i / 2] & 0x0f };
            if c.is_ascii_alphabetic() && nibble >= 8 {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
        }
        out
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid address '{0}'")]
pub struct InvalidAddress(pub String);

impl FromStr for Address {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| InvalidAddress(s.to_string()))?;
        if digits.len() != 40 {
            return Err(InvalidAddress(s.to_string()));
        }
        let bytes = hex::decode(digits).map_err(|_| InvalidAddress(s.to_string()))?;
        Ok(Address(H160::from_slice(&bytes)))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Hash of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHash(pub H256);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0.as_bytes()))
    }
}

impl FromStr for TxHash {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits)
            .ok()
            .filter(|b| b.len() == 32)
            .ok_or_else(|| WalletError::InvalidResponse(format!("bad transaction hash '{}'", s)))?;
        Ok(TxHash(H256::from_slice(&bytes)))
    }
}

impl Serialize for TxHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Key-derivation input identifying whose wallet is meant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivationPath(Vec<Vec<u8>>);

impl DerivationPath {
    pub fn new(segments: Vec<Vec<u8>>) -> Self {
        DerivationPath(segments)
    }

    /// Single-segment path made of the principal's bytes.
    pub fn from_principal(principal: &str) -> Self {
        DerivationPath(vec![principal.as_bytes().to_vec()])
    }

    pub fn segments(&self) -> &[Vec<u8>] {
        &self.0
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(hex::encode).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub to: Address,
    /// Amount in wei.
    pub value: U256,
    pub gas_limit: u64,
}

/// Transfer-capable wallet.
#[async_trait]
pub trait WalletHandle: Send + Sync {
    fn address(&self) -> Address;

    /// Submits the transfer and returns its hash once the node accepted it.
    async fn transfer(&self, request: &TransferRequest) -> Result<TxHash, WalletError>;
}

#[async_trait]
pub trait WalletResolver: Send + Sync {
    async fn resolve(&self, path: &DerivationPath) -> Result<Arc<dyn WalletHandle>, WalletError>;

    /// Balance in wei.
    async fn balance(&self, address: Address) -> Result<U256, WalletError>;
}
