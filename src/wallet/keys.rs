use hmac::{Hmac, Mac};
use k256::ecdsa::SigningKey;
use sha2::Sha256;

use super::{Address, DerivationPath, WalletError};

type HmacSha256 = Hmac<Sha256>;

// Upper bound on rejection-sampling rounds
const MAX_DERIVATION_ROUNDS: u32 = 16;

/// Derives one secp256k1 key per derivation path from a single master secret.
///
/// The same path always yields the same key, and distinct paths yield
/// independent keys.
pub struct KeyDeriver {
    master: [u8; 32],
}

impl KeyDeriver {
    pub fn new(master: [u8; 32]) -> Self {
        Self { master }
    }

    pub fn from_hex(text: &str) -> Result<Self, WalletError> {
        let bytes = hex::decode(text.trim().trim_start_matches("0x"))
            .map_err(|e| WalletError::Derivation(format!("master key is not hex: {}", e)))?;
        let master: [u8; 32] = bytes
            .try_into()
            .map_err(|_| WalletError::Derivation("master key must be 32 bytes".to_string()))?;
        Ok(Self::new(master))
    }

    pub fn derive(&self, path: &DerivationPath) -> Result<SigningKey, WalletError> {
        for round in 0..MAX_DERIVATION_ROUNDS {
            let mut mac = HmacSha256::new_from_slice(&self.master)
                .map_err(|e| WalletError::Derivation(e.to_string()))?;
            for segment in path.segments() {
                mac.update(&(segment.len() as u32).to_be_bytes());
                mac.update(segment);
            }
            mac.update(&round.to_be_bytes());
            let candidate = mac.finalize().into_bytes();

            // zero or >= curve order: try the next round
            if let Ok(key) = SigningKey::from_slice(&candidate) {
                return Ok(key);
            }
        }
        Err(WalletError::Derivation(format!("no valid key for path {}", path)))
    }

    pub fn address(&self, path: &DerivationPath) -> Result<Address, WalletError> {
        let key = self.derive(path)?;
        Ok(Address::from_public_key(key.verifying_key()))
    }
}
