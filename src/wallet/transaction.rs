use k256::ecdsa::SigningKey;
use primitive_types::{H256, U256};
use rlp::RlpStream;
use sha3::{Digest, Keccak256};

use super::{Address, TxHash, WalletError};

/// EIP-155 legacy value transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: U256,
    pub gas_price: U256,
    pub gas_limit: u64,
    pub to: Address,
    pub value: U256,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

#[derive(Debug, Clone)]
pub struct SignedTransaction {
    /// RLP bytes ready for `eth_sendRawTransaction`.
    pub raw: Vec<u8>,
    pub hash: TxHash,
}

impl SignedTransaction {
    pub fn raw_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.raw))
    }
}

impl LegacyTransaction {
    fn append_fields(&self, stream: &mut RlpStream) {
        stream.append(&self.nonce);
        stream.append(&self.gas_price);
        stream.append(&self.gas_limit);
        stream.append(&self.to.0);
        stream.append(&self.value);
        stream.append(&self.data);
    }

    /// keccak256(rlp([nonce, gasPrice, gasLimit, to, value, data, chainId, 0, 0]))
    pub fn signing_hash(&self) -> [u8; 32] {
        let mut stream = RlpStream::new_list(9);
        self.append_fields(&mut stream);
        stream.append(&self.chain_id);
        stream.append(&0u8);
        stream.append(&0u8);
        Keccak256::digest(stream.out()).into()
    }

    pub fn sign(&self, key: &SigningKey) -> Result<SignedTransaction, WalletError> {
        let hash = self.signing_hash();
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(&hash)
            .map_err(|e| WalletError::Signing(e.to_string()))?;

        let v = self.chain_id * 2 + 35 + u64::from(recovery_id.to_byte());
        let bytes = signature.to_bytes();
        let r = U256::from_big_endian(&bytes[..32]);
        let s = U256::from_big_endian(&bytes[32..]);

        let mut stream = RlpStream::new_list(9);
        self.append_fields(&mut stream);
        stream.append(&v);
        stream.append(&r);
        stream.append(&s);
        let raw = stream.out().to_vec();

        let hash = TxHash(H256::from_slice(&Keccak256::digest(&raw)));
        Ok(SignedTransaction { raw, hash })
    }
}
