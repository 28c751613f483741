/// Finality kernel: Canonical Hashing
///
/// Deterministic, byte-identical encodings.
///
/// Struct hashes are Keccak-256 so they match the companion-chain
/// gateway. They follow the typed-structure layout:
///   - the structure's typehash (Keccak-256 of its signature string) first
///   - then every field as a 32-byte big-endian word, in signature order
///   - addresses left-padded to 32 bytes
///   - dynamic arrays replaced by the hash of their packed words
///
/// State hashes are SHA-256 of the compact serde JSON of `CoreState`.
/// Struct fields serialize in declaration order and every map is a
/// BTreeMap, so the bytes are stable.

use sha2::{Digest, Sha256};
use sha3::Keccak256;

use crate::domain::{Address, Checkpoint, H256};
use crate::state::CoreState;

/// Signature bound into every checkpoint hash.
pub const CHECKPOINT_TYPEHASH_STRING: &str = "Checkpoint(address chainId,uint256 height,bytes32 parent,uint256 gasTarget,uint256 dynasty,uint256 accumulatedGas,bytes32 source,uint256 sourceBlockHeight)";

/// Signature bound into every gateway message key.
pub const KERNEL_MESSAGE_TYPEHASH_STRING: &str =
    "KernelMessage(address chainId,bytes32 kernelHash,uint256 nonce)";

/// SHA-256 of arbitrary bytes. Used for state and snapshot hashes.
pub fn hash_bytes(bytes: &[u8]) -> H256 {
    H256(Sha256::digest(bytes).into())
}

/// Keccak-256 of arbitrary bytes. Used for every struct hash.
pub fn keccak256(bytes: &[u8]) -> H256 {
    H256(Keccak256::digest(bytes).into())
}

/// Append-only buffer of 32-byte words.
#[derive(Default)]
pub struct WordEncoder {
    buf: Vec<u8>,
}

impl WordEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_typehash(signature: &str) -> Self {
        let mut enc = Self::new();
        enc.push_h256(&keccak256(signature.as_bytes()));
        enc
    }

    pub fn push_u64(&mut self, value: u64) -> &mut Self {
        self.buf.extend_from_slice(&[0u8; 24]);
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn push_h256(&mut self, value: &H256) -> &mut Self {
        self.buf.extend_from_slice(value.as_bytes());
        self
    }

    pub fn push_address(&mut self, value: &Address) -> &mut Self {
        self.buf.extend_from_slice(&[0u8; 12]);
        self.buf.extend_from_slice(value.as_bytes());
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn finish(&self) -> H256 {
        keccak256(&self.buf)
    }
}

/// Hash of the packed, padded address list.
pub fn hash_address_list(addresses: &[Address]) -> H256 {
    let mut enc = WordEncoder::new();
    for a in addresses {
        enc.push_address(a);
    }
    enc.finish()
}

/// Hash of the packed word list.
pub fn hash_u64_list(values: &[u64]) -> H256 {
    let mut enc = WordEncoder::new();
    for v in values {
        enc.push_u64(*v);
    }
    enc.finish()
}

/// Canonical identity of a checkpoint proposed on `chain_id`.
pub fn checkpoint_hash(chain_id: &Address, checkpoint: &Checkpoint) -> H256 {
    WordEncoder::with_typehash(CHECKPOINT_TYPEHASH_STRING)
        .push_address(chain_id)
        .push_u64(checkpoint.height)
        .push_h256(&checkpoint.parent)
        .push_u64(checkpoint.gas_target)
        .push_u64(checkpoint.dynasty)
        .push_u64(checkpoint.accumulated_gas)
        .push_h256(&checkpoint.source)
        .push_u64(checkpoint.source_block_height)
        .finish()
}

/// Gateway message key for relaying `kernel_hash` as the `nonce`-th message.
pub fn kernel_message_key(chain_id: &Address, kernel_hash: &H256, nonce: u64) -> H256 {
    WordEncoder::with_typehash(KERNEL_MESSAGE_TYPEHASH_STRING)
        .push_address(chain_id)
        .push_h256(kernel_hash)
        .push_u64(nonce)
        .finish()
}

/// Compact JSON of the full Core state.
pub fn canonical_serialize(state: &CoreState) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(state)
}

/// SHA-256 of `canonical_serialize`.
pub fn state_hash(state: &CoreState) -> Result<H256, serde_json::Error> {
    Ok(hash_bytes(&canonical_serialize(state)?))
}
