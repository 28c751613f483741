/// Finality kernel: Kernel Encoder
///
/// A Kernel is the immutable record of one finalized validator-set
/// transition plus the gas target, identified by its canonical hash.
///
/// Hash layout (32-byte words):
///   KERNEL_TYPEHASH
///   height
///   parent
///   H(updatedValidators, each left-padded)
///   H(updatedReputation)
///   gasTarget

use serde::{Deserialize, Serialize};

use crate::domain::{Address, H256};
use crate::error::KernelError;
use crate::hashing::{hash_address_list, hash_u64_list, keccak256, WordEncoder};

/// Field names and order are part of every kernel hash.
pub const KERNEL_TYPEHASH_STRING: &str = "Kernel(uint256 height,bytes32 parent,address[] updatedValidators,uint256[] updatedReputation,uint256 gasTarget)";

/// Keccak-256 of `KERNEL_TYPEHASH_STRING`.
pub fn kernel_typehash() -> H256 {
    keccak256(KERNEL_TYPEHASH_STRING.as_bytes())
}

/// Canonical hash of the kernel fields. Pure; no object required.
pub fn kernel_hash(
    height: u64,
    parent: &H256,
    updated_validators: &[Address],
    updated_reputation: &[u64],
    gas_target: u64,
) -> H256 {
    WordEncoder::with_typehash(KERNEL_TYPEHASH_STRING)
        .push_u64(height)
        .push_h256(parent)
        .push_h256(&hash_address_list(updated_validators))
        .push_h256(&hash_u64_list(updated_reputation))
        .push_u64(gas_target)
        .finish()
}

/// Finalized validator-set transition. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "KernelRecord")]
pub struct Kernel {
    height: u64,
    parent: H256,
    updated_validators: Vec<Address>,
    updated_reputation: Vec<u64>,
    gas_target: u64,
    hash: H256,
}

/// Wire form; the stored hash is checked against the fields on decode.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct KernelRecord {
    height: u64,
    parent: H256,
    updated_validators: Vec<Address>,
    updated_reputation: Vec<u64>,
    gas_target: u64,
    hash: H256,
}

impl TryFrom<KernelRecord> for Kernel {
    type Error = KernelError;

    fn try_from(r: KernelRecord) -> Result<Self, Self::Error> {
        let kernel = Kernel::new(
            r.height,
            r.parent,
            r.updated_validators,
            r.updated_reputation,
            r.gas_target,
        )?;
        if kernel.hash != r.hash {
            return Err(KernelError::HashMismatch {
                stored: r.hash,
                computed: kernel.hash,
            });
        }
        Ok(kernel)
    }
}

impl Kernel {
    /// Build a kernel and compute its hash once.
    ///
    /// `updated_reputation[i]` belongs to `updated_validators[i]`.
    pub fn new(
        height: u64,
        parent: H256,
        updated_validators: Vec<Address>,
        updated_reputation: Vec<u64>,
        gas_target: u64,
    ) -> Result<Self, KernelError> {
        if updated_validators.len() != updated_reputation.len() {
            return Err(KernelError::LengthMismatch {
                validators: updated_validators.len(),
                reputations: updated_reputation.len(),
            });
        }
        let hash = kernel_hash(
            height,
            &parent,
            &updated_validators,
            &updated_reputation,
            gas_target,
        );
        Ok(Self {
            height,
            parent,
            updated_validators,
            updated_reputation,
            gas_target,
            hash,
        })
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn parent(&self) -> H256 {
        self.parent
    }

    pub fn updated_validators(&self) -> &[Address] {
        &self.updated_validators
    }

    pub fn updated_reputation(&self) -> &[u64] {
        &self.updated_reputation
    }

    pub fn gas_target(&self) -> u64 {
        self.gas_target
    }

    pub fn hash(&self) -> H256 {
        self.hash
    }
}
