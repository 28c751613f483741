/// Finality kernel: Kernel Gateway
///
/// Companion-chain endpoint. Set up exactly once, then accepts kernel
/// hashes under external message keys. The message store is append-only:
/// a written key is never overwritten.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::domain::{Address, Authority, H256};
use crate::error::GatewayError;
use crate::hashing::kernel_message_key;
use crate::kernel::Kernel;

/// Bindings fixed by `setup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayBinding {
    pub chain_id: Address,
    pub kernel_co_gateway: Address,
    pub consensus: Authority,
}

#[derive(Debug, Clone, Default)]
pub struct KernelGateway {
    binding: Option<GatewayBinding>,
    kernel_messages: BTreeMap<H256, H256>,
    nonce: u64,
    latest_kernel_height: u64,
    latest_gas_target: u64,
}

impl KernelGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the gateway. Callable once; `caller` becomes the consensus
    /// authority.
    pub fn setup(
        &mut self,
        caller: Authority,
        chain_id: Address,
        kernel_co_gateway: Address,
    ) -> Result<(), GatewayError> {
        if self.binding.is_some() {
            return Err(GatewayError::AlreadySetup);
        }
        if chain_id.is_zero() {
            return Err(GatewayError::ZeroChainId);
        }
        if kernel_co_gateway.is_zero() {
            return Err(GatewayError::ZeroKernelCoGateway);
        }
        self.binding = Some(GatewayBinding {
            chain_id,
            kernel_co_gateway,
            consensus: caller,
        });
        info!(%chain_id, %kernel_co_gateway, consensus = %caller, "Kernel gateway set up");
        Ok(())
    }

    /// Store `kernel_hash` under `key`. Never overwrites.
    pub fn confirm_kernel(
        &mut self,
        caller: &Authority,
        key: H256,
        kernel_hash: H256,
    ) -> Result<(), GatewayError> {
        self.authorize(caller)?;
        if key.is_zero() {
            return Err(GatewayError::ZeroMessageKey);
        }
        if kernel_hash.is_zero() {
            return Err(GatewayError::ZeroKernelHash);
        }
        if let Some(existing) = self.kernel_messages.get(&key) {
            warn!(%key, %existing, "Kernel message key already written");
            return Err(GatewayError::MessageExists {
                key,
                existing: *existing,
            });
        }
        let nonce = self.nonce.checked_add(1).ok_or(GatewayError::NonceOverflow)?;
        self.kernel_messages.insert(key, kernel_hash);
        self.nonce = nonce;
        info!(%key, %kernel_hash, nonce = self.nonce, "Kernel message confirmed");
        Ok(())
    }

    /// Make a confirmed kernel the active one for downstream consumers.
    ///
    /// The kernel must hash to the value stored under `key` and be higher
    /// than the currently active kernel.
    pub fn activate_kernel(
        &mut self,
        caller: &Authority,
        key: H256,
        kernel: &Kernel,
    ) -> Result<(), GatewayError> {
        self.authorize(caller)?;
        let stored = self
            .kernel_message(&key)
            .ok_or(GatewayError::MessageNotFound(key))?;
        if stored != kernel.hash() {
            return Err(GatewayError::KernelHashMismatch {
                key,
                stored,
                got: kernel.hash(),
            });
        }
        if kernel.height() <= self.latest_kernel_height {
            return Err(GatewayError::StaleKernelHeight {
                latest: self.latest_kernel_height,
                got: kernel.height(),
            });
        }
        self.latest_kernel_height = kernel.height();
        self.latest_gas_target = kernel.gas_target();
        info!(
            height = kernel.height(),
            gas_target = kernel.gas_target(),
            "Kernel activated"
        );
        Ok(())
    }

    /// Key under which the next relayed `kernel_hash` is stored.
    pub fn next_message_key(&self, kernel_hash: &H256) -> Result<H256, GatewayError> {
        let binding = self.binding.ok_or(GatewayError::NotSetup)?;
        Ok(kernel_message_key(&binding.chain_id, kernel_hash, self.nonce))
    }

    fn authorize(&self, caller: &Authority) -> Result<GatewayBinding, GatewayError> {
        let binding = self.binding.ok_or(GatewayError::NotSetup)?;
        if binding.consensus != *caller {
            return Err(GatewayError::Unauthorized(caller.address()));
        }
        Ok(binding)
    }

    // -- queries ------------------------------------------------------------

    /// Stored kernel hash for `key`, or `H256::ZERO` if unset.
    pub fn kernel_messages(&self, key: &H256) -> H256 {
        self.kernel_message(key).unwrap_or(H256::ZERO)
    }

    pub fn kernel_message(&self, key: &H256) -> Option<H256> {
        self.kernel_messages.get(key).copied()
    }

    pub fn is_setup(&self) -> bool {
        self.binding.is_some()
    }

    pub fn binding(&self) -> Option<&GatewayBinding> {
        self.binding.as_ref()
    }

    pub fn chain_id(&self) -> Address {
        self.binding.map(|b| b.chain_id).unwrap_or(Address::ZERO)
    }

    pub fn kernel_co_gateway(&self) -> Address {
        self.binding
            .map(|b| b.kernel_co_gateway)
            .unwrap_or(Address::ZERO)
    }

    pub fn consensus(&self) -> Option<Authority> {
        self.binding.map(|b| b.consensus)
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn latest_kernel_height(&self) -> u64 {
        self.latest_kernel_height
    }

    pub fn latest_gas_target(&self) -> u64 {
        self.latest_gas_target
    }

    pub fn message_count(&self) -> usize {
        self.kernel_messages.len()
    }
}
