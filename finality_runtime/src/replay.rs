//! Replay orchestrator: rebuild a Core from its operation log.
//!
//! Delegates every transition to the kernel. No shortcuts, no cached state.

use tracing::info;

use finality_kernel::hashing::state_hash;
use finality_kernel::{Authority, Core, OperationEnvelope, H256};

use crate::error::{RuntimeError, RuntimeResult};

/// Rebuild a Core from scratch.
///
/// 1. fresh Core driven by `consensus`
/// 2. each envelope applied in order (committed protocol violations included)
/// 3. return the Core and its state hash
pub fn rebuild_core(
    consensus: Authority,
    envelopes: &[OperationEnvelope],
) -> RuntimeResult<(Core, H256)> {
    let mut core = Core::new(consensus);
    core.apply_sequence(envelopes)?;
    let hash = state_hash(core.state())?;
    info!(
        operations = envelopes.len(),
        status = %core.status(),
        state_hash = %hash,
        "Replay complete"
    );
    Ok((core, hash))
}

/// Rebuild and return only the state hash.
pub fn rebuild_hash(consensus: Authority, envelopes: &[OperationEnvelope]) -> RuntimeResult<H256> {
    rebuild_core(consensus, envelopes).map(|(_, hash)| hash)
}

/// Replay twice and require identical hashes.
pub fn verify_determinism(
    consensus: Authority,
    envelopes: &[OperationEnvelope],
) -> RuntimeResult<H256> {
    let first = rebuild_hash(consensus, envelopes)?;
    let second = rebuild_hash(consensus, envelopes)?;
    if first != second {
        return Err(RuntimeError::ReplayDivergence { first, second });
    }
    Ok(first)
}

/// Consensus authority of a log: the caller of its first operation.
pub fn consensus_of(envelopes: &[OperationEnvelope]) -> Option<Authority> {
    envelopes.first().map(|e| e.caller)
}
