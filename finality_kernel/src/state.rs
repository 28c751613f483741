/// Finality kernel: Core State
///
/// One epoch-chain pair. Chain parameters are zero until setup.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Address, Authority, Checkpoint, CoreStatus, Fault, H256};
use crate::kernel::Kernel;
use crate::quorum::QuorumRatio;

/// Complete Core state snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoreState {
    pub consensus: Authority,
    pub status: CoreStatus,
    /// Status to restore on resume. Set only while halted.
    pub halted_from: Option<CoreStatus>,

    // -- chain parameters, immutable after setup --
    pub chain_id: Address,
    pub epoch_length: u64,
    pub min_validators: u64,
    pub join_limit: u64,
    pub quorum_ratio: QuorumRatio,

    // -- live checkpoint --
    pub height: u64,
    pub parent: H256,
    pub gas_target: u64,
    pub dynasty: u64,
    pub accumulated_gas: u64,
    pub source: H256,
    pub source_block_height: u64,

    /// Committee: validator -> reputation.
    pub validators: BTreeMap<Address, u64>,
    /// Live proposals of the current dynasty, by checkpoint hash.
    pub proposals: BTreeMap<H256, Checkpoint>,
    /// Voter -> chosen checkpoint, current dynasty only.
    pub votes: BTreeMap<Address, H256>,
    /// Checkpoint -> accumulated reputation.
    pub tallies: BTreeMap<H256, u64>,
    /// Checkpoint hash frozen by the last precommit, until confirmed.
    pub precommit: Option<H256>,

    /// Validator-set deltas since the last kernel, in event order.
    pub pending_validators: Vec<Address>,
    pub pending_reputation: Vec<u64>,

    pub latest_kernel: Option<Kernel>,
    pub fault: Option<Fault>,
}

/// Fresh Core owned by `consensus`, before setup.
pub fn create_core_state(consensus: Authority) -> CoreState {
    CoreState {
        consensus,
        status: CoreStatus::Undefined,
        halted_from: None,
        chain_id: Address::ZERO,
        epoch_length: 0,
        min_validators: 0,
        join_limit: 0,
        quorum_ratio: QuorumRatio::default(),
        height: 0,
        parent: H256::ZERO,
        gas_target: 0,
        dynasty: 0,
        accumulated_gas: 0,
        source: H256::ZERO,
        source_block_height: 0,
        validators: BTreeMap::new(),
        proposals: BTreeMap::new(),
        votes: BTreeMap::new(),
        tallies: BTreeMap::new(),
        precommit: None,
        pending_validators: Vec::new(),
        pending_reputation: Vec::new(),
        latest_kernel: None,
        fault: None,
    }
}

impl CoreState {
    /// Sum of committee reputation. Joins are overflow-checked, so the
    /// sum always fits.
    pub fn committee_weight(&self) -> u64 {
        self.validators
            .values()
            .fold(0u64, |acc, w| acc.saturating_add(*w))
    }

    pub fn committee_size(&self) -> u64 {
        self.validators.len() as u64
    }

    /// Quorum threshold over the live committee.
    pub fn quorum(&self) -> u64 {
        self.quorum_ratio.quorum(self.committee_weight())
    }

    /// Hash of the last emitted kernel, or `H256::ZERO` before the first.
    pub fn latest_kernel_hash(&self) -> H256 {
        self.latest_kernel
            .as_ref()
            .map(Kernel::hash)
            .unwrap_or(H256::ZERO)
    }

    pub fn has_pending_deltas(&self) -> bool {
        !self.pending_validators.is_empty()
    }

    /// Drop all proposals and votes. Used on dynasty and epoch changes.
    pub(crate) fn clear_round(&mut self) {
        self.proposals.clear();
        self.votes.clear();
        self.tallies.clear();
    }
}
