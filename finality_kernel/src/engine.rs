/// Finality kernel: Core Engine
///
/// Stateful wrapper around the pure transition layer.
///
/// Every operation, direct or enveloped, takes one slot in a strict total
/// order: compute on a clone, validate invariants, then commit. Nothing
/// partial is ever observable.

use tracing::{debug, info, warn};

use crate::domain::{Address, Authority, Checkpoint, CoreParams, CoreStatus, Fault, Outcome, H256};
use crate::error::{CoreError, CoreResult};
use crate::invariants::{validate_invariants, validate_progress};
use crate::kernel::Kernel;
use crate::operations::{CoreOperation, OperationEnvelope, SCHEMA_VERSION};
use crate::state::{create_core_state, CoreState};
use crate::transitions::apply_operation;

/// One epoch-chain Core.
#[derive(Debug, Clone)]
pub struct Core {
    state: CoreState,
    last_sequence: u64,
}

impl Core {
    /// New Core in `Undefined`, driven by `consensus`.
    pub fn new(consensus: Authority) -> Self {
        Self {
            state: create_core_state(consensus),
            last_sequence: 0,
        }
    }

    /// Rebuild a Core from a stored state, e.g. a snapshot.
    pub fn from_state(state: CoreState, last_sequence: u64) -> CoreResult<Self> {
        validate_invariants(&state).map_err(CoreError::InvariantViolation)?;
        Ok(Self {
            state,
            last_sequence,
        })
    }

    // -- operations ---------------------------------------------------------

    /// `Undefined -> Creation`.
    pub fn setup(&mut self, caller: &Authority, params: CoreParams) -> CoreResult<()> {
        self.apply(caller, &CoreOperation::Setup { params })
            .map(|_| ())
    }

    /// Admit a validator. Returns the new dynasty.
    pub fn join(&mut self, caller: &Authority, validator: Address, reputation: u64) -> CoreResult<u64> {
        self.apply(
            caller,
            &CoreOperation::Join {
                validator,
                reputation,
            },
        )?;
        Ok(self.state.dynasty)
    }

    /// Join the whole genesis committee; must leave the Core `Opened`.
    ///
    /// All or nothing: on any failure the Core is unchanged.
    pub fn open(&mut self, caller: &Authority, genesis: &[(Address, u64)]) -> CoreResult<()> {
        let mut staged = self.clone();
        for (validator, reputation) in genesis {
            staged.join(caller, *validator, *reputation)?;
        }
        if staged.state.status != CoreStatus::Opened {
            return Err(CoreError::GenesisIncomplete {
                joined: staged.state.committee_size(),
                min_validators: staged.state.min_validators,
            });
        }
        *self = staged;
        Ok(())
    }

    /// Remove a validator. Returns the new dynasty.
    pub fn logout(&mut self, caller: &Authority, validator: Address) -> CoreResult<u64> {
        self.apply(caller, &CoreOperation::Logout { validator })?;
        Ok(self.state.dynasty)
    }

    /// Register a candidate checkpoint; returns its hash.
    pub fn propose(&mut self, caller: &Authority, checkpoint: Checkpoint) -> CoreResult<H256> {
        match self.apply(caller, &CoreOperation::Propose { checkpoint })? {
            Outcome::Proposed { checkpoint } => Ok(checkpoint),
            other => Err(unexpected("propose", &other)),
        }
    }

    /// Count `validator`'s reputation toward `checkpoint`.
    ///
    /// Returns `Outcome::Voted` or, when quorum is reached,
    /// `Outcome::Precommitted` carrying the emitted kernel.
    pub fn register_vote(&mut self, validator: Address, checkpoint: H256) -> CoreResult<Outcome> {
        let caller = self.state.consensus;
        self.apply(
            &caller,
            &CoreOperation::Vote {
                validator,
                checkpoint,
            },
        )
    }

    /// `Precommitted -> Opened` once the companion chain accepted the kernel.
    pub fn confirm_precommit(&mut self, caller: &Authority, kernel_hash: H256) -> CoreResult<()> {
        self.apply(caller, &CoreOperation::ConfirmPrecommit { kernel_hash })
            .map(|_| ())
    }

    pub fn halt(&mut self, caller: &Authority) -> CoreResult<()> {
        self.apply(caller, &CoreOperation::Halt).map(|_| ())
    }

    pub fn resume(&mut self, caller: &Authority) -> CoreResult<()> {
        self.apply(caller, &CoreOperation::Resume).map(|_| ())
    }

    /// Apply a sequenced operation:
    ///   1. schema version must be 1
    ///   2. sequence must be exactly `last_sequence + 1`
    ///   3. delegate to the transition layer
    pub fn apply_envelope(&mut self, envelope: &OperationEnvelope) -> CoreResult<Outcome> {
        if envelope.schema_version != SCHEMA_VERSION {
            return Err(CoreError::SchemaVersion {
                expected: SCHEMA_VERSION,
                got: envelope.schema_version,
            });
        }
        let expected = self.last_sequence + 1;
        if envelope.sequence != expected {
            return Err(CoreError::SequenceViolation {
                expected,
                got: envelope.sequence,
            });
        }
        self.apply(&envelope.caller, &envelope.operation)
    }

    /// Apply an ordered batch, stopping at the first rejection.
    ///
    /// A protocol violation is committed, so replay continues past it.
    pub fn apply_sequence(&mut self, envelopes: &[OperationEnvelope]) -> CoreResult<()> {
        for envelope in envelopes {
            match self.apply_envelope(envelope) {
                Ok(_) | Err(CoreError::ProtocolViolation(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn apply(&mut self, caller: &Authority, operation: &CoreOperation) -> CoreResult<Outcome> {
        let transition = match apply_operation(&self.state, caller, operation) {
            Ok(t) => t,
            Err(e) => {
                warn!(operation = operation.name(), error = %e, "Core operation rejected");
                return Err(e);
            }
        };

        validate_invariants(&transition.state)
            .and_then(|()| validate_progress(&self.state, &transition.state))
            .map_err(|msg| {
                warn!(operation = operation.name(), %msg, "Core transition violates invariants");
                CoreError::InvariantViolation(msg)
            })?;

        self.state = transition.state;
        self.last_sequence += 1;
        self.log_outcome(&transition.outcome);

        match transition.outcome {
            Outcome::Corrupted(fault) => Err(CoreError::ProtocolViolation(fault)),
            outcome => Ok(outcome),
        }
    }

    fn log_outcome(&self, outcome: &Outcome) {
        let chain_id = self.state.chain_id;
        match outcome {
            Outcome::Voted {
                validator,
                checkpoint,
                tally,
                quorum,
            } => debug!(%chain_id, %validator, %checkpoint, tally, quorum, "Vote registered"),
            Outcome::Precommitted { checkpoint, kernel } => info!(
                %chain_id,
                %checkpoint,
                height = kernel.height(),
                kernel_hash = %kernel.hash(),
                updated_validators = kernel.updated_validators().len(),
                "Core precommitted"
            ),
            Outcome::Corrupted(fault) => warn!(%chain_id, %fault, "Core corrupted"),
            other => info!(
                %chain_id,
                outcome = other.name(),
                status = %self.state.status,
                dynasty = self.state.dynasty,
                "Core transition"
            ),
        }
    }

    // -- queries ------------------------------------------------------------

    pub fn state(&self) -> &CoreState {
        &self.state
    }

    pub fn status(&self) -> CoreStatus {
        self.state.status
    }

    pub fn is_undefined(&self) -> bool {
        self.state.status == CoreStatus::Undefined
    }

    pub fn is_created(&self) -> bool {
        self.state.status == CoreStatus::Creation
    }

    pub fn is_opened(&self) -> bool {
        self.state.status == CoreStatus::Opened
    }

    pub fn is_precommitted(&self) -> bool {
        self.state.status == CoreStatus::Precommitted
    }

    pub fn is_halted(&self) -> bool {
        self.state.status == CoreStatus::Halted
    }

    pub fn is_corrupted(&self) -> bool {
        self.state.status == CoreStatus::Corrupted
    }

    /// Quorum threshold for the live committee.
    pub fn quorum(&self) -> u64 {
        self.state.quorum()
    }

    pub fn committee_weight(&self) -> u64 {
        self.state.committee_weight()
    }

    pub fn latest_kernel_hash(&self) -> H256 {
        self.state.latest_kernel_hash()
    }

    pub fn latest_kernel(&self) -> Option<&Kernel> {
        self.state.latest_kernel.as_ref()
    }

    pub fn height(&self) -> u64 {
        self.state.height
    }

    pub fn dynasty(&self) -> u64 {
        self.state.dynasty
    }

    pub fn parent(&self) -> H256 {
        self.state.parent
    }

    pub fn gas_target(&self) -> u64 {
        self.state.gas_target
    }

    pub fn chain_id(&self) -> Address {
        self.state.chain_id
    }

    pub fn epoch_length(&self) -> u64 {
        self.state.epoch_length
    }

    pub fn consensus(&self) -> Authority {
        self.state.consensus
    }

    pub fn validators(&self) -> impl Iterator<Item = (&Address, &u64)> {
        self.state.validators.iter()
    }

    /// Accumulated weight for `checkpoint` in the current dynasty.
    pub fn tally(&self, checkpoint: &H256) -> u64 {
        self.state.tallies.get(checkpoint).copied().unwrap_or(0)
    }

    pub fn fault(&self) -> Option<&Fault> {
        self.state.fault.as_ref()
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }
}

fn unexpected(operation: &str, outcome: &Outcome) -> CoreError {
    CoreError::InvariantViolation(format!(
        "{} produced unexpected outcome {}",
        operation,
        outcome.name()
    ))
}
