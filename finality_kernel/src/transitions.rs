/// Finality kernel: Centralized Transition Logic
///
/// ALL Core state mutation lives here.
/// The input state is never mutated: handlers work on a clone, and the
/// caller decides whether to commit it.
/// A handler returning `Err` rejects the operation. A detected protocol
/// violation is not an error here: it is a committed transition to
/// Corrupted, reported as `Outcome::Corrupted`.

use crate::domain::{Address, Authority, Checkpoint, CoreParams, CoreStatus, Fault, Outcome, H256};
use crate::error::CoreError;
use crate::hashing::checkpoint_hash;
use crate::kernel::Kernel;
use crate::operations::CoreOperation;
use crate::quorum::checked_add;
use crate::state::CoreState;

/// A computed, not yet committed, transition.
#[derive(Debug, Clone)]
pub struct Transition {
    pub state: CoreState,
    pub outcome: Outcome,
}

// ---------------------------------------------------------------------------
// Public dispatcher
// ---------------------------------------------------------------------------

/// Apply `operation` issued by `caller` to `state`.
pub fn apply_operation(
    state: &CoreState,
    caller: &Authority,
    operation: &CoreOperation,
) -> Result<Transition, CoreError> {
    check_operable(state, operation)?;

    if operation.requires_authority() && *caller != state.consensus {
        return Err(CoreError::Unauthorized(caller.address()));
    }

    let mut next = state.clone();
    let outcome = match operation {
        CoreOperation::Setup { params } => apply_setup(&mut next, params)?,
        CoreOperation::Join {
            validator,
            reputation,
        } => apply_join(&mut next, *validator, *reputation)?,
        CoreOperation::Logout { validator } => apply_logout(&mut next, *validator)?,
        CoreOperation::Propose { checkpoint } => apply_propose(&mut next, checkpoint)?,
        CoreOperation::Vote {
            validator,
            checkpoint,
        } => apply_vote(&mut next, *validator, *checkpoint)?,
        CoreOperation::ConfirmPrecommit { kernel_hash } => {
            apply_confirm(&mut next, *kernel_hash)?
        }
        CoreOperation::Halt => apply_halt(&mut next)?,
        CoreOperation::Resume => apply_resume(&mut next)?,
    };

    Ok(Transition {
        state: next,
        outcome,
    })
}

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

fn check_operable(state: &CoreState, operation: &CoreOperation) -> Result<(), CoreError> {
    match state.status {
        CoreStatus::Corrupted => match &state.fault {
            Some(fault) => Err(CoreError::Corrupted(fault.clone())),
            None => Err(CoreError::InvariantViolation(
                "corrupted core has no recorded fault".to_string(),
            )),
        },
        CoreStatus::Halted if !matches!(operation, CoreOperation::Resume) => {
            Err(CoreError::Halted)
        }
        _ => Ok(()),
    }
}

fn require_status(
    state: &CoreState,
    operation: &'static str,
    allowed: &[CoreStatus],
) -> Result<(), CoreError> {
    if allowed.contains(&state.status) {
        Ok(())
    } else {
        Err(CoreError::InvalidStatus {
            operation,
            status: state.status,
        })
    }
}

fn corrupt(state: &mut CoreState, fault: Fault) -> Outcome {
    state.status = CoreStatus::Corrupted;
    state.halted_from = None;
    state.fault = Some(fault.clone());
    Outcome::Corrupted(fault)
}

// ---------------------------------------------------------------------------
// Individual transition handlers (private)
// ---------------------------------------------------------------------------

fn apply_setup(state: &mut CoreState, p: &CoreParams) -> Result<Outcome, CoreError> {
    if state.status != CoreStatus::Undefined {
        return Err(CoreError::AlreadySetup);
    }
    if p.chain_id.is_zero() {
        return Err(CoreError::ZeroChainId);
    }
    if p.epoch_length == 0 {
        return Err(CoreError::ZeroEpochLength);
    }
    if p.min_validators == 0 {
        return Err(CoreError::ZeroMinValidators);
    }
    if p.min_validators > p.join_limit {
        return Err(CoreError::MinValidatorsExceedJoinLimit {
            min_validators: p.min_validators,
            join_limit: p.join_limit,
        });
    }

    state.chain_id = p.chain_id;
    state.epoch_length = p.epoch_length;
    state.min_validators = p.min_validators;
    state.join_limit = p.join_limit;
    state.quorum_ratio = p.quorum;
    state.height = p.height;
    state.parent = p.parent;
    state.gas_target = p.gas_target;
    state.dynasty = p.dynasty;
    state.accumulated_gas = p.accumulated_gas;
    state.source = p.source;
    state.source_block_height = p.source_block_height;
    state.status = CoreStatus::Creation;

    Ok(Outcome::SetUp)
}

fn apply_join(
    state: &mut CoreState,
    validator: Address,
    reputation: u64,
) -> Result<Outcome, CoreError> {
    require_status(state, "join", &[CoreStatus::Creation, CoreStatus::Opened])?;

    if validator.is_zero() {
        return Err(CoreError::ZeroValidator);
    }
    if reputation == 0 {
        return Err(CoreError::ZeroReputation(validator));
    }
    if state.validators.contains_key(&validator) {
        return Err(CoreError::AlreadyMember(validator));
    }
    if state.committee_size() >= state.join_limit {
        return Err(CoreError::JoinLimitReached {
            join_limit: state.join_limit,
        });
    }
    checked_add(state.committee_weight(), reputation, "committee weight")?;
    let dynasty = checked_add(state.dynasty, 1, "dynasty")?;

    state.validators.insert(validator, reputation);
    state.dynasty = dynasty;
    state.clear_round();
    state.pending_validators.push(validator);
    state.pending_reputation.push(reputation);

    let opened =
        state.status == CoreStatus::Creation && state.committee_size() >= state.min_validators;
    if opened {
        state.status = CoreStatus::Opened;
    }

    Ok(Outcome::Joined {
        validator,
        dynasty,
        opened,
    })
}

fn apply_logout(state: &mut CoreState, validator: Address) -> Result<Outcome, CoreError> {
    require_status(state, "logout", &[CoreStatus::Opened])?;

    if !state.validators.contains_key(&validator) {
        return Err(CoreError::NotMember(validator));
    }
    if state.committee_size() - 1 < state.min_validators {
        return Err(CoreError::BelowMinValidators {
            min_validators: state.min_validators,
        });
    }
    let dynasty = checked_add(state.dynasty, 1, "dynasty")?;

    state.validators.remove(&validator);
    state.dynasty = dynasty;
    state.clear_round();
    state.pending_validators.push(validator);
    state.pending_reputation.push(0);

    Ok(Outcome::LoggedOut { validator, dynasty })
}

fn apply_propose(state: &mut CoreState, checkpoint: &Checkpoint) -> Result<Outcome, CoreError> {
    require_status(state, "propose", &[CoreStatus::Opened])?;

    if checkpoint.dynasty != state.dynasty {
        return Err(CoreError::StaleDynasty {
            expected: state.dynasty,
            got: checkpoint.dynasty,
        });
    }
    let expected_height = checked_add(state.height, state.epoch_length, "height")?;
    if checkpoint.height != expected_height {
        return Err(CoreError::InvalidHeight {
            expected: expected_height,
            got: checkpoint.height,
        });
    }
    // Only a validator-set change may lower the gas target.
    if checkpoint.gas_target < state.gas_target && !state.has_pending_deltas() {
        return Err(CoreError::GasTargetDecrease {
            current: state.gas_target,
            proposed: checkpoint.gas_target,
        });
    }
    if checkpoint.source_block_height < state.source_block_height {
        return Err(CoreError::SourceRegression {
            current: state.source_block_height,
            got: checkpoint.source_block_height,
        });
    }

    let hash = checkpoint_hash(&state.chain_id, checkpoint);
    if state.proposals.contains_key(&hash) {
        return Err(CoreError::DuplicateProposal(hash));
    }

    if checkpoint.parent != state.parent {
        return Ok(corrupt(
            state,
            Fault::InvalidParent {
                expected: state.parent,
                got: checkpoint.parent,
            },
        ));
    }

    state.proposals.insert(hash, checkpoint.clone());
    Ok(Outcome::Proposed { checkpoint: hash })
}

fn apply_vote(
    state: &mut CoreState,
    validator: Address,
    checkpoint: H256,
) -> Result<Outcome, CoreError> {
    require_status(state, "vote", &[CoreStatus::Opened])?;

    // A non-member vote corrupts regardless of its target.
    let Some(&weight) = state.validators.get(&validator) else {
        return Ok(corrupt(state, Fault::UnknownValidator { validator }));
    };
    if !state.proposals.contains_key(&checkpoint) {
        return Err(CoreError::UnknownCheckpoint(checkpoint));
    }
    if let Some(&previous) = state.votes.get(&validator) {
        if previous == checkpoint {
            return Err(CoreError::AlreadyVoted {
                validator,
                checkpoint,
            });
        }
        return Ok(corrupt(
            state,
            Fault::DoubleVote {
                validator,
                dynasty: state.dynasty,
                first: previous,
                second: checkpoint,
            },
        ));
    }

    let current = state.tallies.get(&checkpoint).copied().unwrap_or(0);
    let tally = checked_add(current, weight, "tally")?;
    state.votes.insert(validator, checkpoint);
    state.tallies.insert(checkpoint, tally);

    let quorum = state.quorum();
    if tally >= quorum {
        return precommit(state, checkpoint);
    }

    Ok(Outcome::Voted {
        validator,
        checkpoint,
        tally,
        quorum,
    })
}

/// Freeze `checkpoint` and emit the kernel for the closing epoch.
fn precommit(state: &mut CoreState, checkpoint: H256) -> Result<Outcome, CoreError> {
    let cp = state
        .proposals
        .get(&checkpoint)
        .cloned()
        .ok_or(CoreError::UnknownCheckpoint(checkpoint))?;

    let kernel = Kernel::new(
        cp.height,
        state.latest_kernel_hash(),
        std::mem::take(&mut state.pending_validators),
        std::mem::take(&mut state.pending_reputation),
        cp.gas_target,
    )?;

    state.height = cp.height;
    state.gas_target = cp.gas_target;
    state.accumulated_gas = cp.accumulated_gas;
    state.source = cp.source;
    state.source_block_height = cp.source_block_height;
    state.precommit = Some(checkpoint);
    state.latest_kernel = Some(kernel.clone());
    state.status = CoreStatus::Precommitted;

    Ok(Outcome::Precommitted { checkpoint, kernel })
}

fn apply_confirm(state: &mut CoreState, kernel_hash: H256) -> Result<Outcome, CoreError> {
    require_status(state, "confirm_precommit", &[CoreStatus::Precommitted])?;

    let expected = state.latest_kernel_hash();
    if kernel_hash != expected {
        return Err(CoreError::KernelMismatch {
            expected,
            got: kernel_hash,
        });
    }
    let checkpoint = state.precommit.take().ok_or_else(|| {
        CoreError::InvariantViolation("precommitted core has no frozen checkpoint".to_string())
    })?;

    state.parent = checkpoint;
    state.clear_round();
    state.accumulated_gas = 0;
    state.status = CoreStatus::Opened;

    Ok(Outcome::Confirmed { kernel_hash })
}

fn apply_halt(state: &mut CoreState) -> Result<Outcome, CoreError> {
    require_status(
        state,
        "halt",
        &[CoreStatus::Opened, CoreStatus::Precommitted],
    )?;
    let from = state.status;
    state.halted_from = Some(from);
    state.status = CoreStatus::Halted;
    Ok(Outcome::Halted { from })
}

fn apply_resume(state: &mut CoreState) -> Result<Outcome, CoreError> {
    require_status(state, "resume", &[CoreStatus::Halted])?;
    let to = state.halted_from.take().ok_or_else(|| {
        CoreError::InvariantViolation("halted core has no prior status".to_string())
    })?;
    state.status = to;
    Ok(Outcome::Resumed { to })
}
