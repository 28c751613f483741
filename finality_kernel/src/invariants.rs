/// Finality kernel: Invariant Checks
///
/// Non-panicking. Every check returns `Err(message)` on the first failure.
/// `validate_invariants` inspects one state; `validate_progress` inspects
/// a committed step from one state to the next.

use crate::domain::CoreStatus;
use crate::state::CoreState;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run all state checks.
pub fn validate_invariants(state: &CoreState) -> Result<(), String> {
    check_pending_lengths(state)?;
    check_parameters(state)?;
    check_committee_bounds(state)?;
    check_votes(state)?;
    check_status_markers(state)?;
    Ok(())
}

/// Checks that only make sense across a transition.
pub fn validate_progress(prev: &CoreState, next: &CoreState) -> Result<(), String> {
    if !prev.status.can_transition_to(next.status) {
        return Err(format!(
            "[INVARIANT:status_edge] {} -> {} is not a lifecycle edge",
            prev.status, next.status
        ));
    }
    if next.height < prev.height {
        return Err(format!(
            "[INVARIANT:height_monotonic] height moved from {} to {}",
            prev.height, next.height
        ));
    }
    if next.dynasty < prev.dynasty {
        return Err(format!(
            "[INVARIANT:dynasty_monotonic] dynasty moved from {} to {}",
            prev.dynasty, next.dynasty
        ));
    }
    if prev.validators != next.validators && next.dynasty <= prev.dynasty {
        return Err(
            "[INVARIANT:dynasty_monotonic] validator set changed without a new dynasty"
                .to_string(),
        );
    }
    if prev.status != CoreStatus::Undefined
        && (prev.chain_id != next.chain_id
            || prev.epoch_length != next.epoch_length
            || prev.min_validators != next.min_validators
            || prev.join_limit != next.join_limit
            || prev.quorum_ratio != next.quorum_ratio)
    {
        return Err("[INVARIANT:chain_parameters] chain parameters changed after setup".to_string());
    }
    if let (Some(a), Some(b)) = (&prev.latest_kernel, &next.latest_kernel) {
        if a.hash() != b.hash() && b.height() <= a.height() {
            return Err(format!(
                "[INVARIANT:kernel_height] kernel height {} does not exceed {}",
                b.height(),
                a.height()
            ));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Individual checks (private)
// ---------------------------------------------------------------------------

fn check_pending_lengths(state: &CoreState) -> Result<(), String> {
    if state.pending_validators.len() != state.pending_reputation.len() {
        return Err(format!(
            "[INVARIANT:pending_lengths] {} pending validators, {} pending reputations",
            state.pending_validators.len(),
            state.pending_reputation.len()
        ));
    }
    Ok(())
}

fn check_parameters(state: &CoreState) -> Result<(), String> {
    if state.status == CoreStatus::Undefined {
        return Ok(());
    }
    if state.chain_id.is_zero() {
        return Err("[INVARIANT:chain_parameters] chain id is 0".to_string());
    }
    if state.epoch_length == 0 {
        return Err("[INVARIANT:chain_parameters] epoch length is 0".to_string());
    }
    if state.min_validators == 0 || state.min_validators > state.join_limit {
        return Err(format!(
            "[INVARIANT:chain_parameters] min validators {} outside 1..={}",
            state.min_validators, state.join_limit
        ));
    }
    Ok(())
}

fn check_committee_bounds(state: &CoreState) -> Result<(), String> {
    let size = state.committee_size();
    if state.status != CoreStatus::Undefined && size > state.join_limit {
        return Err(format!(
            "[INVARIANT:committee_bounds] {} validators exceed join limit {}",
            size, state.join_limit
        ));
    }
    let effective = match state.status {
        CoreStatus::Halted => state.halted_from.unwrap_or(CoreStatus::Halted),
        other => other,
    };
    if matches!(effective, CoreStatus::Opened | CoreStatus::Precommitted)
        && size < state.min_validators
    {
        return Err(format!(
            "[INVARIANT:committee_bounds] {} validators below minimum {}",
            size, state.min_validators
        ));
    }
    if state.validators.values().any(|w| *w == 0) {
        return Err("[INVARIANT:committee_bounds] validator with zero reputation".to_string());
    }
    Ok(())
}

fn check_votes(state: &CoreState) -> Result<(), String> {
    for (voter, target) in &state.votes {
        if !state.validators.contains_key(voter) {
            return Err(format!(
                "[INVARIANT:votes] vote recorded for non-member {}",
                voter
            ));
        }
        if !state.proposals.contains_key(target) {
            return Err(format!(
                "[INVARIANT:votes] vote from {} targets unknown checkpoint {}",
                voter, target
            ));
        }
    }
    let weight = u128::from(state.committee_weight());
    let total: u128 = state.tallies.values().map(|t| u128::from(*t)).sum();
    if total > weight {
        return Err(format!(
            "[INVARIANT:votes] tallied weight {} exceeds committee weight {}",
            total, weight
        ));
    }
    Ok(())
}

fn check_status_markers(state: &CoreState) -> Result<(), String> {
    if (state.status == CoreStatus::Corrupted) != state.fault.is_some() {
        return Err("[INVARIANT:status_markers] fault recorded iff corrupted".to_string());
    }
    if (state.status == CoreStatus::Halted) != state.halted_from.is_some() {
        return Err("[INVARIANT:status_markers] halt marker set iff halted".to_string());
    }
    if state.precommit.is_some() && state.latest_kernel.is_none() {
        return Err("[INVARIANT:status_markers] precommit without a kernel".to_string());
    }
    let effective = state.halted_from.unwrap_or(state.status);
    if effective == CoreStatus::Precommitted && state.precommit.is_none() {
        return Err("[INVARIANT:status_markers] precommitted without a checkpoint".to_string());
    }
    if effective == CoreStatus::Opened && state.precommit.is_some() {
        return Err("[INVARIANT:status_markers] opened with a frozen checkpoint".to_string());
    }
    Ok(())
}
