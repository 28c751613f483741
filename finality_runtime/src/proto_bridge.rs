//! Proto ↔ kernel conversion bridge.
//!
//! Encoding is total. Decoding is strict: missing messages, wrong byte
//! lengths and invalid quorum ratios are rejected, never defaulted.

use finality_kernel::{
    Address, Authority, Checkpoint, CoreOperation, CoreParams, OperationEnvelope, QuorumRatio,
    H256,
};

use crate::error::{RuntimeError, RuntimeResult};
use crate::proto_types::*;

/// Convert a kernel envelope to its protobuf form for the binary log.
pub fn operation_to_proto(envelope: &OperationEnvelope) -> ProtoOperationEnvelope {
    let kind = match &envelope.operation {
        CoreOperation::Setup { params } => OperationKind::Setup(Setup {
            params: Some(params_to_proto(params)),
        }),
        CoreOperation::Join {
            validator,
            reputation,
        } => OperationKind::Join(Join {
            validator: validator.as_bytes().to_vec(),
            reputation: *reputation,
        }),
        CoreOperation::Logout { validator } => OperationKind::Logout(Logout {
            validator: validator.as_bytes().to_vec(),
        }),
        CoreOperation::Propose { checkpoint } => OperationKind::Propose(Propose {
            checkpoint: Some(checkpoint_to_proto(checkpoint)),
        }),
        CoreOperation::Vote {
            validator,
            checkpoint,
        } => OperationKind::Vote(Vote {
            validator: validator.as_bytes().to_vec(),
            checkpoint: checkpoint.as_bytes().to_vec(),
        }),
        CoreOperation::ConfirmPrecommit { kernel_hash } => {
            OperationKind::ConfirmPrecommit(ConfirmPrecommit {
                kernel_hash: kernel_hash.as_bytes().to_vec(),
            })
        }
        CoreOperation::Halt => OperationKind::Halt(Halt {}),
        CoreOperation::Resume => OperationKind::Resume(Resume {}),
    };

    ProtoOperationEnvelope {
        sequence: envelope.sequence,
        caller: envelope.caller.address().as_bytes().to_vec(),
        schema_version: envelope.schema_version,
        operation: Some(ProtoOperation { kind: Some(kind) }),
    }
}

/// Convert a decoded log frame back to a kernel envelope.
pub fn proto_to_operation(proto: &ProtoOperationEnvelope) -> RuntimeResult<OperationEnvelope> {
    let kind = proto
        .operation
        .as_ref()
        .and_then(|op| op.kind.as_ref())
        .ok_or_else(|| malformed("envelope has no operation"))?;

    let operation = match kind {
        OperationKind::Setup(s) => {
            let params = s
                .params
                .as_ref()
                .ok_or_else(|| malformed("setup has no params"))?;
            CoreOperation::Setup {
                params: proto_to_params(params)?,
            }
        }
        OperationKind::Join(j) => CoreOperation::Join {
            validator: address(&j.validator, "join.validator")?,
            reputation: j.reputation,
        },
        OperationKind::Logout(l) => CoreOperation::Logout {
            validator: address(&l.validator, "logout.validator")?,
        },
        OperationKind::Propose(p) => {
            let checkpoint = p
                .checkpoint
                .as_ref()
                .ok_or_else(|| malformed("propose has no checkpoint"))?;
            CoreOperation::Propose {
                checkpoint: proto_to_checkpoint(checkpoint)?,
            }
        }
        OperationKind::Vote(v) => CoreOperation::Vote {
            validator: address(&v.validator, "vote.validator")?,
            checkpoint: hash(&v.checkpoint, "vote.checkpoint")?,
        },
        OperationKind::ConfirmPrecommit(c) => CoreOperation::ConfirmPrecommit {
            kernel_hash: hash(&c.kernel_hash, "confirm_precommit.kernel_hash")?,
        },
        OperationKind::Halt(_) => CoreOperation::Halt,
        OperationKind::Resume(_) => CoreOperation::Resume,
    };

    Ok(OperationEnvelope {
        sequence: proto.sequence,
        caller: Authority::new(address(&proto.caller, "caller")?),
        operation,
        schema_version: proto.schema_version,
    })
}

fn params_to_proto(p: &CoreParams) -> ProtoCoreParams {
    ProtoCoreParams {
        chain_id: p.chain_id.as_bytes().to_vec(),
        epoch_length: p.epoch_length,
        min_validators: p.min_validators,
        join_limit: p.join_limit,
        quorum_numerator: p.quorum.numerator(),
        quorum_denominator: p.quorum.denominator(),
        height: p.height,
        parent: p.parent.as_bytes().to_vec(),
        gas_target: p.gas_target,
        dynasty: p.dynasty,
        accumulated_gas: p.accumulated_gas,
        source: p.source.as_bytes().to_vec(),
        source_block_height: p.source_block_height,
    }
}

fn proto_to_params(p: &ProtoCoreParams) -> RuntimeResult<CoreParams> {
    Ok(CoreParams {
        chain_id: address(&p.chain_id, "params.chain_id")?,
        epoch_length: p.epoch_length,
        min_validators: p.min_validators,
        join_limit: p.join_limit,
        quorum: QuorumRatio::new(p.quorum_numerator, p.quorum_denominator)?,
        height: p.height,
        parent: hash(&p.parent, "params.parent")?,
        gas_target: p.gas_target,
        dynasty: p.dynasty,
        accumulated_gas: p.accumulated_gas,
        source: hash(&p.source, "params.source")?,
        source_block_height: p.source_block_height,
    })
}

fn checkpoint_to_proto(c: &Checkpoint) -> ProtoCheckpoint {
    ProtoCheckpoint {
        height: c.height,
        parent: c.parent.as_bytes().to_vec(),
        gas_target: c.gas_target,
        dynasty: c.dynasty,
        accumulated_gas: c.accumulated_gas,
        source: c.source.as_bytes().to_vec(),
        source_block_height: c.source_block_height,
    }
}

fn proto_to_checkpoint(c: &ProtoCheckpoint) -> RuntimeResult<Checkpoint> {
    Ok(Checkpoint {
        height: c.height,
        parent: hash(&c.parent, "checkpoint.parent")?,
        gas_target: c.gas_target,
        dynasty: c.dynasty,
        accumulated_gas: c.accumulated_gas,
        source: hash(&c.source, "checkpoint.source")?,
        source_block_height: c.source_block_height,
    })
}

fn address(bytes: &[u8], field: &str) -> RuntimeResult<Address> {
    <[u8; Address::LEN]>::try_from(bytes)
        .map(Address)
        .map_err(|_| malformed(&format!("{} must be {} bytes, got {}", field, Address::LEN, bytes.len())))
}

fn hash(bytes: &[u8], field: &str) -> RuntimeResult<H256> {
    <[u8; H256::LEN]>::try_from(bytes)
        .map(H256)
        .map_err(|_| malformed(&format!("{} must be {} bytes, got {}", field, H256::LEN, bytes.len())))
}

fn malformed(msg: &str) -> RuntimeError {
    RuntimeError::Malformed(msg.to_string())
}
