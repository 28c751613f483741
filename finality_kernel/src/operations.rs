/// Finality kernel: Operation Definitions
///
/// Operations are pure data: intent and payload only, no transition
/// logic. Every Core mutation has exactly one operation form, so any
/// history can be logged and replayed.
///
/// Schema version is locked at 1.

use serde::{Deserialize, Serialize};

use crate::domain::{Address, Authority, Checkpoint, CoreParams, H256};

/// Schema version for v1 operations.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoreOperation {
    Setup { params: CoreParams },
    Join { validator: Address, reputation: u64 },
    Logout { validator: Address },
    Propose { checkpoint: Checkpoint },
    Vote { validator: Address, checkpoint: H256 },
    ConfirmPrecommit { kernel_hash: H256 },
    Halt,
    Resume,
}

impl CoreOperation {
    pub fn name(&self) -> &'static str {
        match self {
            CoreOperation::Setup { .. } => "setup",
            CoreOperation::Join { .. } => "join",
            CoreOperation::Logout { .. } => "logout",
            CoreOperation::Propose { .. } => "propose",
            CoreOperation::Vote { .. } => "vote",
            CoreOperation::ConfirmPrecommit { .. } => "confirm_precommit",
            CoreOperation::Halt => "halt",
            CoreOperation::Resume => "resume",
        }
    }

    /// Votes carry their own validator identity; everything else is
    /// driven by the consensus authority.
    pub fn requires_authority(&self) -> bool {
        !matches!(self, CoreOperation::Vote { .. })
    }
}

/// Sequenced operation with the caller's capability attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperationEnvelope {
    pub sequence: u64,
    pub caller: Authority,
    pub operation: CoreOperation,
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl OperationEnvelope {
    pub fn new(sequence: u64, caller: Authority, operation: CoreOperation) -> Self {
        Self {
            sequence,
            caller,
            operation,
            schema_version: SCHEMA_VERSION,
        }
    }
}
