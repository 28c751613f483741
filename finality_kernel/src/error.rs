//! Error types for the finality kernel.

use thiserror::Error;

use crate::domain::{Address, CoreStatus, Fault, H256};

/// Errors returned by Core operations.
///
/// Every variant except `ProtocolViolation` leaves the Core untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    // -- configuration --
    #[error("chain id is 0")]
    ZeroChainId,

    #[error("epoch length is 0")]
    ZeroEpochLength,

    #[error("min validators is 0")]
    ZeroMinValidators,

    #[error("min validators ({min_validators}) exceeds join limit ({join_limit})")]
    MinValidatorsExceedJoinLimit { min_validators: u64, join_limit: u64 },

    #[error("invalid quorum ratio {numerator}/{denominator}: must be a super-majority fraction")]
    InvalidQuorumRatio { numerator: u64, denominator: u64 },

    #[error("core is already set up")]
    AlreadySetup,

    #[error("caller {0} is not the consensus authority")]
    Unauthorized(Address),

    // -- lifecycle --
    #[error("{operation} is not permitted while core is {status}")]
    InvalidStatus {
        operation: &'static str,
        status: CoreStatus,
    },

    #[error("core is halted")]
    Halted,

    #[error("core is corrupted: {0}")]
    Corrupted(Fault),

    #[error("protocol violation: {0}")]
    ProtocolViolation(Fault),

    #[error("genesis set of {joined} validators did not open the core (min {min_validators})")]
    GenesisIncomplete { joined: u64, min_validators: u64 },

    // -- committee --
    #[error("validator {0} is already a committee member")]
    AlreadyMember(Address),

    #[error("validator {0} is not a committee member")]
    NotMember(Address),

    #[error("validator {0} has zero reputation")]
    ZeroReputation(Address),

    #[error("validator identity is 0")]
    ZeroValidator,

    #[error("committee is at its join limit ({join_limit})")]
    JoinLimitReached { join_limit: u64 },

    #[error("removal would leave fewer than {min_validators} validators")]
    BelowMinValidators { min_validators: u64 },

    // -- proposals and votes --
    #[error("checkpoint dynasty {got} is stale (current {expected})")]
    StaleDynasty { expected: u64, got: u64 },

    #[error("checkpoint height {got} is invalid (expected {expected})")]
    InvalidHeight { expected: u64, got: u64 },

    #[error("gas target {proposed} is below {current} with no validator-set change pending")]
    GasTargetDecrease { current: u64, proposed: u64 },

    #[error("source block height {got} regresses below {current}")]
    SourceRegression { current: u64, got: u64 },

    #[error("checkpoint {0} is already proposed")]
    DuplicateProposal(H256),

    #[error("checkpoint {0} is not a live proposal")]
    UnknownCheckpoint(H256),

    #[error("validator {validator} already voted for {checkpoint}")]
    AlreadyVoted { validator: Address, checkpoint: H256 },

    #[error("kernel hash {got} does not match the precommitted kernel {expected}")]
    KernelMismatch { expected: H256, got: H256 },

    // -- sequencing and integrity --
    #[error("sequence violation: expected {expected}, got {got}")]
    SequenceViolation { expected: u64, got: u64 },

    #[error("schema version mismatch: expected {expected}, got {got}")]
    SchemaVersion { expected: u32, got: u32 },

    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Kernel(#[from] KernelError),
}

/// Errors building a Kernel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    #[error("{validators} updated validators but {reputations} reputation values")]
    LengthMismatch { validators: usize, reputations: usize },

    #[error("stored kernel hash {stored} does not match recomputed {computed}")]
    HashMismatch { stored: H256, computed: H256 },
}

/// Errors returned by the Kernel Gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("Chain id is 0.")]
    ZeroChainId,

    #[error("KernelCoGateway address is 0.")]
    ZeroKernelCoGateway,

    #[error("Kernel gateway is already setup.")]
    AlreadySetup,

    #[error("Kernel gateway is not setup.")]
    NotSetup,

    #[error("caller {0} is not the consensus authority")]
    Unauthorized(Address),

    #[error("message key is 0")]
    ZeroMessageKey,

    #[error("kernel hash is 0")]
    ZeroKernelHash,

    #[error("message {key} already stores kernel {existing}")]
    MessageExists { key: H256, existing: H256 },

    #[error("no kernel message stored under {0}")]
    MessageNotFound(H256),

    #[error("kernel {got} does not match stored kernel {stored} for message {key}")]
    KernelHashMismatch { key: H256, stored: H256, got: H256 },

    #[error("kernel height {got} is not above latest activated height {latest}")]
    StaleKernelHeight { latest: u64, got: u64 },

    #[error("gateway nonce overflow")]
    NonceOverflow,
}

/// Result type for Core operations.
pub type CoreResult<T> = Result<T, CoreError>;
