#![forbid(unsafe_code)]

//! Committee finality kernel.
//!
//! Deterministic, I/O-free implementation of the epoch Core state
//! machine, the Kernel encoder that canonicalizes a precommitted
//! validator-set transition, and the companion-chain Kernel Gateway.

/// Protocol v1. Changing any hash layout requires a new version.
pub const PROTOCOL_VERSION: u32 = 1;

pub mod domain;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod hashing;
pub mod invariants;
pub mod kernel;
pub mod operations;
pub mod quorum;
pub mod state;
pub mod transitions;

pub use domain::{Address, Authority, Checkpoint, CoreParams, CoreStatus, Fault, Outcome, H256};
pub use engine::Core;
pub use error::{CoreError, GatewayError, KernelError};
pub use gateway::KernelGateway;
pub use kernel::Kernel;
pub use operations::{CoreOperation, OperationEnvelope};
pub use quorum::QuorumRatio;
pub use state::CoreState;
