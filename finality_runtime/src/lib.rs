#![forbid(unsafe_code)]

//! Finality runtime.
//!
//! Wraps the finality kernel with persistence, replay, snapshots and a
//! relay session that carries precommitted kernels to the gateway.
//!
//! No protocol logic lives here. Every transition and invariant is
//! delegated to the kernel.

pub mod config;
pub mod error;
pub mod operation_log;
pub mod proto_bridge;
pub mod proto_types;
pub mod relay;
pub mod replay;
pub mod snapshot;

pub use config::RuntimeConfig;
pub use error::{RuntimeError, RuntimeResult};
pub use operation_log::OperationLog;
pub use relay::{RelaySession, SharedRelaySession};
