//! Runtime failures: storage, decoding, and everything the kernel rejects.

use std::io;

use thiserror::Error;

use finality_kernel::{CoreError, GatewayError, H256};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("protobuf decode: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("invalid frame length: {0}")]
    FrameLength(usize),

    #[error("truncated frame: {0}")]
    TruncatedFrame(io::Error),

    #[error("malformed record: {0}")]
    Malformed(String),

    #[error("sequence violation in operation log: expected {expected}, got {got}")]
    LogSequence { expected: u64, got: u64 },

    #[error("snapshot hash mismatch: stored {stored}, computed {computed}")]
    SnapshotHash { stored: H256, computed: H256 },

    #[error("snapshot protocol version {got} unsupported, expected {expected}")]
    SnapshotVersion { expected: u32, got: u32 },

    #[error("replay diverged: {first} != {second}")]
    ReplayDivergence { first: H256, second: H256 },

    #[error("no precommitted kernel to relay")]
    NothingToRelay,

    #[error("session lock poisoned")]
    LockPoisoned,
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
