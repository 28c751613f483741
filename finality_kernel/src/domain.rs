/// Finality kernel: Core Domain Types
///
/// Pure data. No transition logic.
/// Identifiers are fixed-width byte strings rendered as 0x-prefixed hex.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::kernel::Kernel;
use crate::quorum::QuorumRatio;

// ── Fixed-width identifiers ────────────────────────────────────────

/// Failure to parse a hex identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} {input:?}: {reason}")]
pub struct ParseBytesError {
    pub kind: &'static str,
    pub input: String,
    pub reason: String,
}

macro_rules! fixed_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;
            pub const ZERO: Self = Self([0u8; $len]);

            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; $len]
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Big-endian `value` in the low-order bytes. Handy for fixtures.
            pub fn from_low_u64(value: u64) -> Self {
                let mut out = [0u8; $len];
                out[$len - 8..].copy_from_slice(&value.to_be_bytes());
                Self(out)
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = ParseBytesError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let digits = s.strip_prefix("0x").unwrap_or(s);
                let mut out = [0u8; $len];
                hex::decode_to_slice(digits, &mut out).map_err(|e| ParseBytesError {
                    kind: stringify!($name),
                    input: s.to_string(),
                    reason: e.to_string(),
                })?;
                Ok(Self(out))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

fixed_bytes!(
    /// 20-byte identity: validators, chain ids, gateways, authorities.
    Address,
    20
);

fixed_bytes!(
    /// 32-byte content hash. `H256::ZERO` is the absent / genesis sentinel.
    H256,
    32
);

/// Explicit capability naming the party allowed to drive a Core or Gateway.
///
/// Passed into every authorized call instead of being read from an
/// ambient caller context.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Authority(Address);

impl Authority {
    pub fn new(address: Address) -> Self {
        Self(address)
    }

    pub fn address(&self) -> Address {
        self.0
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ── Core lifecycle ─────────────────────────────────────────────────

/// Lifecycle status of a Core.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoreStatus {
    Undefined,
    Creation,
    Opened,
    Precommitted,
    Halted,
    Corrupted,
}

impl CoreStatus {
    /// Numeric code used by the companion-chain ABI.
    pub fn code(self) -> u8 {
        match self {
            CoreStatus::Undefined => 0,
            CoreStatus::Creation => 1,
            CoreStatus::Opened => 2,
            CoreStatus::Precommitted => 3,
            CoreStatus::Halted => 4,
            CoreStatus::Corrupted => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CoreStatus::Corrupted)
    }

    /// Whether `self -> next` is an edge of the lifecycle graph.
    pub fn can_transition_to(self, next: CoreStatus) -> bool {
        use CoreStatus::*;
        match (self, next) {
            (Corrupted, _) => false,
            (_, Corrupted) => true,
            (a, b) if a == b => true,
            (Undefined, Creation) => true,
            (Creation, Opened) => true,
            (Opened, Precommitted) => true,
            (Precommitted, Opened) => true,
            (Opened | Precommitted, Halted) => true,
            (Halted, Opened | Precommitted) => true,
            _ => false,
        }
    }
}

impl fmt::Display for CoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CoreStatus::Undefined => "undefined",
            CoreStatus::Creation => "creation",
            CoreStatus::Opened => "opened",
            CoreStatus::Precommitted => "precommitted",
            CoreStatus::Halted => "halted",
            CoreStatus::Corrupted => "corrupted",
        };
        f.write_str(name)
    }
}

/// Chain parameters and opening checkpoint supplied at setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoreParams {
    pub chain_id: Address,
    pub epoch_length: u64,
    pub min_validators: u64,
    pub join_limit: u64,
    #[serde(default)]
    pub quorum: QuorumRatio,
    pub height: u64,
    pub parent: H256,
    pub gas_target: u64,
    pub dynasty: u64,
    pub accumulated_gas: u64,
    pub source: H256,
    pub source_block_height: u64,
}

/// A proposed checkpoint validators vote on within one dynasty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Checkpoint {
    pub height: u64,
    pub parent: H256,
    pub gas_target: u64,
    pub dynasty: u64,
    pub accumulated_gas: u64,
    pub source: H256,
    pub source_block_height: u64,
}

/// Detected protocol violation. Recording one corrupts the Core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fault {
    #[error("validator {validator} voted for {first} and {second} in dynasty {dynasty}")]
    DoubleVote {
        validator: Address,
        dynasty: u64,
        first: H256,
        second: H256,
    },
    #[error("checkpoint parent {got} does not chain to {expected}")]
    InvalidParent { expected: H256, got: H256 },
    #[error("vote from {validator}, which is not a committee member")]
    UnknownValidator { validator: Address },
}

/// Structured outcome of a committed transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    SetUp,
    Joined {
        validator: Address,
        dynasty: u64,
        opened: bool,
    },
    LoggedOut {
        validator: Address,
        dynasty: u64,
    },
    Proposed {
        checkpoint: H256,
    },
    Voted {
        validator: Address,
        checkpoint: H256,
        tally: u64,
        quorum: u64,
    },
    Precommitted {
        checkpoint: H256,
        kernel: Kernel,
    },
    Confirmed {
        kernel_hash: H256,
    },
    Halted {
        from: CoreStatus,
    },
    Resumed {
        to: CoreStatus,
    },
    Corrupted(Fault),
}

impl Outcome {
    pub fn name(&self) -> &'static str {
        match self {
            Outcome::SetUp => "set_up",
            Outcome::Joined { .. } => "joined",
            Outcome::LoggedOut { .. } => "logged_out",
            Outcome::Proposed { .. } => "proposed",
            Outcome::Voted { .. } => "voted",
            Outcome::Precommitted { .. } => "precommitted",
            Outcome::Confirmed { .. } => "confirmed",
            Outcome::Halted { .. } => "halted",
            Outcome::Resumed { .. } => "resumed",
            Outcome::Corrupted(_) => "corrupted",
        }
    }
}
