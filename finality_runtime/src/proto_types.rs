//! Hand-written protobuf types for the operation log.
//!
//! Uses prost derive macros for encode/decode without prost-build.
//! Addresses are 20 raw bytes, hashes 32 raw bytes.

use prost::Message;

// ── Envelope ───────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct ProtoOperationEnvelope {
    #[prost(uint64, tag = "1")]
    pub sequence: u64,
    #[prost(bytes = "vec", tag = "2")]
    pub caller: Vec<u8>,
    #[prost(uint32, tag = "3")]
    pub schema_version: u32,
    #[prost(message, optional, tag = "4")]
    pub operation: Option<ProtoOperation>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ProtoOperation {
    #[prost(oneof = "OperationKind", tags = "1, 2, 3, 4, 5, 6, 7, 8")]
    pub kind: Option<OperationKind>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum OperationKind {
    #[prost(message, tag = "1")]
    Setup(Setup),
    #[prost(message, tag = "2")]
    Join(Join),
    #[prost(message, tag = "3")]
    Logout(Logout),
    #[prost(message, tag = "4")]
    Propose(Propose),
    #[prost(message, tag = "5")]
    Vote(Vote),
    #[prost(message, tag = "6")]
    ConfirmPrecommit(ConfirmPrecommit),
    #[prost(message, tag = "7")]
    Halt(Halt),
    #[prost(message, tag = "8")]
    Resume(Resume),
}

// ── Payloads ───────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct ProtoCoreParams {
    #[prost(bytes = "vec", tag = "1")]
    pub chain_id: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub epoch_length: u64,
    #[prost(uint64, tag = "3")]
    pub min_validators: u64,
    #[prost(uint64, tag = "4")]
    pub join_limit: u64,
    #[prost(uint64, tag = "5")]
    pub quorum_numerator: u64,
    #[prost(uint64, tag = "6")]
    pub quorum_denominator: u64,
    #[prost(uint64, tag = "7")]
    pub height: u64,
    #[prost(bytes = "vec", tag = "8")]
    pub parent: Vec<u8>,
    #[prost(uint64, tag = "9")]
    pub gas_target: u64,
    #[prost(uint64, tag = "10")]
    pub dynasty: u64,
    #[prost(uint64, tag = "11")]
    pub accumulated_gas: u64,
    #[prost(bytes = "vec", tag = "12")]
    pub source: Vec<u8>,
    #[prost(uint64, tag = "13")]
    pub source_block_height: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct ProtoCheckpoint {
    #[prost(uint64, tag = "1")]
    pub height: u64,
    #[prost(bytes = "vec", tag = "2")]
    pub parent: Vec<u8>,
    #[prost(uint64, tag = "3")]
    pub gas_target: u64,
    #[prost(uint64, tag = "4")]
    pub dynasty: u64,
    #[prost(uint64, tag = "5")]
    pub accumulated_gas: u64,
    #[prost(bytes = "vec", tag = "6")]
    pub source: Vec<u8>,
    #[prost(uint64, tag = "7")]
    pub source_block_height: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct Setup {
    #[prost(message, optional, tag = "1")]
    pub params: Option<ProtoCoreParams>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Join {
    #[prost(bytes = "vec", tag = "1")]
    pub validator: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub reputation: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct Logout {
    #[prost(bytes = "vec", tag = "1")]
    pub validator: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Propose {
    #[prost(message, optional, tag = "1")]
    pub checkpoint: Option<ProtoCheckpoint>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Vote {
    #[prost(bytes = "vec", tag = "1")]
    pub validator: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub checkpoint: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ConfirmPrecommit {
    #[prost(bytes = "vec", tag = "1")]
    pub kernel_hash: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Halt {}

#[derive(Clone, PartialEq, Message)]
pub struct Resume {}
