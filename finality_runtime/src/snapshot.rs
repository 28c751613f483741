//! Snapshot layer: deterministic Core snapshots.
//!
//! A snapshot holds the canonical JSON of `CoreState`, its hash and the
//! protocol version. No timestamps in snapshot content.
//!
//! A snapshot whose hash does not verify is never restored; the caller
//! falls back to full replay.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use finality_kernel::hashing::{hash_bytes, state_hash};
use finality_kernel::{Core, CoreState, H256, PROTOCOL_VERSION};

use crate::error::{RuntimeError, RuntimeResult};

/// On-disk format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Snapshot {
    /// Last applied sequence when taken.
    pub sequence: u64,
    pub canonical_json: String,
    /// SHA-256 of `canonical_json`.
    pub hash: H256,
    pub protocol_version: u32,
}

fn snapshot_path(dir: &Path, sequence: u64) -> PathBuf {
    dir.join(format!("snapshot_{:06}.json", sequence))
}

/// Write a snapshot of `state` taken at `sequence`.
pub fn save_snapshot(dir: &Path, sequence: u64, state: &CoreState) -> RuntimeResult<PathBuf> {
    fs::create_dir_all(dir)?;

    let snap = Snapshot {
        sequence,
        canonical_json: serde_json::to_string(state)?,
        hash: state_hash(state)?,
        protocol_version: PROTOCOL_VERSION,
    };

    let path = snapshot_path(dir, sequence);
    let content = serde_json::to_string(&snap)?;
    let mut file = File::create(&path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;

    Ok(path)
}

/// Load the snapshot taken at `sequence`, if any.
pub fn load_snapshot(dir: &Path, sequence: u64) -> RuntimeResult<Option<Snapshot>> {
    let path = snapshot_path(dir, sequence);
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

/// Load the highest-sequence snapshot in `dir`.
pub fn load_latest_snapshot(dir: &Path) -> RuntimeResult<Option<Snapshot>> {
    match latest_sequence(dir)? {
        Some(seq) => load_snapshot(dir, seq),
        None => Ok(None),
    }
}

fn latest_sequence(dir: &Path) -> RuntimeResult<Option<u64>> {
    if !dir.exists() {
        return Ok(None);
    }
    let mut best: Option<u64> = None;
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        let seq = name
            .to_string_lossy()
            .strip_prefix("snapshot_")
            .and_then(|s| s.strip_suffix(".json"))
            .and_then(|s| s.parse::<u64>().ok());
        if let Some(seq) = seq {
            best = Some(best.map_or(seq, |b| b.max(seq)));
        }
    }
    Ok(best)
}

/// True if the stored hash matches the canonical JSON.
pub fn verify_snapshot_hash(snap: &Snapshot) -> bool {
    hash_bytes(snap.canonical_json.as_bytes()) == snap.hash
}

/// Decode, verify and validate a snapshot into a live Core.
pub fn restore_core(snap: &Snapshot) -> RuntimeResult<Core> {
    if snap.protocol_version != PROTOCOL_VERSION {
        return Err(RuntimeError::SnapshotVersion {
            expected: PROTOCOL_VERSION,
            got: snap.protocol_version,
        });
    }
    let computed = hash_bytes(snap.canonical_json.as_bytes());
    if computed != snap.hash {
        return Err(RuntimeError::SnapshotHash {
            stored: snap.hash,
            computed,
        });
    }
    let state: CoreState = serde_json::from_str(&snap.canonical_json)?;
    Ok(Core::from_state(state, snap.sequence)?)
}
