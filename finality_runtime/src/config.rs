//! Runtime configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use finality_kernel::Address;

use crate::error::RuntimeResult;

/// Where a relay session keeps its log and snapshots, and who drives it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Root directory; each session lives in `<data_dir>/<session_id>`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_session_id")]
    pub session_id: String,

    /// Snapshot every N committed operations. 0 disables snapshots.
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval: u64,

    /// Consensus authority of the Core and the gateway.
    pub consensus: Address,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_session_id() -> String {
    "default".to_string()
}

fn default_snapshot_interval() -> u64 {
    100
}

impl RuntimeConfig {
    pub fn new(consensus: Address) -> Self {
        Self {
            data_dir: default_data_dir(),
            session_id: default_session_id(),
            snapshot_interval: default_snapshot_interval(),
            consensus,
        }
    }

    /// Read a JSON config file.
    pub fn load(path: &Path) -> RuntimeResult<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn session_dir(&self) -> PathBuf {
        self.data_dir.join(&self.session_id)
    }
}
