//! Relay session: a persisted Core paired with its companion-chain gateway.
//!
//! Each session gets its own directory with an operation log and snapshots.
//! Concurrency: Mutex for write serialization, no global mutable state.
//!
//! Apply-before-persist order:
//!   1. apply the envelope to a copy of the Core, may be rejected
//!   2. log.append(envelope), only if step 1 committed
//!   3. swap the copy in; the log append is the commit point
//!   4. snapshot if interval reached
//!
//! A failed append leaves the live Core untouched. A failed snapshot is
//! only warned about: the log already holds the operation and a missing
//! snapshot is recovered by replay.
//!
//! Gateway state is in-memory only; it stands in for the remote chain.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{info, warn};

use finality_kernel::hashing::state_hash;
use finality_kernel::{
    Address, Authority, Core, CoreError, CoreOperation, CoreState, KernelGateway,
    OperationEnvelope, Outcome, H256,
};

use crate::config::RuntimeConfig;
use crate::error::{RuntimeError, RuntimeResult};
use crate::operation_log::OperationLog;
use crate::replay;
use crate::snapshot;

pub struct RelaySession {
    session_id: String,
    dir: PathBuf,
    consensus: Authority,
    core: Core,
    gateway: KernelGateway,
    log: OperationLog,
    snapshot_interval: u64,
}

impl RelaySession {
    /// Open or resume a session.
    ///
    /// Directory structure:
    ///   <data_dir>/<session_id>/ops.log
    ///   <data_dir>/<session_id>/snapshots/
    ///
    /// The latest verifying snapshot seeds the Core and the log tail is
    /// replayed on top. An unusable snapshot falls back to full replay.
    pub fn open(config: &RuntimeConfig) -> RuntimeResult<Self> {
        let dir = config.session_dir();
        let log = OperationLog::open(&dir.join("ops.log"))?;
        let consensus = Authority::new(config.consensus);
        let envelopes = log.load_all()?;

        let core = match restore_from_snapshot(&dir.join("snapshots"), &envelopes)? {
            Some(core) => core,
            None => replay::rebuild_core(consensus, &envelopes)?.0,
        };

        info!(
            session = %config.session_id,
            sequence = core.last_sequence(),
            status = %core.status(),
            "Relay session opened"
        );

        Ok(Self {
            session_id: config.session_id.clone(),
            dir,
            consensus,
            core,
            gateway: KernelGateway::new(),
            log,
            snapshot_interval: config.snapshot_interval,
        })
    }

    /// Wrap `operation` in the next envelope and apply it.
    pub fn submit(&mut self, caller: Authority, operation: CoreOperation) -> RuntimeResult<Outcome> {
        let envelope = OperationEnvelope::new(self.core.last_sequence() + 1, caller, operation);
        self.apply_envelope(&envelope)
    }

    /// Apply, then persist what the Core committed.
    ///
    /// A protocol violation is committed and logged before it is returned.
    pub fn apply_envelope(&mut self, envelope: &OperationEnvelope) -> RuntimeResult<Outcome> {
        let mut next = self.core.clone();
        match next.apply_envelope(envelope) {
            Ok(outcome) => {
                self.persist(envelope, next)?;
                Ok(outcome)
            }
            Err(CoreError::ProtocolViolation(fault)) => {
                self.persist(envelope, next)?;
                Err(CoreError::ProtocolViolation(fault).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn persist(&mut self, envelope: &OperationEnvelope, next: Core) -> RuntimeResult<()> {
        self.log.append(envelope)?;
        self.core = next;
        if self.snapshot_interval > 0 && envelope.sequence % self.snapshot_interval == 0 {
            if let Err(e) =
                snapshot::save_snapshot(&self.snapshot_dir(), envelope.sequence, self.core.state())
            {
                warn!(sequence = envelope.sequence, error = %e, "Snapshot not written");
            }
        }
        Ok(())
    }

    /// Bind the companion-chain gateway to this session's consensus.
    pub fn setup_gateway(&mut self, chain_id: Address, kernel_co_gateway: Address) -> RuntimeResult<()> {
        self.gateway
            .setup(self.consensus, chain_id, kernel_co_gateway)?;
        Ok(())
    }

    /// Carry the precommitted kernel across and close the epoch.
    ///
    /// confirm on the gateway, activate it there, then confirm the
    /// precommit on the Core. The gateway changes are staged on a copy and
    /// kept only once the Core has committed and logged the confirmation.
    /// Returns the gateway message key.
    pub fn relay_precommit(&mut self) -> RuntimeResult<H256> {
        if !self.core.is_precommitted() {
            return Err(RuntimeError::NothingToRelay);
        }
        let kernel = self
            .core
            .latest_kernel()
            .cloned()
            .ok_or(RuntimeError::NothingToRelay)?;

        let mut gateway = self.gateway.clone();
        let key = gateway.next_message_key(&kernel.hash())?;
        gateway.confirm_kernel(&self.consensus, key, kernel.hash())?;
        gateway.activate_kernel(&self.consensus, key, &kernel)?;
        self.submit(
            self.consensus,
            CoreOperation::ConfirmPrecommit {
                kernel_hash: kernel.hash(),
            },
        )?;
        self.gateway = gateway;

        info!(%key, kernel_hash = %kernel.hash(), height = kernel.height(), "Kernel relayed");
        Ok(key)
    }

    /// Rebuild the Core from the full log, discarding in-memory state.
    pub fn replay_full(&mut self) -> RuntimeResult<H256> {
        let envelopes = self.log.load_all()?;
        let (core, hash) = replay::rebuild_core(self.consensus, &envelopes)?;
        self.core = core;
        Ok(hash)
    }

    pub fn core(&self) -> &Core {
        &self.core
    }

    pub fn state(&self) -> &CoreState {
        self.core.state()
    }

    pub fn gateway(&self) -> &KernelGateway {
        &self.gateway
    }

    pub fn current_hash(&self) -> RuntimeResult<H256> {
        Ok(state_hash(self.core.state())?)
    }

    pub fn current_sequence(&self) -> u64 {
        self.core.last_sequence()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn consensus(&self) -> Authority {
        self.consensus
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.dir.join("snapshots")
    }
}

/// Latest snapshot plus the log tail after it, or `None` when there is no
/// usable snapshot.
fn restore_from_snapshot(
    dir: &Path,
    envelopes: &[OperationEnvelope],
) -> RuntimeResult<Option<Core>> {
    let Some(snap) = snapshot::load_latest_snapshot(dir)? else {
        return Ok(None);
    };
    let logged = envelopes.last().map(|e| e.sequence).unwrap_or(0);
    if snap.sequence > logged {
        warn!(snapshot = snap.sequence, logged, "Snapshot ahead of log, replaying in full");
        return Ok(None);
    }
    let mut core = match snapshot::restore_core(&snap) {
        Ok(core) => core,
        Err(e) => {
            warn!(snapshot = snap.sequence, error = %e, "Snapshot unusable, replaying in full");
            return Ok(None);
        }
    };
    let tail: Vec<OperationEnvelope> = envelopes
        .iter()
        .filter(|e| e.sequence > snap.sequence)
        .cloned()
        .collect();
    core.apply_sequence(&tail)?;
    Ok(Some(core))
}

/// Thread-safe session handle.
pub struct SharedRelaySession {
    inner: Mutex<RelaySession>,
}

impl SharedRelaySession {
    pub fn new(session: RelaySession) -> Self {
        Self {
            inner: Mutex::new(session),
        }
    }

    fn lock(&self) -> RuntimeResult<MutexGuard<'_, RelaySession>> {
        self.inner.lock().map_err(|_| RuntimeError::LockPoisoned)
    }

    pub fn submit(&self, caller: Authority, operation: CoreOperation) -> RuntimeResult<Outcome> {
        self.lock()?.submit(caller, operation)
    }

    pub fn relay_precommit(&self) -> RuntimeResult<H256> {
        self.lock()?.relay_precommit()
    }

    pub fn current_hash(&self) -> RuntimeResult<H256> {
        self.lock()?.current_hash()
    }

    pub fn current_sequence(&self) -> RuntimeResult<u64> {
        Ok(self.lock()?.current_sequence())
    }
}
