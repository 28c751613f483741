//! Integration tests for finality_runtime.
//!
//! All tests use temporary directories for isolation.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use finality_kernel::hashing::{checkpoint_hash, state_hash};
use finality_kernel::{
    Address, Authority, Checkpoint, CoreError, CoreOperation, CoreParams, CoreStatus,
    OperationEnvelope, Outcome, QuorumRatio, H256,
};
use finality_runtime::operation_log::{read_log, OperationLog};
use finality_runtime::replay;
use finality_runtime::snapshot;
use finality_runtime::{RelaySession, RuntimeConfig, RuntimeError, SharedRelaySession};

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir()
        .join("finality_runtime_tests")
        .join(name);
    if dir.exists() {
        fs::remove_dir_all(&dir).ok();
    }
    fs::create_dir_all(&dir).expect("Failed to create temp dir");
    dir
}

fn consensus() -> Authority {
    Authority::new(Address::from_low_u64(0xc0))
}

fn validator(i: u64) -> Address {
    Address::from_low_u64(0x100 + i)
}

fn config(dir: &PathBuf, session: &str, snapshot_interval: u64) -> RuntimeConfig {
    RuntimeConfig {
        data_dir: dir.clone(),
        session_id: session.to_string(),
        snapshot_interval,
        consensus: consensus().address(),
    }
}

fn params() -> CoreParams {
    CoreParams {
        chain_id: Address::from_low_u64(0xa11ce),
        epoch_length: 10,
        min_validators: 4,
        join_limit: 10,
        quorum: QuorumRatio::default(),
        height: 1000,
        parent: H256::from_low_u64(0xfeed),
        gas_target: 8_000_000,
        dynasty: 0,
        accumulated_gas: 0,
        source: H256::from_low_u64(0x5),
        source_block_height: 50,
    }
}

fn epoch_checkpoint() -> Checkpoint {
    Checkpoint {
        height: 1010,
        parent: H256::from_low_u64(0xfeed),
        gas_target: 8_000_000,
        dynasty: 4,
        accumulated_gas: 0,
        source: H256::from_low_u64(0x6),
        source_block_height: 60,
    }
}

fn epoch_checkpoint_hash() -> H256 {
    checkpoint_hash(&params().chain_id, &epoch_checkpoint())
}

/// Setup, four genesis joins, one proposal and two votes. Under 2/3 of a
/// weight-4 committee the quorum is 2, so the second vote precommits.
fn epoch_envelopes() -> Vec<OperationEnvelope> {
    let mut ops = vec![CoreOperation::Setup { params: params() }];
    for i in 1..=4 {
        ops.push(CoreOperation::Join {
            validator: validator(i),
            reputation: 1,
        });
    }
    let cp_hash = epoch_checkpoint_hash();
    ops.push(CoreOperation::Propose {
        checkpoint: epoch_checkpoint(),
    });
    for i in 1..=2 {
        ops.push(CoreOperation::Vote {
            validator: validator(i),
            checkpoint: cp_hash,
        });
    }
    ops.into_iter()
        .enumerate()
        .map(|(i, op)| OperationEnvelope::new(i as u64 + 1, consensus(), op))
        .collect()
}

// ─────────────────────────────────────────────────────────────
// Operation log
// ─────────────────────────────────────────────────────────────

#[test]
fn log_round_trip_replays_identically() {
    let dir = temp_dir("log_round_trip");
    let envelopes = epoch_envelopes();
    let log_path = dir.join("ops.log");
    {
        let mut log = OperationLog::open(&log_path).expect("open log");
        for env in &envelopes {
            log.append(env).expect("append");
        }
    }

    let log = OperationLog::open(&log_path).expect("reopen log");
    assert_eq!(log.last_sequence(), envelopes.len() as u64);
    let loaded = log.load_all().expect("load");
    assert_eq!(loaded, envelopes);

    let direct = replay::rebuild_hash(consensus(), &envelopes).unwrap();
    let from_log = replay::verify_determinism(consensus(), &loaded).unwrap();
    assert_eq!(direct, from_log);

    let (core, _) = replay::rebuild_core(consensus(), &loaded).unwrap();
    assert_eq!(core.status(), CoreStatus::Precommitted);
}

#[test]
fn log_rejects_sequence_gap() {
    let dir = temp_dir("log_gap");
    let mut log = OperationLog::open(&dir.join("ops.log")).unwrap();
    let env = OperationEnvelope::new(2, consensus(), CoreOperation::Halt);
    let err = log.append(&env).unwrap_err();
    assert!(matches!(err, RuntimeError::LogSequence { expected: 1, got: 2 }));
    assert_eq!(log.last_sequence(), 0);
}

#[test]
fn corrupted_log_detected() {
    let dir = temp_dir("corrupted_log");
    let log_path = dir.join("ops.log");
    {
        let mut log = OperationLog::open(&log_path).unwrap();
        for env in &epoch_envelopes()[..3] {
            log.append(env).unwrap();
        }
    }

    // Oversized length prefix.
    let mut file = OpenOptions::new().append(true).open(&log_path).unwrap();
    file.write_all(&u32::MAX.to_le_bytes()).unwrap();
    drop(file);
    assert!(matches!(read_log(&log_path), Err(RuntimeError::FrameLength(_))));

    // Truncated frame.
    let bytes = fs::read(&log_path).unwrap();
    let mut truncated = bytes[..bytes.len() - 4].to_vec();
    truncated.extend_from_slice(&100u32.to_le_bytes());
    truncated.extend_from_slice(&[0u8; 10]);
    fs::write(&log_path, &truncated).unwrap();
    assert!(matches!(read_log(&log_path), Err(RuntimeError::TruncatedFrame(_))));
}

#[test]
fn zero_length_frame_rejected() {
    let dir = temp_dir("zero_frame");
    let log_path = dir.join("ops.log");
    fs::write(&log_path, 0u32.to_le_bytes()).unwrap();
    assert!(matches!(read_log(&log_path), Err(RuntimeError::FrameLength(0))));
}

// ─────────────────────────────────────────────────────────────
// Snapshots
// ─────────────────────────────────────────────────────────────

#[test]
fn snapshot_replay_parity() {
    let dir = temp_dir("snapshot_parity");
    let envelopes = epoch_envelopes();
    let (core, hash) = replay::rebuild_core(consensus(), &envelopes[..6]).unwrap();

    let snap_dir = dir.join("snapshots");
    snapshot::save_snapshot(&snap_dir, 6, core.state()).unwrap();
    let snap = snapshot::load_latest_snapshot(&snap_dir).unwrap().unwrap();
    assert_eq!(snap.sequence, 6);
    assert_eq!(snap.hash, hash);
    assert!(snapshot::verify_snapshot_hash(&snap));

    let mut restored = snapshot::restore_core(&snap).unwrap();
    assert_eq!(restored.last_sequence(), 6);
    restored.apply_sequence(&envelopes[6..]).unwrap();

    let full = replay::rebuild_hash(consensus(), &envelopes).unwrap();
    let resumed = state_hash(restored.state()).unwrap();
    assert_eq!(full, resumed);
}

#[test]
fn latest_snapshot_wins() {
    let dir = temp_dir("latest_snapshot");
    let envelopes = epoch_envelopes();
    for upto in [2usize, 5, 3] {
        let (core, _) = replay::rebuild_core(consensus(), &envelopes[..upto]).unwrap();
        snapshot::save_snapshot(&dir, upto as u64, core.state()).unwrap();
    }
    let snap = snapshot::load_latest_snapshot(&dir).unwrap().unwrap();
    assert_eq!(snap.sequence, 5);
    assert!(snapshot::load_snapshot(&dir, 4).unwrap().is_none());
}

#[test]
fn tampered_snapshot_refused() {
    let dir = temp_dir("tampered_snapshot");
    let (core, _) = replay::rebuild_core(consensus(), &epoch_envelopes()).unwrap();
    snapshot::save_snapshot(&dir, 8, core.state()).unwrap();

    let mut snap = snapshot::load_snapshot(&dir, 8).unwrap().unwrap();
    snap.canonical_json = snap.canonical_json.replace("\"dynasty\":4", "\"dynasty\":5");
    assert!(!snapshot::verify_snapshot_hash(&snap));
    assert!(matches!(
        snapshot::restore_core(&snap),
        Err(RuntimeError::SnapshotHash { .. })
    ));
}

// ─────────────────────────────────────────────────────────────
// Relay sessions
// ─────────────────────────────────────────────────────────────

#[test]
fn relay_closes_the_epoch() {
    let dir = temp_dir("relay_epoch");
    let mut session = RelaySession::open(&config(&dir, "s", 0)).unwrap();
    session
        .setup_gateway(Address::from_low_u64(0xa11ce), Address::from_low_u64(0xc0ffee))
        .unwrap();

    let mut last = None;
    for env in &epoch_envelopes() {
        last = Some(session.apply_envelope(env).unwrap());
    }
    let kernel = match last {
        Some(Outcome::Precommitted { kernel, .. }) => kernel,
        other => panic!("expected precommit, got {:?}", other),
    };

    let key = session.relay_precommit().unwrap();
    assert_eq!(session.gateway().kernel_messages(&key), kernel.hash());
    assert_eq!(session.gateway().latest_kernel_height(), 1010);
    assert_eq!(session.core().status(), CoreStatus::Opened);
    assert_eq!(session.core().parent(), epoch_checkpoint_hash());
    assert_eq!(session.current_sequence(), 9);

    assert!(matches!(
        session.relay_precommit(),
        Err(RuntimeError::NothingToRelay)
    ));
}

#[test]
fn relay_without_gateway_setup_fails_cleanly() {
    let dir = temp_dir("relay_no_gateway");
    let mut session = RelaySession::open(&config(&dir, "s", 0)).unwrap();
    for env in &epoch_envelopes() {
        session.apply_envelope(env).unwrap();
    }
    assert!(matches!(
        session.relay_precommit(),
        Err(RuntimeError::Gateway(_))
    ));
    assert!(session.core().is_precommitted());
    assert_eq!(session.current_sequence(), 8);
}

/// Swap the log file for a directory so the next append fails.
fn break_log(path: &PathBuf) -> Vec<u8> {
    let bytes = fs::read(path).unwrap();
    fs::remove_file(path).unwrap();
    fs::create_dir(path).unwrap();
    bytes
}

fn restore_log(path: &PathBuf, bytes: &[u8]) {
    fs::remove_dir(path).unwrap();
    fs::write(path, bytes).unwrap();
}

#[test]
fn failed_append_leaves_core_untouched() {
    let dir = temp_dir("failed_append");
    let mut session = RelaySession::open(&config(&dir, "s", 0)).unwrap();
    session
        .submit(consensus(), CoreOperation::Setup { params: params() })
        .unwrap();
    let hash_before = session.current_hash().unwrap();

    let log_path = dir.join("s").join("ops.log");
    let bytes = break_log(&log_path);
    let err = session
        .submit(
            consensus(),
            CoreOperation::Join {
                validator: validator(1),
                reputation: 1,
            },
        )
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Io(_)));
    assert_eq!(session.current_sequence(), 1);
    assert_eq!(session.core().validators().count(), 0);
    assert_eq!(session.current_hash().unwrap(), hash_before);

    restore_log(&log_path, &bytes);
    session
        .submit(
            consensus(),
            CoreOperation::Join {
                validator: validator(1),
                reputation: 1,
            },
        )
        .unwrap();
    assert_eq!(session.current_sequence(), 2);
    assert_eq!(read_log(&log_path).unwrap().len(), 2);

    let mut reopened = RelaySession::open(&config(&dir, "s", 0)).unwrap();
    assert_eq!(
        reopened.replay_full().unwrap(),
        session.current_hash().unwrap()
    );
}

#[test]
fn failed_relay_leaves_gateway_and_core_untouched() {
    let dir = temp_dir("failed_relay");
    let mut session = RelaySession::open(&config(&dir, "s", 0)).unwrap();
    session
        .setup_gateway(Address::from_low_u64(0xa11ce), Address::from_low_u64(0xc0ffee))
        .unwrap();
    for env in &epoch_envelopes() {
        session.apply_envelope(env).unwrap();
    }

    let log_path = dir.join("s").join("ops.log");
    let bytes = break_log(&log_path);
    let err = session.relay_precommit().unwrap_err();
    assert!(matches!(err, RuntimeError::Io(_)));
    assert!(session.core().is_precommitted());
    assert_eq!(session.current_sequence(), 8);
    assert_eq!(session.gateway().nonce(), 0);
    assert_eq!(session.gateway().message_count(), 0);
    assert_eq!(session.gateway().latest_kernel_height(), 0);

    restore_log(&log_path, &bytes);
    let key = session.relay_precommit().unwrap();
    assert_eq!(session.gateway().nonce(), 1);
    assert_eq!(
        session.gateway().kernel_messages(&key),
        session.core().latest_kernel_hash()
    );
    assert_eq!(session.core().status(), CoreStatus::Opened);
    assert_eq!(session.current_sequence(), 9);
}

#[test]
fn rejected_operations_are_not_persisted() {
    let dir = temp_dir("rejected_not_persisted");
    let mut session = RelaySession::open(&config(&dir, "s", 0)).unwrap();
    session
        .submit(consensus(), CoreOperation::Setup { params: params() })
        .unwrap();
    let err = session
        .submit(consensus(), CoreOperation::Setup { params: params() })
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Core(CoreError::AlreadySetup)));

    let logged = read_log(&dir.join("s").join("ops.log")).unwrap();
    assert_eq!(logged.len(), 1);
}

#[test]
fn protocol_violation_is_persisted_and_survives_reopen() {
    let dir = temp_dir("violation_persisted");
    let cfg = config(&dir, "s", 0);
    {
        let mut session = RelaySession::open(&cfg).unwrap();
        for env in &epoch_envelopes()[..6] {
            session.apply_envelope(env).unwrap();
        }
        let err = session
            .submit(
                consensus(),
                CoreOperation::Vote {
                    validator: validator(99),
                    checkpoint: epoch_checkpoint_hash(),
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Core(CoreError::ProtocolViolation(_))
        ));
        assert!(session.core().is_corrupted());
    }

    let reopened = RelaySession::open(&cfg).unwrap();
    assert!(reopened.core().is_corrupted());
    assert_eq!(reopened.current_sequence(), 7);
}

#[test]
fn reopen_resumes_from_snapshot_and_log_tail() {
    let dir = temp_dir("reopen_snapshot");
    let cfg = config(&dir, "s", 4);
    let envelopes = epoch_envelopes();
    let hash = {
        let mut session = RelaySession::open(&cfg).unwrap();
        for env in &envelopes {
            session.apply_envelope(env).unwrap();
        }
        assert!(session.snapshot_dir().join("snapshot_000008.json").exists());
        session.current_hash().unwrap()
    };

    let mut reopened = RelaySession::open(&cfg).unwrap();
    assert_eq!(reopened.current_sequence(), 8);
    assert_eq!(reopened.current_hash().unwrap(), hash);
    assert_eq!(reopened.replay_full().unwrap(), hash);
}

#[test]
fn corrupt_snapshot_falls_back_to_full_replay() {
    let dir = temp_dir("corrupt_snapshot_fallback");
    let cfg = config(&dir, "s", 4);
    let hash = {
        let mut session = RelaySession::open(&cfg).unwrap();
        for env in &epoch_envelopes() {
            session.apply_envelope(env).unwrap();
        }
        session.current_hash().unwrap()
    };
    let snap_path = dir.join("s").join("snapshots").join("snapshot_000008.json");
    let content = fs::read_to_string(&snap_path).unwrap();
    // canonical_json is embedded as an escaped string
    let tampered = content.replace(r#"\"dynasty\":4"#, r#"\"dynasty\":5"#);
    assert_ne!(tampered, content);
    fs::write(&snap_path, tampered).unwrap();

    let reopened = RelaySession::open(&cfg).unwrap();
    assert_eq!(reopened.current_hash().unwrap(), hash);
}

#[test]
fn sessions_are_isolated() {
    let dir = temp_dir("isolated_sessions");
    let envelopes = epoch_envelopes();
    let mut a = RelaySession::open(&config(&dir, "a", 0)).unwrap();
    let mut b = RelaySession::open(&config(&dir, "b", 0)).unwrap();
    for env in &envelopes {
        a.apply_envelope(env).unwrap();
    }
    for env in &envelopes[..5] {
        b.apply_envelope(env).unwrap();
    }
    assert_ne!(a.current_hash().unwrap(), b.current_hash().unwrap());
    assert_eq!(a.current_sequence(), 8);
    assert_eq!(b.current_sequence(), 5);
    assert!(b.core().is_opened());
}

#[test]
fn shared_session_serializes_submissions() {
    let dir = temp_dir("shared_session");
    let shared = SharedRelaySession::new(RelaySession::open(&config(&dir, "s", 0)).unwrap());
    shared
        .submit(consensus(), CoreOperation::Setup { params: params() })
        .unwrap();

    std::thread::scope(|scope| {
        for i in 1..=4 {
            let shared = &shared;
            scope.spawn(move || {
                shared
                    .submit(
                        consensus(),
                        CoreOperation::Join {
                            validator: validator(i),
                            reputation: 1,
                        },
                    )
                    .unwrap();
            });
        }
    });

    assert_eq!(shared.current_sequence().unwrap(), 5);
    let logged = read_log(&dir.join("s").join("ops.log")).unwrap();
    let sequences: Vec<u64> = logged.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4, 5]);
}

#[test]
fn schema_version_rejected() {
    let dir = temp_dir("schema_rejection");
    let mut session = RelaySession::open(&config(&dir, "s", 0)).unwrap();
    let mut env = OperationEnvelope::new(1, consensus(), CoreOperation::Setup { params: params() });
    env.schema_version = 2;
    assert!(matches!(
        session.apply_envelope(&env),
        Err(RuntimeError::Core(CoreError::SchemaVersion { expected: 1, got: 2 }))
    ));
    assert_eq!(session.current_sequence(), 0);
}
