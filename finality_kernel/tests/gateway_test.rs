//! Kernel Gateway: one-time setup, append-only message store, activation.

use finality_kernel::hashing::kernel_message_key;
use finality_kernel::{Address, Authority, GatewayError, Kernel, KernelGateway, H256};

fn consensus() -> Authority {
    Authority::new(Address::from_low_u64(0xc0))
}

fn chain() -> Address {
    Address::from_low_u64(0xa11ce)
}

fn co_gateway() -> Address {
    Address::from_low_u64(0xc0ffee)
}

fn ready_gateway() -> KernelGateway {
    let mut gw = KernelGateway::new();
    gw.setup(consensus(), chain(), co_gateway()).unwrap();
    gw
}

fn kernel_at(height: u64) -> Kernel {
    Kernel::new(
        height,
        H256::from_low_u64(height - 1),
        vec![Address::from_low_u64(7)],
        vec![3],
        1_000_000,
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

#[test]
fn setup_binds_chain_and_consensus() {
    let gw = ready_gateway();
    assert!(gw.is_setup());
    assert_eq!(gw.chain_id(), chain());
    assert_eq!(gw.kernel_co_gateway(), co_gateway());
    assert_eq!(gw.consensus(), Some(consensus()));
    assert_eq!(gw.nonce(), 0);
    assert_eq!(gw.message_count(), 0);
}

#[test]
fn setup_rejects_zero_chain_id() {
    let mut gw = KernelGateway::new();
    let err = gw.setup(consensus(), Address::ZERO, co_gateway()).unwrap_err();
    assert_eq!(err, GatewayError::ZeroChainId);
    assert_eq!(err.to_string(), "Chain id is 0.");
    assert!(!gw.is_setup());
}

#[test]
fn setup_rejects_zero_co_gateway() {
    let mut gw = KernelGateway::new();
    let err = gw.setup(consensus(), chain(), Address::ZERO).unwrap_err();
    assert_eq!(err.to_string(), "KernelCoGateway address is 0.");
    assert!(!gw.is_setup());
}

#[test]
fn setup_is_one_shot() {
    let mut gw = ready_gateway();
    let other = Authority::new(Address::from_low_u64(0xbad));
    let err = gw
        .setup(other, Address::from_low_u64(2), Address::from_low_u64(3))
        .unwrap_err();
    assert_eq!(err.to_string(), "Kernel gateway is already setup.");
    assert_eq!(gw.consensus(), Some(consensus()));
    assert_eq!(gw.chain_id(), chain());
}

#[test]
fn unset_gateway_refuses_everything() {
    let mut gw = KernelGateway::new();
    let key = H256::from_low_u64(1);
    assert_eq!(
        gw.confirm_kernel(&consensus(), key, H256::from_low_u64(2)),
        Err(GatewayError::NotSetup)
    );
    assert_eq!(gw.next_message_key(&H256::from_low_u64(2)), Err(GatewayError::NotSetup));
    assert_eq!(gw.chain_id(), Address::ZERO);
    assert_eq!(gw.consensus(), None);
}

// ---------------------------------------------------------------------------
// Message store
// ---------------------------------------------------------------------------

#[test]
fn lookup_of_unknown_key_is_zero() {
    let gw = ready_gateway();
    let key = H256::from_low_u64(99);
    assert_eq!(gw.kernel_messages(&key), H256::ZERO);
    assert_eq!(gw.kernel_message(&key), None);
}

#[test]
fn confirmed_kernel_is_readable() {
    let mut gw = ready_gateway();
    let key = H256::from_low_u64(1);
    let hash = H256::from_low_u64(2);
    gw.confirm_kernel(&consensus(), key, hash).unwrap();
    assert_eq!(gw.kernel_messages(&key), hash);
    assert_eq!(gw.nonce(), 1);
    assert_eq!(gw.message_count(), 1);
}

#[test]
fn written_key_is_never_overwritten() {
    let mut gw = ready_gateway();
    let key = H256::from_low_u64(1);
    let first = H256::from_low_u64(2);
    gw.confirm_kernel(&consensus(), key, first).unwrap();

    let err = gw
        .confirm_kernel(&consensus(), key, H256::from_low_u64(3))
        .unwrap_err();
    assert_eq!(
        err,
        GatewayError::MessageExists {
            key,
            existing: first
        }
    );
    assert_eq!(gw.kernel_messages(&key), first);
    assert_eq!(gw.nonce(), 1);
}

#[test]
fn confirm_rejects_zero_inputs() {
    let mut gw = ready_gateway();
    assert_eq!(
        gw.confirm_kernel(&consensus(), H256::ZERO, H256::from_low_u64(1)),
        Err(GatewayError::ZeroMessageKey)
    );
    assert_eq!(
        gw.confirm_kernel(&consensus(), H256::from_low_u64(1), H256::ZERO),
        Err(GatewayError::ZeroKernelHash)
    );
    assert_eq!(gw.message_count(), 0);
}

#[test]
fn only_consensus_may_confirm() {
    let mut gw = ready_gateway();
    let intruder = Authority::new(Address::from_low_u64(0xbad));
    let err = gw
        .confirm_kernel(&intruder, H256::from_low_u64(1), H256::from_low_u64(2))
        .unwrap_err();
    assert_eq!(err, GatewayError::Unauthorized(intruder.address()));
    assert_eq!(gw.message_count(), 0);
}

#[test]
fn message_key_binds_chain_and_nonce() {
    let mut gw = ready_gateway();
    let hash = H256::from_low_u64(2);
    let key0 = gw.next_message_key(&hash).unwrap();
    assert_eq!(key0, kernel_message_key(&chain(), &hash, 0));

    gw.confirm_kernel(&consensus(), key0, hash).unwrap();
    let key1 = gw.next_message_key(&hash).unwrap();
    assert_eq!(key1, kernel_message_key(&chain(), &hash, 1));
    assert_ne!(key0, key1);
}

// ---------------------------------------------------------------------------
// Activation
// ---------------------------------------------------------------------------

#[test]
fn activation_requires_matching_confirmed_kernel() {
    let mut gw = ready_gateway();
    let kernel = kernel_at(1010);
    let key = gw.next_message_key(&kernel.hash()).unwrap();

    assert_eq!(
        gw.activate_kernel(&consensus(), key, &kernel),
        Err(GatewayError::MessageNotFound(key))
    );

    gw.confirm_kernel(&consensus(), key, kernel.hash()).unwrap();
    let impostor = kernel_at(1020);
    assert!(matches!(
        gw.activate_kernel(&consensus(), key, &impostor),
        Err(GatewayError::KernelHashMismatch { .. })
    ));

    gw.activate_kernel(&consensus(), key, &kernel).unwrap();
    assert_eq!(gw.latest_kernel_height(), 1010);
    assert_eq!(gw.latest_gas_target(), 1_000_000);
}

#[test]
fn activation_height_strictly_increases() {
    let mut gw = ready_gateway();
    let newer = kernel_at(1020);
    let newer_key = gw.next_message_key(&newer.hash()).unwrap();
    gw.confirm_kernel(&consensus(), newer_key, newer.hash()).unwrap();
    gw.activate_kernel(&consensus(), newer_key, &newer).unwrap();

    let older = kernel_at(1010);
    let older_key = gw.next_message_key(&older.hash()).unwrap();
    gw.confirm_kernel(&consensus(), older_key, older.hash()).unwrap();
    assert_eq!(
        gw.activate_kernel(&consensus(), older_key, &older),
        Err(GatewayError::StaleKernelHeight {
            latest: 1020,
            got: 1010
        })
    );
    assert_eq!(
        gw.activate_kernel(&consensus(), newer_key, &newer),
        Err(GatewayError::StaleKernelHeight {
            latest: 1020,
            got: 1020
        })
    );
}
