//! End-to-end relay scenarios: client signs a typed request, the dispatcher
//! validates and forwards it, the wallet re-verifies the embedded proof before
//! mutating state.

use alloy_primitives::{address, Address, Bytes, B256, U256};
use k256::ecdsa::SigningKey;

use zk_relay_wallet::{
    utils::{crypto::address_of_key, typed_data},
    wallet::KeccakBindingVerifier,
    ExecOutcome, ExecutePayload, BatchPayload, ChangeTxPolicyPayload, FeeTerms,
    ForwardError, ForwardRequest, GasMeter, Host, InMemoryHost, ItemOutcome,
    ProofWallet, RelayDispatcher, RelayDomain, SkipReason, WalletConfig,
};

const CHAIN_ID: u64 = 42161;
const NOW: u64 = 1_000_000;

const FORWARDER: Address = address!("00000000000000000000000000000000000000f0");
const WALLET: Address = address!("0000000000000000000000000000000000000b22");
const COLLECTOR: Address = address!("00000000000000000000000000000000000000cc");
const SINK: Address = address!("0000000000000000000000000000000000000c33");
const NOBODY: Address = address!("000000000000000000000000000000000000dead");

fn h0() -> B256 {
    B256::repeat_byte(0xa1)
}

fn r0() -> B256 {
    B256::repeat_byte(0xb2)
}

fn domain() -> RelayDomain {
    RelayDomain {
        name: "ZK Relay",
        version: "1",
        chain_id: CHAIN_ID,
        verifying_contract: FORWARDER,
    }
}

fn wallet() -> ProofWallet {
    let mut wallet = ProofWallet::new(WALLET);
    wallet
        .initialize(WalletConfig {
            tx_commitment: h0(),
            tx_verifier: Box::new(KeccakBindingVerifier),
            recovery_commitment: r0(),
            recovery_verifier: Box::new(KeccakBindingVerifier),
            fee_collector: COLLECTOR,
            trusted_forwarders: vec![FORWARDER],
        })
        .unwrap();
    wallet
}

fn host() -> InMemoryHost {
    let mut host = InMemoryHost::new(CHAIN_ID, NOW);
    host.register_callee(SINK, 2_000, |_| Ok(Vec::new()));
    host
}

fn tx_proof(nonce: u64, commitment: B256) -> Vec<u8> {
    KeccakBindingVerifier::prove(&[
        U256::from(nonce),
        U256::from_be_bytes(commitment.0),
        U256::from(CHAIN_ID),
    ])
}

fn change_proof(nonce: u64, commitment: B256, new_commitment: B256) -> Vec<u8> {
    KeccakBindingVerifier::prove(&[
        U256::from(nonce),
        U256::from_be_bytes(commitment.0),
        U256::from(CHAIN_ID),
        U256::from_be_bytes(new_commitment.0),
    ])
}

fn sign<P: typed_data::SignedPayload>(
    key: &SigningKey,
    request: &mut ForwardRequest<P>,
    ledger_nonce: U256,
) {
    let digest = typed_data::request_digest(&domain(), request, ledger_nonce);
    let (sig, recid) = key.sign_prehash_recoverable(digest.as_slice()).unwrap();
    request.signature[..64].copy_from_slice(&sig.to_bytes());
    request.signature[64] = 27 + recid.to_byte();
}

fn execute_request(
    key: &SigningKey,
    ledger_nonce: U256,
    proof: Vec<u8>,
    fee: FeeTerms,
) -> ForwardRequest<ExecutePayload> {
    let mut request = ForwardRequest {
        signer: address_of_key(key.verifying_key()),
        target: WALLET,
        deadline: NOW + 1_000,
        gas: 100_000,
        payload: ExecutePayload {
            proof: proof.into(),
            to: SINK,
            value: U256::ZERO,
            data: Bytes::from_static(b"ping"),
            fee,
        },
        signature: [0u8; 65],
    };
    sign(key, &mut request, ledger_nonce);
    request
}

fn key(seed: u8) -> SigningKey {
    SigningKey::from_slice(&[seed; 32]).unwrap()
}

#[test]
fn signed_execute_round_trip_and_replay_rejection() {
    let mut host = host();
    let mut wallet = wallet();
    let mut dispatcher = RelayDispatcher::new(domain());
    let key = key(0x11);
    let signer = address_of_key(key.verifying_key());

    let request = execute_request(&key, U256::ZERO, tx_proof(0, h0()), FeeTerms::free());

    let mut meter = GasMeter::new(1_000_000);
    let receipt = dispatcher
        .forward_execute(&mut host, &mut meter, &mut wallet, &request)
        .unwrap();
    assert_eq!(receipt.outcome, ExecOutcome::Success);
    assert_eq!(receipt.nonce, U256::ZERO);
    assert_eq!(receipt.signer, signer);
    assert_eq!(dispatcher.nonce(signer), U256::from(1u64));
    assert_eq!(wallet.local_nonce(), U256::from(1u64));
    assert_eq!(host.calls().len(), 1);

    // Resubmitting the identical signed request: the digest now embeds ledger
    // nonce 1, so signer-match fails and no second nonce is consumed.
    let mut meter = GasMeter::new(1_000_000);
    let err = dispatcher
        .forward_execute(&mut host, &mut meter, &mut wallet, &request)
        .unwrap_err();
    assert_eq!(err, ForwardError::SignerMismatch);
    assert_eq!(dispatcher.nonce(signer), U256::from(1u64));
    assert_eq!(wallet.local_nonce(), U256::from(1u64));
    assert_eq!(host.calls().len(), 1);
}

#[test]
fn relay_nonces_are_monotonic_across_dispatches() {
    let mut host = host();
    let mut wallet = wallet();
    let mut dispatcher = RelayDispatcher::new(domain());
    let key = key(0x12);
    let signer = address_of_key(key.verifying_key());

    for n in 0u64..4 {
        let request = execute_request(
            &key,
            U256::from(n),
            tx_proof(n, h0()),
            FeeTerms::free(),
        );
        let mut meter = GasMeter::new(1_000_000);
        let receipt = dispatcher
            .forward_execute(&mut host, &mut meter, &mut wallet, &request)
            .unwrap();
        assert_eq!(receipt.nonce, U256::from(n));
    }
    assert_eq!(dispatcher.nonce(signer), U256::from(4u64));
}

#[test]
fn policy_change_kills_earlier_proofs_forever() {
    let mut host = host();
    let mut wallet = wallet();
    let mut dispatcher = RelayDispatcher::new(domain());
    let key = key(0x13);

    // Execute with a proof valid at (localNonce=0, H0).
    let first_proof = tx_proof(0, h0());
    let request =
        execute_request(&key, U256::ZERO, first_proof.clone(), FeeTerms::free());
    let mut meter = GasMeter::new(1_000_000);
    let receipt = dispatcher
        .forward_execute(&mut host, &mut meter, &mut wallet, &request)
        .unwrap();
    assert_eq!(receipt.outcome, ExecOutcome::Success);
    assert_eq!(wallet.local_nonce(), U256::from(1u64));
    assert_eq!(wallet.tx_commitment(), h0());

    // Change the tx policy with a proof valid at (localNonce=1, H0, H1).
    let h1 = B256::repeat_byte(0x77);
    let mut change = ForwardRequest {
        signer: address_of_key(key.verifying_key()),
        target: WALLET,
        deadline: NOW + 1_000,
        gas: 100_000,
        payload: ChangeTxPolicyPayload {
            proof: change_proof(1, h0(), h1).into(),
            new_commitment: h1,
        },
        signature: [0u8; 65],
    };
    sign(&key, &mut change, U256::from(1u64));
    let mut meter = GasMeter::new(1_000_000);
    let receipt = dispatcher
        .forward_change_tx_policy(&mut host, &mut meter, &mut wallet, &change)
        .unwrap();
    assert_eq!(receipt.outcome, ExecOutcome::Success);
    assert_eq!(wallet.tx_commitment(), h1);
    assert_eq!(wallet.local_nonce(), U256::from(2u64));

    // The original proof can never be accepted again: both the local nonce and
    // the commitment have moved.
    let replay =
        execute_request(&key, U256::from(2u64), first_proof, FeeTerms::free());
    let mut meter = GasMeter::new(1_000_000);
    let receipt = dispatcher
        .forward_execute(&mut host, &mut meter, &mut wallet, &replay)
        .unwrap();
    assert_eq!(receipt.outcome, ExecOutcome::ProofInvalid);
    assert_eq!(wallet.local_nonce(), U256::from(2u64));
}

#[test]
fn batch_is_atomic_when_a_middle_entry_fails() {
    let mut host = host();
    let mut wallet = wallet();
    let mut dispatcher = RelayDispatcher::new(domain());
    let key = key(0x14);
    host.credit_native(WALLET, U256::from(100u64));

    let entries = |targets: Vec<Address>| BatchPayload {
        proof: tx_proof(0, h0()).into(),
        targets,
        values: vec![U256::from(30u64), U256::from(10u64), U256::from(20u64)],
        datas: vec![Bytes::new(), Bytes::new(), Bytes::new()],
        fee: FeeTerms::free(),
    };

    // Entry 2-of-3 targets an address with no callee: the whole batch unwinds.
    let mut request = ForwardRequest {
        signer: address_of_key(key.verifying_key()),
        target: WALLET,
        deadline: NOW + 1_000,
        gas: 200_000,
        payload: entries(vec![SINK, NOBODY, SINK]),
        signature: [0u8; 65],
    };
    sign(&key, &mut request, U256::ZERO);

    let mut meter = GasMeter::new(1_000_000);
    let receipt = dispatcher
        .forward_batch(&mut host, &mut meter, &mut wallet, &request)
        .unwrap();
    assert_eq!(receipt.outcome, ExecOutcome::CallFailed);
    // No partial application: balances exactly as before the batch.
    assert_eq!(host.native_balance(WALLET), U256::from(100u64));
    assert_eq!(host.native_balance(SINK), U256::ZERO);
    // Consume-always: the proof for local nonce 0 is spent regardless.
    assert_eq!(wallet.local_nonce(), U256::from(1u64));

    // The same batch against valid targets at the next nonce applies fully.
    let mut request = ForwardRequest {
        signer: address_of_key(key.verifying_key()),
        target: WALLET,
        deadline: NOW + 1_000,
        gas: 200_000,
        payload: BatchPayload {
            proof: tx_proof(1, h0()).into(),
            ..entries(vec![SINK, SINK, SINK])
        },
        signature: [0u8; 65],
    };
    sign(&key, &mut request, U256::from(1u64));
    let mut meter = GasMeter::new(1_000_000);
    let receipt = dispatcher
        .forward_batch(&mut host, &mut meter, &mut wallet, &request)
        .unwrap();
    assert_eq!(receipt.outcome, ExecOutcome::Success);
    assert_eq!(host.native_balance(SINK), U256::from(60u64));
    assert_eq!(host.native_balance(WALLET), U256::from(40u64));
}

#[test]
fn under_forwarded_gas_is_fatal_and_burns_the_budget() {
    let mut host = InMemoryHost::new(CHAIN_ID, NOW);
    // A hungry callee: with a starved stipend it runs out of gas.
    host.register_callee(SINK, 100_000, |_| Ok(Vec::new()));
    let mut wallet = wallet();
    let mut dispatcher = RelayDispatcher::new(domain());
    let key = key(0x15);
    let signer = address_of_key(key.verifying_key());

    let mut request =
        execute_request(&key, U256::ZERO, tx_proof(0, h0()), FeeTerms::free());
    request.gas = 300_000;
    request.signature = [0u8; 65];
    sign(&key, &mut request, U256::ZERO);

    // The relay shows up with far less gas than the request declares.
    let mut meter = GasMeter::new(8_000);
    let err = dispatcher
        .forward_execute(&mut host, &mut meter, &mut wallet, &request)
        .unwrap_err();
    assert!(matches!(err, ForwardError::GasIntegrity(_)));
    // Irrecoverable: the remaining budget is consumed outright.
    assert_eq!(meter.remaining(), 0);
    // The nonce was consumed before the call; only honest resubmission with a
    // fresh signature can continue.
    assert_eq!(dispatcher.nonce(signer), U256::from(1u64));
}

#[test]
fn generously_funded_relay_passes_the_gas_audit() {
    let mut host = host();
    let mut wallet = wallet();
    let mut dispatcher = RelayDispatcher::new(domain());
    let key = key(0x16);

    let request =
        execute_request(&key, U256::ZERO, tx_proof(0, h0()), FeeTerms::free());
    let mut meter = GasMeter::new(2_000_000);
    let receipt = dispatcher
        .forward_execute(&mut host, &mut meter, &mut wallet, &request)
        .unwrap();
    assert_eq!(receipt.outcome, ExecOutcome::Success);
    assert!(meter.remaining() > 0);
    assert!(receipt.gas_used > 0);
}

#[test]
fn lenient_mode_skips_invalid_items_without_aborting_siblings() {
    let mut host = host();
    let mut wallet = wallet();
    let mut dispatcher = RelayDispatcher::new(domain());

    let good_key = key(0x21);
    let late_key = key(0x22);
    let forged_key = key(0x23);

    let good =
        execute_request(&good_key, U256::ZERO, tx_proof(0, h0()), FeeTerms::free());

    let mut expired =
        execute_request(&late_key, U256::ZERO, tx_proof(0, h0()), FeeTerms::free());
    expired.deadline = NOW - 1;
    sign(&late_key, &mut expired, U256::ZERO);

    // Signed over the wrong ledger nonce: recovery yields a different signer.
    let forged =
        execute_request(&forged_key, U256::from(9u64), tx_proof(0, h0()), FeeTerms::free());

    let mut meter = GasMeter::new(2_000_000);
    let outcomes = dispatcher
        .forward_many(
            &mut host,
            &mut meter,
            &mut wallet,
            &[expired, forged, good],
        )
        .unwrap();

    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0], ItemOutcome::Skipped(SkipReason::Expired));
    assert_eq!(outcomes[1], ItemOutcome::Skipped(SkipReason::SignerMismatch));
    match &outcomes[2] {
        ItemOutcome::Executed(receipt) => {
            assert_eq!(receipt.outcome, ExecOutcome::Success)
        }
        other => panic!("expected executed item, got {other:?}"),
    }

    // Skipped items consumed no nonce.
    assert_eq!(dispatcher.nonce(address_of_key(late_key.verifying_key())), U256::ZERO);
    assert_eq!(dispatcher.nonce(address_of_key(forged_key.verifying_key())), U256::ZERO);
    assert_eq!(dispatcher.nonce(address_of_key(good_key.verifying_key())), U256::from(1u64));
}

#[test]
fn relayed_fee_charging_pays_the_collector() {
    let mut host = host();
    host.credit_native(WALLET, U256::from(10_000_000u64));
    let mut wallet = wallet();
    let mut dispatcher = RelayDispatcher::new(domain());
    let key = key(0x31);

    let fee = FeeTerms { rate: U256::from(2u64), token: Address::ZERO };
    let request = execute_request(&key, U256::ZERO, tx_proof(0, h0()), fee);

    let mut meter = GasMeter::new(1_000_000);
    let receipt = dispatcher
        .forward_execute(&mut host, &mut meter, &mut wallet, &request)
        .unwrap();
    assert_eq!(receipt.outcome, ExecOutcome::Success);

    let collected = host.native_balance(COLLECTOR);
    assert!(collected > U256::ZERO);
    assert_eq!(
        host.native_balance(WALLET) + collected,
        U256::from(10_000_000u64)
    );
}

#[test]
fn untrusted_wallet_fails_closed() {
    let mut host = host();
    // Wallet initialized without this dispatcher in its forwarder set.
    let mut wallet = ProofWallet::new(WALLET);
    wallet
        .initialize(WalletConfig {
            tx_commitment: h0(),
            tx_verifier: Box::new(KeccakBindingVerifier),
            recovery_commitment: r0(),
            recovery_verifier: Box::new(KeccakBindingVerifier),
            fee_collector: COLLECTOR,
            trusted_forwarders: vec![NOBODY],
        })
        .unwrap();
    let mut dispatcher = RelayDispatcher::new(domain());
    let key = key(0x32);

    let request =
        execute_request(&key, U256::ZERO, tx_proof(0, h0()), FeeTerms::free());
    let mut meter = GasMeter::new(1_000_000);
    let err = dispatcher
        .forward_execute(&mut host, &mut meter, &mut wallet, &request)
        .unwrap_err();
    assert_eq!(err, ForwardError::UntrustedTarget);
    assert_eq!(wallet.local_nonce(), U256::ZERO);
}
