//! Proof-gated executor: the wallet side of the protocol.
//!
//! Every state transition is gated on an opaque verification oracle accepting a
//! zero-knowledge proof over (wallet-local nonce, policy commitment, chain id).
//! Transaction and recovery policies are tracked as fully independent
//! (commitment, verifier) pairs, so compromising one proof domain cannot rewrite
//! the other's policy.
//!
//! Nonce policy is consume-always: once a proof is accepted the local nonce
//! advances *before* the downstream call, so the proof is dead even if that call
//! reverts. See DESIGN.md.

use std::collections::BTreeSet;

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::{SolCall, SolValue};
use tracing::{debug, warn};

use crate::{
    constants::{FEE_BASE_OVERHEAD, SENDER_SUFFIX_LEN},
    dedup::ConsumedProofSet,
    errors::{CallFault, WalletError},
    gas::GasMeter,
    host::{Host, RelayTarget},
    interfaces::{IProofWallet, IERC20, ITrustProbe},
    types::{ExecOutcome, FeeTerms, PolicyKind},
};

/// Opaque proof-verification oracle, configurable per wallet and per policy kind.
/// Treated as pure and side-effect-free.
pub trait ProofVerifier {
    fn verify(&self, proof: &[u8], public_inputs: &[U256]) -> bool;
}

/// Reference oracle: accepts a proof iff it equals the keccak256 of the packed
/// public-input words. Binds a proof to exactly one (nonce, commitment, chain)
/// tuple, which is all the protocol relies on; real deployments plug in a real
/// proof system here.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeccakBindingVerifier;

impl KeccakBindingVerifier {
    /// Produce the unique proof this oracle accepts for `public_inputs`.
    pub fn prove(public_inputs: &[U256]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(public_inputs.len() * 32);
        for word in public_inputs {
            buf.extend_from_slice(&word.to_be_bytes::<32>());
        }
        alloy_primitives::keccak256(buf).to_vec()
    }
}

impl ProofVerifier for KeccakBindingVerifier {
    fn verify(&self, proof: &[u8], public_inputs: &[U256]) -> bool {
        proof == Self::prove(public_inputs).as_slice()
    }
}

/// Initialization parameters. Commitments and the collector must be non-zero so an
/// initialized wallet is always distinguishable from a fresh one.
pub struct WalletConfig {
    pub tx_commitment: B256,
    pub tx_verifier: Box<dyn ProofVerifier>,
    pub recovery_commitment: B256,
    pub recovery_verifier: Box<dyn ProofVerifier>,
    pub fee_collector: Address,
    pub trusted_forwarders: Vec<Address>,
}

/// Proof-gated wallet instance. States: Uninitialized (fresh) and Active
/// (after exactly one successful `initialize`).
pub struct ProofWallet {
    address: Address,
    local_nonce: U256,
    tx_commitment: B256,
    tx_verifier: Option<Box<dyn ProofVerifier>>,
    recovery_commitment: B256,
    recovery_verifier: Option<Box<dyn ProofVerifier>>,
    fee_collector: Address,
    trusted_forwarders: BTreeSet<Address>,
    consumed_proofs: ConsumedProofSet,
}

impl ProofWallet {
    /// A fresh, uninitialized wallet at `address`. Every configuration field is at
    /// its zero value.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            local_nonce: U256::ZERO,
            tx_commitment: B256::ZERO,
            tx_verifier: None,
            recovery_commitment: B256::ZERO,
            recovery_verifier: None,
            fee_collector: Address::ZERO,
            trusted_forwarders: BTreeSet::new(),
            consumed_proofs: ConsumedProofSet::new(),
        }
    }

    /// One-shot initialization. Rejected unless every configuration field is still
    /// at zero value, which is exactly the fresh-wallet state.
    pub fn initialize(&mut self, config: WalletConfig) -> Result<(), WalletError> {
        let untouched = self.tx_commitment.is_zero()
            && self.tx_verifier.is_none()
            && self.recovery_commitment.is_zero()
            && self.recovery_verifier.is_none()
            && self.fee_collector == Address::ZERO
            && self.trusted_forwarders.is_empty()
            && self.local_nonce.is_zero();
        if !untouched {
            return Err(WalletError::AlreadyInitialized);
        }
        if config.tx_commitment.is_zero()
            || config.recovery_commitment.is_zero()
            || config.fee_collector == Address::ZERO
        {
            return Err(WalletError::InvalidConfig);
        }

        self.tx_commitment = config.tx_commitment;
        self.tx_verifier = Some(config.tx_verifier);
        self.recovery_commitment = config.recovery_commitment;
        self.recovery_verifier = Some(config.recovery_verifier);
        self.fee_collector = config.fee_collector;
        self.trusted_forwarders = config.trusted_forwarders.into_iter().collect();
        Ok(())
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn local_nonce(&self) -> U256 {
        self.local_nonce
    }

    pub fn tx_commitment(&self) -> B256 {
        self.tx_commitment
    }

    pub fn recovery_commitment(&self) -> B256 {
        self.recovery_commitment
    }

    pub fn is_trusted_forwarder(&self, forwarder: Address) -> bool {
        self.trusted_forwarders.contains(&forwarder)
    }

    fn ensure_active(&self) -> Result<(), WalletError> {
        if self.tx_verifier.is_none() || self.tx_commitment.is_zero() {
            return Err(WalletError::NotInitialized);
        }
        Ok(())
    }

    fn verifier(&self, kind: PolicyKind) -> Result<&dyn ProofVerifier, WalletError> {
        let slot = match kind {
            PolicyKind::Transaction => &self.tx_verifier,
            PolicyKind::Recovery => &self.recovery_verifier,
        };
        slot.as_deref().ok_or(WalletError::NotInitialized)
    }

    fn commitment(&self, kind: PolicyKind) -> B256 {
        match kind {
            PolicyKind::Transaction => self.tx_commitment,
            PolicyKind::Recovery => self.recovery_commitment,
        }
    }

    /// Public inputs for a nonce-bound transition. Read immediately before the
    /// consume step; change operations additionally bind the replacement
    /// commitment so a relay cannot substitute its own.
    fn public_inputs(
        &self,
        chain_id: u64,
        kind: PolicyKind,
        new_commitment: Option<B256>,
    ) -> Vec<U256> {
        let mut inputs = vec![
            self.local_nonce,
            U256::from_be_bytes(self.commitment(kind).0),
            U256::from(chain_id),
        ];
        if let Some(replacement) = new_commitment {
            inputs.push(U256::from_be_bytes(replacement.0));
        }
        inputs
    }

    /// Single proof-gated call.
    pub fn execute(
        &mut self,
        host: &mut dyn Host,
        meter: &mut GasMeter,
        proof: &[u8],
        to: Address,
        value: U256,
        data: &[u8],
    ) -> Result<ExecOutcome, WalletError> {
        self.ensure_active()?;
        let inputs = self.public_inputs(host.chain_id(), PolicyKind::Transaction, None);
        if !self.verifier(PolicyKind::Transaction)?.verify(proof, &inputs) {
            debug!(nonce = %self.local_nonce, "execute: proof rejected");
            return Ok(ExecOutcome::ProofInvalid);
        }

        // Consume-always, and before the call: a reentrant or replayed submission
        // sees the advanced nonce and its proof no longer verifies.
        self.local_nonce += U256::from(1u64);

        match host.call(meter, self.address, to, value, data) {
            Ok(_) => Ok(ExecOutcome::Success),
            Err(fault) => {
                debug!(?fault, "execute: downstream call failed (nonce stays consumed)");
                Ok(ExecOutcome::CallFailed)
            }
        }
    }

    /// Proof-gated batch, all-or-nothing. One proof covers the whole ordered list.
    pub fn execute_batch(
        &mut self,
        host: &mut dyn Host,
        meter: &mut GasMeter,
        proof: &[u8],
        targets: &[Address],
        values: &[U256],
        datas: &[alloy_primitives::Bytes],
    ) -> Result<ExecOutcome, WalletError> {
        self.ensure_active()?;
        if targets.len() != values.len() || targets.len() != datas.len() {
            return Ok(ExecOutcome::LengthMismatch);
        }
        let inputs = self.public_inputs(host.chain_id(), PolicyKind::Transaction, None);
        if !self.verifier(PolicyKind::Transaction)?.verify(proof, &inputs) {
            return Ok(ExecOutcome::ProofInvalid);
        }

        self.local_nonce += U256::from(1u64);

        let snap = host.snapshot();
        for (index, ((to, value), data)) in
            targets.iter().zip(values).zip(datas).enumerate()
        {
            if let Err(fault) = host.call(meter, self.address, *to, *value, data) {
                warn!(index, ?fault, "batch entry failed, rolling back all entries");
                host.revert_to(snap);
                return Ok(ExecOutcome::CallFailed);
            }
        }
        host.discard_snapshot(snap);
        Ok(ExecOutcome::Success)
    }

    pub fn change_tx_policy(
        &mut self,
        host: &dyn Host,
        proof: &[u8],
        new_commitment: B256,
    ) -> Result<ExecOutcome, WalletError> {
        self.change_policy(host, PolicyKind::Transaction, proof, new_commitment)
    }

    pub fn change_recovery_policy(
        &mut self,
        host: &dyn Host,
        proof: &[u8],
        new_commitment: B256,
    ) -> Result<ExecOutcome, WalletError> {
        self.change_policy(host, PolicyKind::Recovery, proof, new_commitment)
    }

    /// Replace one policy domain's commitment wholesale, gated on that domain's
    /// own verifier and the shared local nonce.
    fn change_policy(
        &mut self,
        host: &dyn Host,
        kind: PolicyKind,
        proof: &[u8],
        new_commitment: B256,
    ) -> Result<ExecOutcome, WalletError> {
        self.ensure_active()?;
        if new_commitment.is_zero() {
            // A zero commitment would make the wallet look uninitialized.
            return Err(WalletError::InvalidConfig);
        }
        let inputs = self.public_inputs(host.chain_id(), kind, Some(new_commitment));
        if !self.verifier(kind)?.verify(proof, &inputs) {
            debug!(?kind, "change-policy proof rejected");
            return Ok(ExecOutcome::ProofInvalid);
        }

        self.local_nonce += U256::from(1u64);
        match kind {
            PolicyKind::Transaction => self.tx_commitment = new_commitment,
            PolicyKind::Recovery => self.recovery_commitment = new_commitment,
        }
        Ok(ExecOutcome::Success)
    }

    /// Cross-chain entry for server-issued proofs. These are not bound to the
    /// local nonce, so the consumed-proof set is the sole replay defense:
    /// duplicate check first, record before the privileged call.
    pub fn execute_crosschain(
        &mut self,
        host: &mut dyn Host,
        meter: &mut GasMeter,
        proof: &[u8],
        to: Address,
        value: U256,
        data: &[u8],
    ) -> Result<ExecOutcome, WalletError> {
        self.ensure_active()?;
        let fingerprint = ConsumedProofSet::fingerprint(proof);
        if self.consumed_proofs.is_duplicate(&fingerprint) {
            debug!(fingerprint = %hex::encode(fingerprint), "cross-chain proof replayed");
            return Ok(ExecOutcome::DuplicateProof);
        }

        let inputs = vec![
            U256::from_be_bytes(self.tx_commitment.0),
            U256::from(host.chain_id()),
        ];
        if !self.verifier(PolicyKind::Transaction)?.verify(proof, &inputs) {
            return Ok(ExecOutcome::ProofInvalid);
        }

        self.consumed_proofs.record(fingerprint);
        match host.call(meter, self.address, to, value, data) {
            Ok(_) => Ok(ExecOutcome::Success),
            Err(_) => Ok(ExecOutcome::CallFailed),
        }
    }

    pub fn execute_with_fee(
        &mut self,
        host: &mut dyn Host,
        meter: &mut GasMeter,
        proof: &[u8],
        to: Address,
        value: U256,
        data: &[u8],
        fee: FeeTerms,
    ) -> Result<ExecOutcome, WalletError> {
        self.charging(host, meter, fee, |wallet, host, meter| {
            wallet.execute(host, meter, proof, to, value, data)
        })
    }

    pub fn execute_batch_with_fee(
        &mut self,
        host: &mut dyn Host,
        meter: &mut GasMeter,
        proof: &[u8],
        targets: &[Address],
        values: &[U256],
        datas: &[alloy_primitives::Bytes],
        fee: FeeTerms,
    ) -> Result<ExecOutcome, WalletError> {
        self.charging(host, meter, fee, |wallet, host, meter| {
            wallet.execute_batch(host, meter, proof, targets, values, datas)
        })
    }

    /// Wrap a primary action with relay-fee accounting.
    ///
    /// Worst-case affordability is checked before the transition and is a distinct
    /// non-fatal outcome. A fee-transfer failure after an accepted transition is
    /// surfaced distinctly and does not roll the primary action back.
    fn charging(
        &mut self,
        host: &mut dyn Host,
        meter: &mut GasMeter,
        fee: FeeTerms,
        primary: impl FnOnce(
            &mut Self,
            &mut dyn Host,
            &mut GasMeter,
        ) -> Result<ExecOutcome, WalletError>,
    ) -> Result<ExecOutcome, WalletError> {
        self.ensure_active()?;
        if fee.rate.is_zero() {
            return primary(self, host, meter);
        }

        let budget = meter.remaining();
        let max_fee = fee.rate * U256::from(budget + FEE_BASE_OVERHEAD);
        if self.fee_balance(host, fee.token) < max_fee {
            debug!(token = %fee.token, "fee pre-check failed");
            return Ok(ExecOutcome::InsufficientBalance);
        }

        let outcome = primary(self, host, meter)?;
        match outcome {
            // Nothing was consumed; the relayer is owed nothing.
            ExecOutcome::ProofInvalid
            | ExecOutcome::LengthMismatch
            | ExecOutcome::DuplicateProof => return Ok(outcome),
            _ => {}
        }

        let gas_used = budget.saturating_sub(meter.remaining()) + FEE_BASE_OVERHEAD;
        let fee_due = fee.rate * U256::from(gas_used);
        if !self.pay_fee(host, meter, fee.token, fee_due) {
            warn!(fee_due = %fee_due, "fee transfer failed after primary action");
            return Ok(ExecOutcome::FeeTransferFailed);
        }
        Ok(outcome)
    }

    fn fee_balance(&self, host: &dyn Host, token: Address) -> U256 {
        if token == Address::ZERO {
            return host.native_balance(self.address);
        }
        let input = IERC20::balanceOfCall { owner: self.address }.abi_encode();
        match host.static_call(token, &input) {
            Ok(ret) => U256::abi_decode(&ret, true).unwrap_or(U256::ZERO),
            Err(_) => U256::ZERO,
        }
    }

    fn pay_fee(
        &mut self,
        host: &mut dyn Host,
        meter: &mut GasMeter,
        token: Address,
        amount: U256,
    ) -> bool {
        if token == Address::ZERO {
            return host
                .transfer_native(self.address, self.fee_collector, amount)
                .is_ok();
        }
        let input =
            IERC20::transferCall { to: self.fee_collector, amount }.abi_encode();
        match host.call(meter, self.address, token, U256::ZERO, &input) {
            Ok(ret) => bool::abi_decode(&ret, true).unwrap_or(false),
            Err(_) => false,
        }
    }

    /// ERC-2771: when a registered forwarder calls, the effective sender is the
    /// 20-byte calldata suffix. Anyone else is taken at face value.
    fn effective_call<'a>(&self, sender: Address, input: &'a [u8]) -> (Address, &'a [u8]) {
        if self.is_trusted_forwarder(sender) && input.len() >= 4 + SENDER_SUFFIX_LEN {
            let split = input.len() - SENDER_SUFFIX_LEN;
            let effective = Address::from_slice(&input[split..]);
            return (effective, &input[..split]);
        }
        (sender, input)
    }
}

impl RelayTarget for ProofWallet {
    fn address(&self) -> Address {
        self.address
    }

    fn static_call(&self, _host: &dyn Host, input: &[u8]) -> Result<Vec<u8>, CallFault> {
        let selector: [u8; 4] = input
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or(CallFault::Reverted)?;
        if selector == ITrustProbe::isTrustedForwarderCall::SELECTOR {
            let call = ITrustProbe::isTrustedForwarderCall::abi_decode(input, true)
                .map_err(|_| CallFault::Reverted)?;
            return Ok(self.is_trusted_forwarder(call.forwarder).abi_encode());
        }
        Err(CallFault::Reverted)
    }

    /// Calldata entry. Routes by selector and encodes the outcome as a single
    /// word; lifecycle violations revert instead.
    fn call(
        &mut self,
        host: &mut dyn Host,
        meter: &mut GasMeter,
        sender: Address,
        input: &[u8],
    ) -> Result<Vec<u8>, CallFault> {
        let (effective_sender, data) = self.effective_call(sender, input);
        debug!(%sender, %effective_sender, "wallet calldata entry");

        let selector: [u8; 4] = data
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or(CallFault::Reverted)?;

        let outcome = match selector {
            s if s == IProofWallet::executeCall::SELECTOR => {
                let c = IProofWallet::executeCall::abi_decode(data, true)
                    .map_err(|_| CallFault::Reverted)?;
                self.execute(host, meter, &c.proof, c.to, c.value, &c.data)
            }
            s if s == IProofWallet::executeWithFeeCall::SELECTOR => {
                let c = IProofWallet::executeWithFeeCall::abi_decode(data, true)
                    .map_err(|_| CallFault::Reverted)?;
                let fee = FeeTerms { rate: c.feeRate, token: c.feeToken };
                self.execute_with_fee(host, meter, &c.proof, c.to, c.value, &c.data, fee)
            }
            s if s == IProofWallet::executeBatchCall::SELECTOR => {
                let c = IProofWallet::executeBatchCall::abi_decode(data, true)
                    .map_err(|_| CallFault::Reverted)?;
                self.execute_batch(host, meter, &c.proof, &c.targets, &c.values, &c.datas)
            }
            s if s == IProofWallet::executeBatchWithFeeCall::SELECTOR => {
                let c = IProofWallet::executeBatchWithFeeCall::abi_decode(data, true)
                    .map_err(|_| CallFault::Reverted)?;
                let fee = FeeTerms { rate: c.feeRate, token: c.feeToken };
                self.execute_batch_with_fee(
                    host, meter, &c.proof, &c.targets, &c.values, &c.datas, fee,
                )
            }
            s if s == IProofWallet::changeTxPolicyCall::SELECTOR => {
                let c = IProofWallet::changeTxPolicyCall::abi_decode(data, true)
                    .map_err(|_| CallFault::Reverted)?;
                self.change_tx_policy(host, &c.proof, c.newCommitment)
            }
            s if s == IProofWallet::changeRecoveryPolicyCall::SELECTOR => {
                let c = IProofWallet::changeRecoveryPolicyCall::abi_decode(data, true)
                    .map_err(|_| CallFault::Reverted)?;
                self.change_recovery_policy(host, &c.proof, c.newCommitment)
            }
            _ => return Err(CallFault::Reverted),
        };

        let outcome = outcome.map_err(|err| {
            warn!(%err, "wallet entry reverted");
            CallFault::Reverted
        })?;
        Ok(outcome.code().abi_encode())
    }
}
