//! Relay dispatcher: the forwarder side of the protocol.
//!
//! Per request shape the pipeline is fixed: validate (trust, deadline, signer) →
//! consume the relay-layer nonce → ABI-encode the downstream call with the signer
//! appended as a calldata suffix → dispatch with the caller-declared gas →
//! post-call gas-integrity audit. The encoded calldata is byte-identical to a
//! direct call of the target's function, so relaying is transparent apart from
//! the suffix.

use alloy_primitives::{Address, U256};
use alloy_sol_types::{SolCall, SolValue};
use tracing::{debug, warn};

use crate::{
    errors::{CallFault, ForwardError},
    gas::{GasIntegrity, GasMeter},
    host::{Host, RelayTarget},
    interfaces::{IProofWallet, IWalletFactory},
    nonces::NonceLedger,
    types::{
        BatchPayload, ChangeRecoveryPolicyPayload, ChangeTxPolicyPayload, DeployPayload,
        ExecOutcome, ExecutePayload, ForwardReceipt, ForwardRequest, ItemOutcome,
        RelayDomain, SkipReason,
    },
    utils::typed_data::SignedPayload,
    validator,
};

/// Adapter exposing a host-registered callee (a deployment factory) as a relay
/// target.
pub struct FactoryTarget {
    address: Address,
}

impl FactoryTarget {
    pub fn new(address: Address) -> Self {
        Self { address }
    }
}

impl RelayTarget for FactoryTarget {
    fn address(&self) -> Address {
        self.address
    }

    fn static_call(&self, host: &dyn Host, input: &[u8]) -> Result<Vec<u8>, CallFault> {
        host.static_call(self.address, input)
    }

    fn call(
        &mut self,
        host: &mut dyn Host,
        meter: &mut GasMeter,
        sender: Address,
        input: &[u8],
    ) -> Result<Vec<u8>, CallFault> {
        host.call(meter, sender, self.address, U256::ZERO, input)
    }
}

/// Outcome of the raw relay pipeline, before return-data interpretation.
struct Relayed {
    nonce: U256,
    result: Result<Vec<u8>, CallFault>,
    gas_used: u64,
}

pub struct RelayDispatcher {
    domain: RelayDomain,
    nonces: NonceLedger,
    integrity: GasIntegrity,
}

impl RelayDispatcher {
    pub fn new(domain: RelayDomain) -> Self {
        Self::with_integrity(domain, GasIntegrity::default())
    }

    pub fn with_integrity(domain: RelayDomain, integrity: GasIntegrity) -> Self {
        Self { domain, nonces: NonceLedger::new(), integrity }
    }

    pub fn domain(&self) -> &RelayDomain {
        &self.domain
    }

    /// The dispatcher's own identity (the typed-data verifying contract).
    pub fn address(&self) -> Address {
        self.domain.verifying_contract
    }

    /// Ledger nonce the next request from `signer` must be signed over.
    pub fn nonce(&self, signer: Address) -> U256 {
        self.nonces.current(signer)
    }

    /// Shared pipeline for every request shape.
    fn relay<P: SignedPayload>(
        &mut self,
        host: &mut dyn Host,
        meter: &mut GasMeter,
        target: &mut dyn RelayTarget,
        request: &ForwardRequest<P>,
        mut calldata: Vec<u8>,
    ) -> Result<Relayed, ForwardError> {
        let validation = validator::validate(
            host,
            target,
            &self.domain,
            request,
            self.nonces.current(request.signer),
        );
        let signer = validation.require()?;

        // Last read-then-write before the call: a reentrant dispatch against the
        // same signer observes the incremented counter and fails signer-match.
        let nonce = self.nonces.consume(signer);
        debug!(%signer, %nonce, target = %target.address(), "relaying request");

        calldata.extend_from_slice(signer.as_slice());

        let before = meter.remaining();
        let mut child = meter.child(request.gas);
        let result = target.call(host, &mut child, self.address(), &calldata);
        meter.absorb(child);

        if let Err(fault) = self.integrity.check_forwarded(meter.remaining(), request.gas) {
            // Under-forwarded gas. Fatal: burn what is left so the relay gains
            // nothing from starving the sub-call.
            warn!(%fault, "aborting relay operation");
            meter.exhaust();
            return Err(ForwardError::GasIntegrity(fault));
        }

        let gas_used = before.saturating_sub(meter.remaining());
        Ok(Relayed { nonce, result, gas_used })
    }

    /// Interpret a wallet-shaped return (a single outcome word).
    fn coded_receipt(&self, signer: Address, relayed: Relayed) -> Result<ForwardReceipt, ForwardError> {
        let ret = relayed.result.map_err(ForwardError::TargetReverted)?;
        let code =
            U256::abi_decode(&ret, true).map_err(|_| ForwardError::MalformedReturn)?;
        let outcome = ExecOutcome::from_code(code).ok_or(ForwardError::MalformedReturn)?;
        Ok(ForwardReceipt {
            signer,
            nonce: relayed.nonce,
            outcome,
            output: ret.into(),
            gas_used: relayed.gas_used,
        })
    }

    pub fn forward_execute(
        &mut self,
        host: &mut dyn Host,
        meter: &mut GasMeter,
        target: &mut dyn RelayTarget,
        request: &ForwardRequest<ExecutePayload>,
    ) -> Result<ForwardReceipt, ForwardError> {
        let calldata = encode_execute(&request.payload);
        let relayed = self.relay(host, meter, target, request, calldata)?;
        self.coded_receipt(request.signer, relayed)
    }

    pub fn forward_batch(
        &mut self,
        host: &mut dyn Host,
        meter: &mut GasMeter,
        target: &mut dyn RelayTarget,
        request: &ForwardRequest<BatchPayload>,
    ) -> Result<ForwardReceipt, ForwardError> {
        let calldata = encode_batch(&request.payload);
        let relayed = self.relay(host, meter, target, request, calldata)?;
        self.coded_receipt(request.signer, relayed)
    }

    pub fn forward_change_tx_policy(
        &mut self,
        host: &mut dyn Host,
        meter: &mut GasMeter,
        target: &mut dyn RelayTarget,
        request: &ForwardRequest<ChangeTxPolicyPayload>,
    ) -> Result<ForwardReceipt, ForwardError> {
        let calldata = IProofWallet::changeTxPolicyCall {
            proof: request.payload.proof.clone(),
            newCommitment: request.payload.new_commitment,
        }
        .abi_encode();
        let relayed = self.relay(host, meter, target, request, calldata)?;
        self.coded_receipt(request.signer, relayed)
    }

    pub fn forward_change_recovery_policy(
        &mut self,
        host: &mut dyn Host,
        meter: &mut GasMeter,
        target: &mut dyn RelayTarget,
        request: &ForwardRequest<ChangeRecoveryPolicyPayload>,
    ) -> Result<ForwardReceipt, ForwardError> {
        let calldata = IProofWallet::changeRecoveryPolicyCall {
            proof: request.payload.proof.clone(),
            newCommitment: request.payload.new_commitment,
        }
        .abi_encode();
        let relayed = self.relay(host, meter, target, request, calldata)?;
        self.coded_receipt(request.signer, relayed)
    }

    /// Forward an opaque deployment payload to a factory. The factory's return
    /// data (the deployed address, typically) is passed through untouched.
    pub fn forward_deploy(
        &mut self,
        host: &mut dyn Host,
        meter: &mut GasMeter,
        target: &mut dyn RelayTarget,
        request: &ForwardRequest<DeployPayload>,
    ) -> Result<ForwardReceipt, ForwardError> {
        let calldata = IWalletFactory::deployCall {
            initCode: request.payload.init_code.clone(),
            salt: request.payload.salt,
        }
        .abi_encode();
        let relayed = self.relay(host, meter, target, request, calldata)?;
        let ret = relayed.result.map_err(ForwardError::TargetReverted)?;
        Ok(ForwardReceipt {
            signer: request.signer,
            nonce: relayed.nonce,
            outcome: ExecOutcome::Success,
            output: ret.into(),
            gas_used: relayed.gas_used,
        })
    }

    /// Lenient mode: dispatch a batch of independent requests, skipping items
    /// that fail validation instead of aborting their siblings. Only a
    /// gas-integrity fault aborts the whole batch.
    pub fn forward_many(
        &mut self,
        host: &mut dyn Host,
        meter: &mut GasMeter,
        target: &mut dyn RelayTarget,
        requests: &[ForwardRequest<ExecutePayload>],
    ) -> Result<Vec<ItemOutcome>, ForwardError> {
        let mut outcomes = Vec::with_capacity(requests.len());
        for request in requests {
            match self.forward_execute(host, meter, target, request) {
                Ok(receipt) => outcomes.push(ItemOutcome::Executed(receipt)),
                Err(err @ ForwardError::GasIntegrity(_)) => return Err(err),
                Err(ForwardError::UntrustedTarget) => {
                    outcomes.push(ItemOutcome::Skipped(SkipReason::Untrusted))
                }
                Err(ForwardError::RequestExpired) => {
                    outcomes.push(ItemOutcome::Skipped(SkipReason::Expired))
                }
                Err(ForwardError::SignerMismatch) => {
                    outcomes.push(ItemOutcome::Skipped(SkipReason::SignerMismatch))
                }
                Err(err) => outcomes.push(ItemOutcome::Failed(err)),
            }
        }
        Ok(outcomes)
    }
}

/// Encode the execute shape. Zero fee terms relay as the plain `execute` call;
/// anything else carries the fee parameters.
fn encode_execute(payload: &ExecutePayload) -> Vec<u8> {
    if payload.fee.rate.is_zero() && payload.fee.token == Address::ZERO {
        IProofWallet::executeCall {
            proof: payload.proof.clone(),
            to: payload.to,
            value: payload.value,
            data: payload.data.clone(),
        }
        .abi_encode()
    } else {
        IProofWallet::executeWithFeeCall {
            proof: payload.proof.clone(),
            to: payload.to,
            value: payload.value,
            data: payload.data.clone(),
            feeRate: payload.fee.rate,
            feeToken: payload.fee.token,
        }
        .abi_encode()
    }
}

fn encode_batch(payload: &BatchPayload) -> Vec<u8> {
    if payload.fee.rate.is_zero() && payload.fee.token == Address::ZERO {
        IProofWallet::executeBatchCall {
            proof: payload.proof.clone(),
            targets: payload.targets.clone(),
            values: payload.values.clone(),
            datas: payload.datas.clone(),
        }
        .abi_encode()
    } else {
        IProofWallet::executeBatchWithFeeCall {
            proof: payload.proof.clone(),
            targets: payload.targets.clone(),
            values: payload.values.clone(),
            datas: payload.datas.clone(),
            feeRate: payload.fee.rate,
            feeToken: payload.fee.token,
        }
        .abi_encode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SENDER_SUFFIX_LEN;
    use crate::host::InMemoryHost;
    use crate::types::FeeTerms;
    use crate::utils::typed_data;
    use alloy_primitives::{address, Bytes, B256};
    use alloy_sol_types::SolValue;
    use k256::ecdsa::SigningKey;

    const FACTORY: Address = address!("00000000000000000000000000000000000000fa");
    const FORWARDER: Address = address!("00000000000000000000000000000000000000f0");

    fn domain() -> RelayDomain {
        RelayDomain {
            name: "ZK Relay",
            version: "1",
            chain_id: 1,
            verifying_contract: FORWARDER,
        }
    }

    fn sign<P: SignedPayload>(
        key: &SigningKey,
        request: &mut ForwardRequest<P>,
        nonce: U256,
    ) {
        let digest = typed_data::request_digest(&domain(), request, nonce);
        let (sig, recid) = key.sign_prehash_recoverable(digest.as_slice()).unwrap();
        request.signature[..64].copy_from_slice(&sig.to_bytes());
        request.signature[64] = 27 + recid.to_byte();
    }

    #[test]
    fn deploy_is_forwarded_with_exact_layout_and_signer_suffix() {
        let mut host = InMemoryHost::new(1, 1_000);
        let deployed = address!("000000000000000000000000000000000000d0d0");
        host.register_callee(FACTORY, 10_000, move |_| Ok(deployed.abi_encode()));
        host.register_static_callee(FACTORY, |_| Ok(true.abi_encode()));

        let key = SigningKey::from_slice(&[9u8; 32]).unwrap();
        let signer = crate::utils::crypto::address_of_key(key.verifying_key());

        let mut request = ForwardRequest {
            signer,
            target: FACTORY,
            deadline: 2_000,
            gas: 200_000,
            payload: DeployPayload {
                init_code: Bytes::from_static(b"init code"),
                salt: B256::repeat_byte(0x5a),
            },
            signature: [0u8; 65],
        };
        sign(&key, &mut request, U256::ZERO);

        let mut dispatcher = RelayDispatcher::new(domain());
        let mut meter = GasMeter::new(1_000_000);
        let mut factory = FactoryTarget::new(FACTORY);
        let receipt = dispatcher
            .forward_deploy(&mut host, &mut meter, &mut factory, &request)
            .unwrap();

        assert_eq!(receipt.nonce, U256::ZERO);
        assert_eq!(
            Address::abi_decode(&receipt.output, true).unwrap(),
            deployed
        );

        // The relayed calldata is a direct `deploy` call plus the signer suffix.
        let expected = IWalletFactory::deployCall {
            initCode: request.payload.init_code.clone(),
            salt: request.payload.salt,
        }
        .abi_encode();
        let observed = &host.calls()[0];
        assert_eq!(observed.from, FORWARDER);
        assert_eq!(observed.input.len(), expected.len() + SENDER_SUFFIX_LEN);
        assert_eq!(&observed.input[..expected.len()], expected.as_slice());
        assert_eq!(&observed.input[expected.len()..], signer.as_slice());
    }

    #[test]
    fn untrusted_factory_is_rejected_without_consuming_a_nonce() {
        let mut host = InMemoryHost::new(1, 1_000);
        host.register_callee(FACTORY, 10_000, |_| Ok(Vec::new()));
        // No static handler registered: the probe faults, fail-closed.

        let key = SigningKey::from_slice(&[9u8; 32]).unwrap();
        let signer = crate::utils::crypto::address_of_key(key.verifying_key());
        let mut request = ForwardRequest {
            signer,
            target: FACTORY,
            deadline: 2_000,
            gas: 200_000,
            payload: DeployPayload { init_code: Bytes::new(), salt: B256::ZERO },
            signature: [0u8; 65],
        };
        sign(&key, &mut request, U256::ZERO);

        let mut dispatcher = RelayDispatcher::new(domain());
        let mut meter = GasMeter::new(1_000_000);
        let mut factory = FactoryTarget::new(FACTORY);
        let err = dispatcher
            .forward_deploy(&mut host, &mut meter, &mut factory, &request)
            .unwrap_err();
        assert_eq!(err, ForwardError::UntrustedTarget);
        assert_eq!(dispatcher.nonce(signer), U256::ZERO);
    }

    #[test]
    fn plain_and_fee_carrying_execute_shapes_encode_differently() {
        let payload = ExecutePayload {
            proof: Bytes::from_static(b"p"),
            to: FACTORY,
            value: U256::ZERO,
            data: Bytes::new(),
            fee: FeeTerms::free(),
        };
        let plain = encode_execute(&payload);
        assert_eq!(&plain[..4], IProofWallet::executeCall::SELECTOR.as_slice());

        let with_fee = encode_execute(&ExecutePayload {
            fee: FeeTerms { rate: U256::from(3u64), token: Address::ZERO },
            ..payload
        });
        assert_eq!(
            &with_fee[..4],
            IProofWallet::executeWithFeeCall::SELECTOR.as_slice()
        );
    }
}
