//! Shared data model: the signed request envelope, its payload shapes, and the
//! outcome types surfaced to relay clients.

use alloy_primitives::{Address, Bytes, B256, U256};

use crate::{
    constants::{
        OUTCOME_CALL_FAILED, OUTCOME_DUPLICATE_PROOF, OUTCOME_FEE_TRANSFER_FAILED,
        OUTCOME_INSUFFICIENT_BALANCE, OUTCOME_LENGTH_MISMATCH, OUTCOME_PROOF_INVALID,
        OUTCOME_SUCCESS,
    },
    errors::ForwardError,
};

/// EIP-712 domain of the relay dispatcher. Folded into every request digest so a
/// signature is only ever valid for one dispatcher deployment on one chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayDomain {
    pub name: &'static str,
    pub version: &'static str,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

/// Fee pricing supplied by the signer on relay-path requests.
///
/// `token == Address::ZERO` means the fee is paid in native value; anything else is
/// an ERC-20 the wallet holds. A zero `rate` disables fee charging.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeeTerms {
    pub rate: U256,
    pub token: Address,
}

impl FeeTerms {
    pub const fn free() -> Self {
        Self { rate: U256::ZERO, token: Address::ZERO }
    }
}

/// Generic signed-request envelope. One struct backs all five request shapes; the
/// payload type supplies the shape-specific typed-data fields.
#[derive(Clone, Debug)]
pub struct ForwardRequest<P> {
    /// Claimed signer; dispatch proceeds only if recovery agrees.
    pub signer: Address,
    /// The account the relayed call is addressed to (wallet, or factory for deploy).
    pub target: Address,
    /// Inclusive expiry, compared against the host timestamp.
    pub deadline: u64,
    /// Gas the signer expects forwarded to the target call.
    pub gas: u64,
    pub payload: P,
    /// 65-byte `r || s || v` secp256k1 signature over the request digest.
    pub signature: [u8; 65],
}

/// Single proof-gated call.
#[derive(Clone, Debug)]
pub struct ExecutePayload {
    pub proof: Bytes,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub fee: FeeTerms,
}

/// Ordered list of proof-gated calls, applied all-or-nothing.
#[derive(Clone, Debug)]
pub struct BatchPayload {
    pub proof: Bytes,
    pub targets: Vec<Address>,
    pub values: Vec<U256>,
    pub datas: Vec<Bytes>,
    pub fee: FeeTerms,
}

/// Wholesale replacement of the transaction-policy commitment.
#[derive(Clone, Debug)]
pub struct ChangeTxPolicyPayload {
    pub proof: Bytes,
    pub new_commitment: B256,
}

/// Wholesale replacement of the recovery-policy commitment.
#[derive(Clone, Debug)]
pub struct ChangeRecoveryPolicyPayload {
    pub proof: Bytes,
    pub new_commitment: B256,
}

/// Opaque deployment payload forwarded to a factory. Address derivation is the
/// factory's concern, not ours.
#[derive(Clone, Debug)]
pub struct DeployPayload {
    pub init_code: Bytes,
    pub salt: B256,
}

/// Which of the wallet's two independent proof domains an operation runs under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyKind {
    Transaction,
    Recovery,
}

/// Typed result of the side-effect-free trust probe. Any transport anomaly maps to
/// `supported: false`; there is no error form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CapabilityQuery {
    pub supported: bool,
}

impl CapabilityQuery {
    pub const fn unsupported() -> Self {
        Self { supported: false }
    }
}

/// Classified result of a proof-gated wallet operation. Encoded as a single word on
/// the ABI boundary; decoded back by the dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecOutcome {
    /// Proof accepted, every downstream effect applied.
    Success,
    /// The oracle rejected the proof; nothing was consumed or mutated.
    ProofInvalid,
    /// Proof accepted and wallet-local nonce consumed, but the downstream call
    /// failed (for batches: all effects rolled back).
    CallFailed,
    /// Batch vectors disagree in length; nothing was consumed.
    LengthMismatch,
    /// Fee pre-check found the wallet unable to cover the worst-case fee; nothing
    /// was consumed. Non-fatal and distinct from `ProofInvalid`.
    InsufficientBalance,
    /// The primary action succeeded but the fee transfer afterwards failed. The
    /// primary action is *not* rolled back.
    FeeTransferFailed,
    /// Cross-chain proof fingerprint already recorded; rejected outright.
    DuplicateProof,
}

impl ExecOutcome {
    pub fn code(self) -> U256 {
        match self {
            Self::Success => OUTCOME_SUCCESS,
            Self::ProofInvalid => OUTCOME_PROOF_INVALID,
            Self::CallFailed => OUTCOME_CALL_FAILED,
            Self::LengthMismatch => OUTCOME_LENGTH_MISMATCH,
            Self::InsufficientBalance => OUTCOME_INSUFFICIENT_BALANCE,
            Self::FeeTransferFailed => OUTCOME_FEE_TRANSFER_FAILED,
            Self::DuplicateProof => OUTCOME_DUPLICATE_PROOF,
        }
    }

    pub fn from_code(code: U256) -> Option<Self> {
        Some(match code {
            c if c == OUTCOME_SUCCESS => Self::Success,
            c if c == OUTCOME_PROOF_INVALID => Self::ProofInvalid,
            c if c == OUTCOME_CALL_FAILED => Self::CallFailed,
            c if c == OUTCOME_LENGTH_MISMATCH => Self::LengthMismatch,
            c if c == OUTCOME_INSUFFICIENT_BALANCE => Self::InsufficientBalance,
            c if c == OUTCOME_FEE_TRANSFER_FAILED => Self::FeeTransferFailed,
            c if c == OUTCOME_DUPLICATE_PROOF => Self::DuplicateProof,
            _ => return None,
        })
    }
}

/// Receipt for a strictly dispatched request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForwardReceipt {
    pub signer: Address,
    /// Relay-layer nonce consumed by this dispatch (pre-increment value).
    pub nonce: U256,
    pub outcome: ExecOutcome,
    /// Raw return bytes of the relayed call (factory deploys return data here).
    pub output: Bytes,
    pub gas_used: u64,
}

/// Per-item result of a lenient (batch relaying) dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemOutcome {
    Executed(ForwardReceipt),
    /// Validation failed; the item was skipped without consuming its nonce.
    Skipped(SkipReason),
    /// The item was dispatched (nonce consumed) but the call itself faulted.
    Failed(ForwardError),
}

/// Why a lenient-mode item was not executed. Mirrors the strict-mode faults of the
/// same checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    Untrusted,
    Expired,
    SignerMismatch,
}
