//! Error taxonomy for the relay and wallet layers.
//!
//! Every failure path the protocol distinguishes gets its own variant; a client must
//! be able to tell from the error alone whether its relay-layer nonce was consumed
//! (and therefore whether a resubmission can ever succeed).

use thiserror::Error;

/// Signature-shaped failures. Soft: these never abort a relay operation on their
/// own, they only make the signer-match sub-check false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature must be 65 bytes (r || s || v)")]
    BadLength,
    #[error("recovery id {0} is not one of 0, 1, 27, 28")]
    BadRecoveryId(u8),
    #[error("signature components out of range")]
    OutOfRange,
    #[error("no public key recoverable from digest and signature")]
    Unrecoverable,
}

/// Faults raised by a message call against the host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallFault {
    #[error("call reverted")]
    Reverted,
    #[error("target has no callee registered")]
    NoTarget,
    #[error("out of gas")]
    OutOfGas,
    #[error("insufficient native balance for value transfer")]
    InsufficientValue,
}

/// Under-forwarded gas detected after a relayed call.
///
/// Fatal by construction: the dispatcher exhausts its remaining budget when raising
/// this, so a misbehaving relay gains nothing from starving the sub-call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("forwarded gas integrity violated: {gas_after} gas left after call, requested {requested}")]
pub struct GasIntegrityFault {
    pub gas_after: u64,
    pub requested: u64,
}

/// Strict-mode relay faults. Each maps to exactly one failed check of the request
/// validator or the post-call gas audit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForwardError {
    /// The target's trust probe did not affirmatively accept this dispatcher.
    #[error("target does not trust this dispatcher")]
    UntrustedTarget,
    /// `deadline < now`. The request's nonce was not consumed.
    #[error("request deadline has passed")]
    RequestExpired,
    /// Recovered signer differs from the claimed signer (or the signature is
    /// malformed). The request's nonce was not consumed.
    #[error("recovered signer does not match request signer")]
    SignerMismatch,
    /// The relayed call itself reverted at the target boundary (bad calldata,
    /// uninitialized wallet). The nonce *was* consumed.
    #[error("relayed call reverted: {0}")]
    TargetReverted(CallFault),
    /// The target returned bytes that do not decode as an outcome word.
    #[error("relayed call returned malformed data")]
    MalformedReturn,
    #[error(transparent)]
    GasIntegrity(#[from] GasIntegrityFault),
}

/// Wallet lifecycle violations. These revert the calldata entry outright rather
/// than producing an outcome code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WalletError {
    #[error("wallet is not initialized")]
    NotInitialized,
    #[error("wallet is already initialized")]
    AlreadyInitialized,
    #[error("initialization parameters contain a zero-value field")]
    InvalidConfig,
}
