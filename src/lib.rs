//! Proof-gated account-abstraction wallet and trusted relay dispatcher.
//!
//! Users authorize actions with off-chain typed-data signatures and zero-knowledge
//! proofs instead of submitting transactions themselves. The crate composes:
//!
//! - typed-data signature authentication over a generic request envelope
//!   ([`utils::typed_data`], [`utils::crypto`]);
//! - two independent replay defenses: a relay-layer nonce ledger ([`nonces`]) and a
//!   wallet-local proof counter ([`wallet`]);
//! - a proof-gated executor binding each transition to a policy commitment via an
//!   opaque verification oracle ([`wallet::ProofVerifier`]);
//! - a consumed-proof set for server-issued cross-chain proofs ([`dedup`]);
//! - a forwarder-trust handshake and request validation ([`validator`]);
//! - a gas-forwarding integrity check defeating gas-griefing relays ([`gas`]);
//! - the relay dispatcher orchestrating all of it per request shape
//!   ([`forwarder`]).
//!
//! The platform surface (time, chain identity, message calls, rollback) is the
//! explicit [`host::Host`] trait; [`host::InMemoryHost`] is the reference
//! environment the integration tests run against.

pub mod constants;
pub mod dedup;
pub mod errors;
pub mod forwarder;
pub mod gas;
pub mod host;
pub mod interfaces;
pub mod nonces;
pub mod types;
pub mod utils;
pub mod validator;
pub mod wallet;

pub use errors::{CallFault, ForwardError, GasIntegrityFault, SignatureError, WalletError};
pub use forwarder::{FactoryTarget, RelayDispatcher};
pub use gas::{GasIntegrity, GasMeter};
pub use host::{Host, InMemoryHost, RelayTarget};
pub use nonces::NonceLedger;
pub use types::{
    BatchPayload, CapabilityQuery, ChangeRecoveryPolicyPayload, ChangeTxPolicyPayload,
    DeployPayload, ExecOutcome, ExecutePayload, FeeTerms, ForwardReceipt, ForwardRequest,
    ItemOutcome, PolicyKind, RelayDomain, SkipReason,
};
pub use validator::Validation;
pub use wallet::{KeccakBindingVerifier, ProofVerifier, ProofWallet, WalletConfig};
