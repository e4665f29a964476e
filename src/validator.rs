//! Request validation: trust handshake, deadline, and signer authentication.
//!
//! One `validate` backs both dispatch modes. Strict mode turns the first false
//! sub-result into a distinguishable fault; lenient mode maps it to a per-item skip
//! reason so batch siblings keep going.

use alloy_primitives::{Address, U256};
use alloy_sol_types::{SolCall, SolValue};
use tracing::debug;

use crate::{
    errors::ForwardError,
    host::{Host, RelayTarget},
    interfaces::ITrustProbe,
    types::{CapabilityQuery, ForwardRequest, RelayDomain, SkipReason},
    utils::{crypto::recover_signer, typed_data},
};

/// Sub-results of validating one request. `signer` is only meaningful when a
/// recovery succeeded; callers must never use it when `signer_match` is false.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validation {
    pub trusted: bool,
    pub active: bool,
    pub signer_match: bool,
    pub signer: Option<Address>,
}

impl Validation {
    /// Strict mode: abort on the first failed check, identifying it.
    pub fn require(&self) -> Result<Address, ForwardError> {
        if !self.trusted {
            return Err(ForwardError::UntrustedTarget);
        }
        if !self.active {
            return Err(ForwardError::RequestExpired);
        }
        match self.signer {
            Some(signer) if self.signer_match => Ok(signer),
            _ => Err(ForwardError::SignerMismatch),
        }
    }

    /// Lenient mode: the same check order, reported as a skip instead of a fault.
    pub fn skip_reason(&self) -> Option<SkipReason> {
        if !self.trusted {
            return Some(SkipReason::Untrusted);
        }
        if !self.active {
            return Some(SkipReason::Expired);
        }
        if !self.signer_match {
            return Some(SkipReason::SignerMismatch);
        }
        None
    }
}

/// Ask the target whether it trusts `forwarder`, fail-closed.
///
/// Any transport fault, malformed word, or falsy answer maps to `unsupported`;
/// only an affirmative ABI-true response counts.
pub fn probe_trust(
    host: &dyn Host,
    target: &dyn RelayTarget,
    forwarder: Address,
) -> CapabilityQuery {
    let input = ITrustProbe::isTrustedForwarderCall { forwarder }.abi_encode();
    match target.static_call(host, &input) {
        Ok(ret) => match bool::abi_decode(&ret, true) {
            Ok(supported) => CapabilityQuery { supported },
            Err(_) => CapabilityQuery::unsupported(),
        },
        Err(fault) => {
            debug!(?fault, "trust probe faulted, treating target as untrusted");
            CapabilityQuery::unsupported()
        }
    }
}

/// Validate a request against the target, the clock, and its signature at the
/// signer's current ledger nonce.
pub fn validate<P: typed_data::SignedPayload>(
    host: &dyn Host,
    target: &dyn RelayTarget,
    domain: &RelayDomain,
    request: &ForwardRequest<P>,
    ledger_nonce: U256,
) -> Validation {
    let trusted = probe_trust(host, target, domain.verifying_contract).supported;
    let active = request.deadline >= host.timestamp();

    let digest = typed_data::request_digest(domain, request, ledger_nonce);
    let (signer_match, signer) = match recover_signer(digest, &request.signature) {
        Ok(recovered) => (recovered == request.signer, Some(recovered)),
        Err(err) => {
            debug!(%err, "signature recovery failed");
            (false, None)
        }
    };

    Validation { trusted, active, signer_match, signer }
}
