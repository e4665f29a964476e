//! EIP-712 digest computation for the generic signed-request envelope.
//!
//! All five request shapes share the envelope fields (signer, target, relay nonce,
//! deadline, gas); each payload type contributes its own tail of the type string and
//! struct encoding. Keeping one digest path for every shape prevents the
//! near-duplicate request flows from drifting apart.

use alloy_primitives::{keccak256, Address, B256, U256};

use crate::types::{
    BatchPayload, ChangeRecoveryPolicyPayload, ChangeTxPolicyPayload, DeployPayload,
    ExecutePayload, ForwardRequest, RelayDomain,
};

/// Payload-specific half of the typed-data descriptor.
pub trait SignedPayload {
    /// Full EIP-712 type string of this request shape, envelope fields included.
    const TYPE_STRING: &'static [u8];

    /// Append this payload's struct-hash words (32 bytes each) to `out`.
    /// Dynamic `bytes` fields enter as their keccak256, per EIP-712.
    fn encode_fields(&self, out: &mut Vec<u8>);
}

/// Domain separator binding signatures to {name, version, chain id, dispatcher}.
pub fn domain_separator(domain: &RelayDomain) -> B256 {
    let type_hash = keccak256(
        b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
    );

    let mut buf = Vec::with_capacity(32 * 5);
    buf.extend_from_slice(type_hash.as_slice());
    buf.extend_from_slice(keccak256(domain.name.as_bytes()).as_slice());
    buf.extend_from_slice(keccak256(domain.version.as_bytes()).as_slice());
    buf.extend_from_slice(&U256::from(domain.chain_id).to_be_bytes::<32>());
    buf.extend_from_slice(&word_address(domain.verifying_contract));
    keccak256(buf)
}

/// Digest the signer must have produced for this request at `ledger_nonce`:
/// `keccak256("\x19\x01" || domainSeparator || structHash)`.
pub fn request_digest<P: SignedPayload>(
    domain: &RelayDomain,
    request: &ForwardRequest<P>,
    ledger_nonce: U256,
) -> B256 {
    let type_hash = keccak256(P::TYPE_STRING);

    let mut buf = Vec::with_capacity(32 * 8);
    buf.extend_from_slice(type_hash.as_slice());
    buf.extend_from_slice(&word_address(request.signer));
    buf.extend_from_slice(&word_address(request.target));
    buf.extend_from_slice(&ledger_nonce.to_be_bytes::<32>());
    buf.extend_from_slice(&word_u64(request.deadline));
    buf.extend_from_slice(&word_u64(request.gas));
    request.payload.encode_fields(&mut buf);
    let struct_hash = keccak256(buf);

    let mut outer = Vec::with_capacity(2 + 32 + 32);
    outer.extend_from_slice(b"\x19\x01");
    outer.extend_from_slice(domain_separator(domain).as_slice());
    outer.extend_from_slice(struct_hash.as_slice());
    keccak256(outer)
}

pub fn word_address(a: Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..32].copy_from_slice(a.as_slice());
    word
}

pub fn word_u64(x: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..32].copy_from_slice(&x.to_be_bytes());
    word
}

/// EIP-712 array of addresses: keccak over the concatenated padded elements.
fn hash_address_array(items: &[Address]) -> B256 {
    let mut buf = Vec::with_capacity(items.len() * 32);
    for a in items {
        buf.extend_from_slice(&word_address(*a));
    }
    keccak256(buf)
}

fn hash_u256_array(items: &[U256]) -> B256 {
    let mut buf = Vec::with_capacity(items.len() * 32);
    for v in items {
        buf.extend_from_slice(&v.to_be_bytes::<32>());
    }
    keccak256(buf)
}

/// EIP-712 array of `bytes`: keccak over the concatenated per-element hashes.
fn hash_bytes_array(items: &[alloy_primitives::Bytes]) -> B256 {
    let mut buf = Vec::with_capacity(items.len() * 32);
    for b in items {
        buf.extend_from_slice(keccak256(b).as_slice());
    }
    keccak256(buf)
}

impl SignedPayload for ExecutePayload {
    const TYPE_STRING: &'static [u8] =
        b"ForwardExecute(address signer,address wallet,uint256 nonce,uint64 deadline,\
          uint64 gas,bytes proof,address to,uint256 value,bytes data,uint256 feeRate,\
          address feeToken)";

    fn encode_fields(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(keccak256(&self.proof).as_slice());
        out.extend_from_slice(&word_address(self.to));
        out.extend_from_slice(&self.value.to_be_bytes::<32>());
        out.extend_from_slice(keccak256(&self.data).as_slice());
        out.extend_from_slice(&self.fee.rate.to_be_bytes::<32>());
        out.extend_from_slice(&word_address(self.fee.token));
    }
}

impl SignedPayload for BatchPayload {
    const TYPE_STRING: &'static [u8] =
        b"ForwardExecuteBatch(address signer,address wallet,uint256 nonce,uint64 deadline,\
          uint64 gas,bytes proof,address[] targets,uint256[] values,bytes[] datas,\
          uint256 feeRate,address feeToken)";

    fn encode_fields(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(keccak256(&self.proof).as_slice());
        out.extend_from_slice(hash_address_array(&self.targets).as_slice());
        out.extend_from_slice(hash_u256_array(&self.values).as_slice());
        out.extend_from_slice(hash_bytes_array(&self.datas).as_slice());
        out.extend_from_slice(&self.fee.rate.to_be_bytes::<32>());
        out.extend_from_slice(&word_address(self.fee.token));
    }
}

impl SignedPayload for ChangeTxPolicyPayload {
    const TYPE_STRING: &'static [u8] =
        b"ForwardChangeTxPolicy(address signer,address wallet,uint256 nonce,\
          uint64 deadline,uint64 gas,bytes proof,bytes32 newCommitment)";

    fn encode_fields(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(keccak256(&self.proof).as_slice());
        out.extend_from_slice(self.new_commitment.as_slice());
    }
}

impl SignedPayload for ChangeRecoveryPolicyPayload {
    const TYPE_STRING: &'static [u8] =
        b"ForwardChangeRecoveryPolicy(address signer,address wallet,uint256 nonce,\
          uint64 deadline,uint64 gas,bytes proof,bytes32 newCommitment)";

    fn encode_fields(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(keccak256(&self.proof).as_slice());
        out.extend_from_slice(self.new_commitment.as_slice());
    }
}

impl SignedPayload for DeployPayload {
    const TYPE_STRING: &'static [u8] =
        b"ForwardDeploy(address signer,address factory,uint256 nonce,uint64 deadline,\
          uint64 gas,bytes initCode,bytes32 salt)";

    fn encode_fields(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(keccak256(&self.init_code).as_slice());
        out.extend_from_slice(self.salt.as_slice());
    }
}
