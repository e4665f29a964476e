//! ECDSA signer recovery over request digests.
//!
//! Accepts signatures with v in {0, 1, 27, 28} and normalizes high-s forms before
//! recovery, matching what an `ecrecover`-style verifier tolerates on the wire.

use alloy_primitives::{keccak256, Address, B256};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

use crate::errors::SignatureError;

/// Recover the EOA address that produced `sig` over `digest`.
///
/// `sig` must be 65 bytes, `r || s || v`. On any error the caller must not use an
/// address; there is no "zero address" escape hatch here.
pub fn recover_signer(digest: B256, sig: &[u8]) -> Result<Address, SignatureError> {
    if sig.len() != 65 {
        return Err(SignatureError::BadLength);
    }

    let v_raw = sig[64];
    let parity = match v_raw {
        27 | 28 => v_raw - 27,
        0 | 1 => v_raw,
        _ => return Err(SignatureError::BadRecoveryId(v_raw)),
    };

    let signature =
        Signature::from_slice(&sig[..64]).map_err(|_| SignatureError::OutOfRange)?;

    // Recovery requires low-s form; flip the parity bit when normalizing.
    let (signature, parity) = match signature.normalize_s() {
        Some(normalized) => (normalized, parity ^ 1),
        None => (signature, parity),
    };
    let recovery_id =
        RecoveryId::from_byte(parity).ok_or(SignatureError::BadRecoveryId(v_raw))?;

    let key = VerifyingKey::recover_from_prehash(digest.as_slice(), &signature, recovery_id)
        .map_err(|_| SignatureError::Unrecoverable)?;

    Ok(address_of_key(&key))
}

/// Ethereum address of a secp256k1 public key: low 20 bytes of the keccak256 of the
/// uncompressed point (without the 0x04 tag).
pub fn address_of_key(key: &VerifyingKey) -> Address {
    let encoded = key.to_encoded_point(false);
    let hash = keccak256(&encoded.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::SigningKey;

    fn test_key() -> SigningKey {
        SigningKey::from_slice(&[0x42u8; 32]).unwrap()
    }

    fn sign(key: &SigningKey, digest: B256) -> [u8; 65] {
        let (sig, recid) = key.sign_prehash_recoverable(digest.as_slice()).unwrap();
        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&sig.to_bytes());
        out[64] = 27 + recid.to_byte();
        out
    }

    #[test]
    fn recovers_the_signing_address() {
        let key = test_key();
        let digest = keccak256(b"request digest");
        let sig = sign(&key, digest);
        let recovered = recover_signer(digest, &sig).unwrap();
        assert_eq!(recovered, address_of_key(key.verifying_key()));
    }

    #[test]
    fn accepts_raw_parity_v() {
        let key = test_key();
        let digest = keccak256(b"another digest");
        let mut sig = sign(&key, digest);
        sig[64] -= 27; // 27/28 -> 0/1
        let recovered = recover_signer(digest, &sig).unwrap();
        assert_eq!(recovered, address_of_key(key.verifying_key()));
    }

    #[test]
    fn rejects_bad_length_and_bad_v() {
        let digest = keccak256(b"digest");
        assert_eq!(recover_signer(digest, &[0u8; 64]), Err(SignatureError::BadLength));

        let key = test_key();
        let mut sig = sign(&key, digest);
        sig[64] = 29;
        assert_eq!(recover_signer(digest, &sig), Err(SignatureError::BadRecoveryId(29)));
    }

    #[test]
    fn tampered_digest_recovers_a_different_address() {
        let key = test_key();
        let digest = keccak256(b"signed digest");
        let sig = sign(&key, digest);
        let other = keccak256(b"unsigned digest");
        match recover_signer(other, &sig) {
            Ok(addr) => assert_ne!(addr, address_of_key(key.verifying_key())),
            Err(_) => {}
        }
    }

    #[test]
    fn zero_signature_does_not_recover() {
        let digest = keccak256(b"digest");
        let sig = [0u8; 65];
        assert!(recover_signer(digest, &sig).is_err());
    }
}
