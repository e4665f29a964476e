//! Consumed-proof set for server-issued proofs.
//!
//! Cross-chain proofs are not bound to the wallet-local nonce, so this append-only
//! fingerprint set is the *only* replay defense on that path. The fingerprint is
//! keccak256 over the full proof bytes; any single-byte difference yields a fresh
//! fingerprint, and collisions are as hard as keccak.

use std::collections::BTreeSet;

use alloy_primitives::{keccak256, B256};

#[derive(Debug, Default, Clone)]
pub struct ConsumedProofSet {
    seen: BTreeSet<B256>,
}

impl ConsumedProofSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collision-resistant fingerprint of a full proof blob.
    pub fn fingerprint(proof: &[u8]) -> B256 {
        keccak256(proof)
    }

    pub fn is_duplicate(&self, fingerprint: &B256) -> bool {
        self.seen.contains(fingerprint)
    }

    /// Record a fingerprint. Must happen before any privileged use of the proof.
    pub fn record(&mut self, fingerprint: B256) {
        self.seen.insert(fingerprint);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorded_fingerprints_are_duplicates_forever() {
        let mut set = ConsumedProofSet::new();
        let fp = ConsumedProofSet::fingerprint(b"server proof");
        assert!(!set.is_duplicate(&fp));

        set.record(fp);
        assert!(set.is_duplicate(&fp));

        // Recording again is idempotent, never clearing.
        set.record(fp);
        assert!(set.is_duplicate(&fp));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn fingerprints_cover_the_full_proof_bytes() {
        let a = ConsumedProofSet::fingerprint(b"proof-bytes-a");
        let b = ConsumedProofSet::fingerprint(b"proof-bytes-b");
        let truncated = ConsumedProofSet::fingerprint(b"proof-bytes-");
        assert_ne!(a, b);
        assert_ne!(a, truncated);
    }
}
