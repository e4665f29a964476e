//! Relay-layer nonce ledger.
//!
//! One strictly increasing counter per signer. `consume` is the final
//! read-then-write the dispatcher performs before the relayed call, so a reentrant
//! call mid-dispatch already observes the incremented value and fails signer-match
//! against the stale digest.

use std::collections::BTreeMap;

use alloy_primitives::{Address, U256};

#[derive(Debug, Default, Clone)]
pub struct NonceLedger {
    counters: BTreeMap<Address, U256>,
}

impl NonceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next nonce this signer's requests must embed.
    pub fn current(&self, signer: Address) -> U256 {
        self.counters.get(&signer).copied().unwrap_or(U256::ZERO)
    }

    /// Consume the signer's current nonce, returning the pre-increment value.
    pub fn consume(&mut self, signer: Address) -> U256 {
        let slot = self.counters.entry(signer).or_insert(U256::ZERO);
        let consumed = *slot;
        *slot += U256::from(1u64);
        consumed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn consume_yields_zero_to_n_minus_one_exactly_once() {
        let mut ledger = NonceLedger::new();
        let signer = address!("0000000000000000000000000000000000000001");

        let seen: Vec<U256> = (0..5).map(|_| ledger.consume(signer)).collect();
        let expected: Vec<U256> = (0u64..5).map(U256::from).collect();
        assert_eq!(seen, expected);
        assert_eq!(ledger.current(signer), U256::from(5u64));
    }

    #[test]
    fn counters_are_independent_per_signer() {
        let mut ledger = NonceLedger::new();
        let a = address!("0000000000000000000000000000000000000001");
        let b = address!("0000000000000000000000000000000000000002");

        assert_eq!(ledger.consume(a), U256::ZERO);
        assert_eq!(ledger.consume(a), U256::from(1u64));
        assert_eq!(ledger.consume(b), U256::ZERO);
        assert_eq!(ledger.current(a), U256::from(2u64));
        assert_eq!(ledger.current(b), U256::from(1u64));
    }
}
