//! Gas metering and the forwarded-gas integrity check.
//!
//! The execution environment keeps back 1/64 of available gas when entering a
//! sub-call, so a relay that actually granted the requested gas can never finish the
//! outer call with less than `requested / 63` remaining. A relay that under-forwards
//! to starve the sub-call trips that bound and the whole operation is aborted with
//! the remaining budget consumed.

use crate::{
    constants::{GAS_FORWARD_DENOMINATOR, GAS_RESERVED_FRACTION},
    errors::{CallFault, GasIntegrityFault},
};

/// Linear gas budget for one call frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasMeter {
    remaining: u64,
}

impl GasMeter {
    pub fn new(budget: u64) -> Self {
        Self { remaining: budget }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Most gas a sub-call can receive from this frame (the 63/64 rule).
    pub fn forwardable(&self) -> u64 {
        self.remaining - self.remaining / GAS_RESERVED_FRACTION
    }

    /// Split off a child frame for a sub-call requesting `requested` gas. The child
    /// receives `min(requested, forwardable)`.
    pub fn child(&mut self, requested: u64) -> GasMeter {
        let granted = requested.min(self.forwardable());
        self.remaining -= granted;
        GasMeter::new(granted)
    }

    /// Return a finished child's unspent gas to this frame.
    pub fn absorb(&mut self, child: GasMeter) {
        self.remaining = self.remaining.saturating_add(child.remaining);
    }

    pub fn consume(&mut self, amount: u64) -> Result<(), CallFault> {
        if amount > self.remaining {
            self.remaining = 0;
            return Err(CallFault::OutOfGas);
        }
        self.remaining -= amount;
        Ok(())
    }

    /// Burn everything left. Used when a fatal fault must deny any refund.
    pub fn exhaust(&mut self) {
        self.remaining = 0;
    }
}

/// Post-call detector for under-forwarded gas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasIntegrity {
    fraction_denominator: u64,
}

impl GasIntegrity {
    pub const DEFAULT_DENOMINATOR: u64 = GAS_FORWARD_DENOMINATOR;

    pub fn new(fraction_denominator: u64) -> Self {
        debug_assert!(fraction_denominator > 0);
        Self { fraction_denominator }
    }

    /// Fault iff `gas_after_call < requested / denominator`. Callers must treat a
    /// fault as fatal for the entire outer operation, never as a soft result.
    pub fn check_forwarded(
        &self,
        gas_after_call: u64,
        requested: u64,
    ) -> Result<(), GasIntegrityFault> {
        if gas_after_call < requested / self.fraction_denominator {
            return Err(GasIntegrityFault { gas_after: gas_after_call, requested });
        }
        Ok(())
    }
}

impl Default for GasIntegrity {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DENOMINATOR)
    }
}
