//! Protocol constants shared by the wallet ABI surface and the dispatcher.

use alloy_primitives::U256;

// Outcome words returned by the wallet's calldata entry (zero = success, like the
// validation-data convention the relay decodes against).
pub const OUTCOME_SUCCESS: U256 = U256::ZERO;
pub const OUTCOME_PROOF_INVALID: U256 = U256::from_limbs([1, 0, 0, 0]);
pub const OUTCOME_CALL_FAILED: U256 = U256::from_limbs([2, 0, 0, 0]);
pub const OUTCOME_LENGTH_MISMATCH: U256 = U256::from_limbs([3, 0, 0, 0]);
pub const OUTCOME_INSUFFICIENT_BALANCE: U256 = U256::from_limbs([4, 0, 0, 0]);
pub const OUTCOME_FEE_TRANSFER_FAILED: U256 = U256::from_limbs([5, 0, 0, 0]);
pub const OUTCOME_DUPLICATE_PROOF: U256 = U256::from_limbs([6, 0, 0, 0]);

/// ERC-2771 style sender suffix appended to relayed calldata.
pub const SENDER_SUFFIX_LEN: usize = 20;

/// Flat gas overhead added on top of metered usage when pricing relay fees
/// (base transaction cost plus the fee-accounting epilogue itself).
pub const FEE_BASE_OVERHEAD: u64 = 35_000;

/// An execution environment keeps `remaining / RESERVED_FRACTION` of available gas
/// back from a sub-call, so at most 63/64 can be forwarded.
pub const GAS_RESERVED_FRACTION: u64 = 64;

/// Denominator of the post-call integrity bound: a relayed call that was granted
/// its full requested gas can never end with less than `requested / 63` left.
pub const GAS_FORWARD_DENOMINATOR: u64 = 63;
