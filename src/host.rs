//! Execution-environment abstraction.
//!
//! The wallet and dispatcher never touch ambient global state; everything they need
//! from the platform (time, chain identity, balances, message calls, rollback) goes
//! through the [`Host`] trait. [`InMemoryHost`] is the crate's reference host: an
//! in-memory chain with programmable callees, a built-in fungible-token ledger, and
//! snapshot-based rollback, which is what the integration tests drive.

use std::collections::BTreeMap;

use alloy_primitives::{Address, U256};
use alloy_sol_types::{sol_data, SolCall, SolType, SolValue};

use crate::{errors::CallFault, gas::GasMeter, interfaces::IERC20};

/// Platform surface available to the wallet and dispatcher.
pub trait Host {
    fn timestamp(&self) -> u64;
    fn chain_id(&self) -> u64;

    fn native_balance(&self, who: Address) -> U256;
    fn transfer_native(&mut self, from: Address, to: Address, value: U256)
        -> Result<(), CallFault>;

    /// Mutating message call. Gas is drawn from `meter`; a faulting call leaves
    /// balances and token state as they were before it started.
    fn call(
        &mut self,
        meter: &mut GasMeter,
        from: Address,
        target: Address,
        value: U256,
        input: &[u8],
    ) -> Result<Vec<u8>, CallFault>;

    /// Side-effect-free call (trust probes, balance reads).
    fn static_call(&self, target: Address, input: &[u8]) -> Result<Vec<u8>, CallFault>;

    /// Mark a rollback point covering balances and token state.
    fn snapshot(&mut self) -> usize;
    /// Restore state to a prior snapshot, discarding it and everything above it.
    fn revert_to(&mut self, snapshot: usize);
    /// Drop a snapshot that is no longer needed, keeping current state.
    fn discard_snapshot(&mut self, snapshot: usize);
}

/// A callable account the relay can be pointed at. The proof-gated wallet
/// implements this directly; [`crate::forwarder::FactoryTarget`] adapts a
/// host-registered callee.
pub trait RelayTarget {
    fn address(&self) -> Address;

    /// Side-effect-free probe entry (trust handshake).
    fn static_call(&self, host: &dyn Host, input: &[u8]) -> Result<Vec<u8>, CallFault>;

    /// Calldata entry for relayed (mutating) calls.
    fn call(
        &mut self,
        host: &mut dyn Host,
        meter: &mut GasMeter,
        sender: Address,
        input: &[u8],
    ) -> Result<Vec<u8>, CallFault>;
}

/// Gas charged for a built-in token operation.
const TOKEN_CALL_COST: u64 = 5_000;

/// One observed message call, kept for assertions and tracing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub input: Vec<u8>,
}

type CallHandler = Box<dyn FnMut(&[u8]) -> Result<Vec<u8>, CallFault>>;
type StaticHandler = Box<dyn Fn(&[u8]) -> Result<Vec<u8>, CallFault>>;

struct ProgrammedCallee {
    gas_cost: u64,
    handler: CallHandler,
}

type TokenLedger = BTreeMap<Address, BTreeMap<Address, U256>>;

/// In-memory reference host.
pub struct InMemoryHost {
    chain_id: u64,
    timestamp: u64,
    balances: BTreeMap<Address, U256>,
    tokens: TokenLedger,
    callees: BTreeMap<Address, ProgrammedCallee>,
    statics: BTreeMap<Address, StaticHandler>,
    snapshots: Vec<(BTreeMap<Address, U256>, TokenLedger)>,
    call_log: Vec<CallRecord>,
}

impl InMemoryHost {
    pub fn new(chain_id: u64, timestamp: u64) -> Self {
        Self {
            chain_id,
            timestamp,
            balances: BTreeMap::new(),
            tokens: BTreeMap::new(),
            callees: BTreeMap::new(),
            statics: BTreeMap::new(),
            snapshots: Vec::new(),
            call_log: Vec::new(),
        }
    }

    pub fn set_timestamp(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
    }

    pub fn advance_time(&mut self, seconds: u64) {
        self.timestamp += seconds;
    }

    pub fn credit_native(&mut self, who: Address, amount: U256) {
        let slot = self.balances.entry(who).or_insert(U256::ZERO);
        *slot += amount;
    }

    /// Register an empty built-in ERC-20 ledger at `token`.
    pub fn deploy_token(&mut self, token: Address) {
        self.tokens.entry(token).or_default();
    }

    pub fn mint_token(&mut self, token: Address, holder: Address, amount: U256) {
        let slot = self
            .tokens
            .entry(token)
            .or_default()
            .entry(holder)
            .or_insert(U256::ZERO);
        *slot += amount;
    }

    pub fn token_balance(&self, token: Address, holder: Address) -> U256 {
        self.tokens
            .get(&token)
            .and_then(|l| l.get(&holder))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    /// Register a mutating callee with a fixed gas cost per invocation.
    pub fn register_callee(
        &mut self,
        addr: Address,
        gas_cost: u64,
        handler: impl FnMut(&[u8]) -> Result<Vec<u8>, CallFault> + 'static,
    ) {
        self.callees
            .insert(addr, ProgrammedCallee { gas_cost, handler: Box::new(handler) });
    }

    /// Register a side-effect-free handler for static calls to `addr`.
    pub fn register_static_callee(
        &mut self,
        addr: Address,
        handler: impl Fn(&[u8]) -> Result<Vec<u8>, CallFault> + 'static,
    ) {
        self.statics.insert(addr, Box::new(handler));
    }

    pub fn calls(&self) -> &[CallRecord] {
        &self.call_log
    }

    fn token_call(
        &mut self,
        token: Address,
        caller: Address,
        input: &[u8],
    ) -> Result<Vec<u8>, CallFault> {
        let selector: [u8; 4] = input
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or(CallFault::Reverted)?;
        if selector == IERC20::transferCall::SELECTOR {
            let call =
                IERC20::transferCall::abi_decode(input, true).map_err(|_| CallFault::Reverted)?;
            let moved = self.move_token(token, caller, call.to, call.amount);
            return Ok(moved.abi_encode());
        }
        if selector == IERC20::transferFromCall::SELECTOR {
            let call = IERC20::transferFromCall::abi_decode(input, true)
                .map_err(|_| CallFault::Reverted)?;
            let moved = self.move_token(token, call.from, call.to, call.amount);
            return Ok(moved.abi_encode());
        }
        if selector == IERC20::balanceOfCall::SELECTOR {
            let call =
                IERC20::balanceOfCall::abi_decode(input, true).map_err(|_| CallFault::Reverted)?;
            return Ok(self.token_balance(token, call.owner).abi_encode());
        }
        if selector == IERC20::decimalsCall::SELECTOR {
            return Ok(sol_data::Uint::<8>::abi_encode(&18u8));
        }
        Err(CallFault::Reverted)
    }

    /// Move token balance; an uncovered transfer returns `false` (ERC-20 style)
    /// rather than reverting, so callers see a distinct transfer failure.
    fn move_token(&mut self, token: Address, from: Address, to: Address, amount: U256) -> bool {
        let ledger = match self.tokens.get_mut(&token) {
            Some(l) => l,
            None => return false,
        };
        let from_bal = ledger.get(&from).copied().unwrap_or(U256::ZERO);
        if from_bal < amount {
            return false;
        }
        ledger.insert(from, from_bal - amount);
        let to_bal = ledger.get(&to).copied().unwrap_or(U256::ZERO);
        ledger.insert(to, to_bal + amount);
        true
    }
}

impl Host for InMemoryHost {
    fn timestamp(&self) -> u64 {
        self.timestamp
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn native_balance(&self, who: Address) -> U256 {
        self.balances.get(&who).copied().unwrap_or(U256::ZERO)
    }

    fn transfer_native(
        &mut self,
        from: Address,
        to: Address,
        value: U256,
    ) -> Result<(), CallFault> {
        if value.is_zero() {
            return Ok(());
        }
        let from_bal = self.native_balance(from);
        if from_bal < value {
            return Err(CallFault::InsufficientValue);
        }
        self.balances.insert(from, from_bal - value);
        let to_bal = self.native_balance(to);
        self.balances.insert(to, to_bal + value);
        Ok(())
    }

    fn call(
        &mut self,
        meter: &mut GasMeter,
        from: Address,
        target: Address,
        value: U256,
        input: &[u8],
    ) -> Result<Vec<u8>, CallFault> {
        self.call_log.push(CallRecord {
            from,
            to: target,
            value,
            input: input.to_vec(),
        });

        let snap = self.snapshot();
        let result = (|| {
            self.transfer_native(from, target, value)?;
            if self.tokens.contains_key(&target) {
                meter.consume(TOKEN_CALL_COST)?;
                return self.token_call(target, from, input);
            }
            match self.callees.get_mut(&target) {
                Some(callee) => {
                    let cost = callee.gas_cost;
                    meter.consume(cost)?;
                    // Borrow dance: the handler cannot also borrow `self`.
                    (callee.handler)(input)
                }
                None => Err(CallFault::NoTarget),
            }
        })();

        match result {
            Ok(ret) => {
                self.discard_snapshot(snap);
                Ok(ret)
            }
            Err(fault) => {
                self.revert_to(snap);
                Err(fault)
            }
        }
    }

    fn static_call(&self, target: Address, input: &[u8]) -> Result<Vec<u8>, CallFault> {
        if self.tokens.contains_key(&target) {
            let selector: [u8; 4] = input
                .get(..4)
                .and_then(|s| s.try_into().ok())
                .ok_or(CallFault::Reverted)?;
            if selector == IERC20::balanceOfCall::SELECTOR {
                let call = IERC20::balanceOfCall::abi_decode(input, true)
                    .map_err(|_| CallFault::Reverted)?;
                return Ok(self.token_balance(target, call.owner).abi_encode());
            }
            if selector == IERC20::decimalsCall::SELECTOR {
                return Ok(sol_data::Uint::<8>::abi_encode(&18u8));
            }
            return Err(CallFault::Reverted);
        }
        match self.statics.get(&target) {
            Some(handler) => handler(input),
            None => Err(CallFault::NoTarget),
        }
    }

    fn snapshot(&mut self) -> usize {
        self.snapshots.push((self.balances.clone(), self.tokens.clone()));
        self.snapshots.len() - 1
    }

    fn revert_to(&mut self, snapshot: usize) {
        if let Some((balances, tokens)) = self.snapshots.get(snapshot).cloned() {
            self.balances = balances;
            self.tokens = tokens;
            self.snapshots.truncate(snapshot);
        }
    }

    fn discard_snapshot(&mut self, snapshot: usize) {
        self.snapshots.truncate(snapshot);
    }
}
