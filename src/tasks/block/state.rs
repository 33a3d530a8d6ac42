//! The state transition seam, and a value-transfer ledger implementing it.
use crate::{
    primitives::{PendingHeader, PoolTx},
    tasks::block::CommitError,
};
use alloy::{
    consensus::{Transaction, transaction::SignerRecoverable},
    primitives::{Address, U256},
};
use std::collections::{HashMap, HashSet};

/// Base cost of every transaction.
const TX_GAS: u64 = 21_000;
/// Base cost of a contract creation.
const TX_CREATE_GAS: u64 = 53_000;
const CALLDATA_ZERO_BYTE_GAS: u64 = 4;
const CALLDATA_NONZERO_BYTE_GAS: u64 = 16;

/// Result of applying a single transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutedTx {
    /// Gas consumed.
    pub gas_used: u64,
    /// False if the transaction reverted. A reverted transaction still
    /// consumes gas and pays fees.
    pub success: bool,
    /// Value credited to the block's fee recipient.
    pub coinbase_value: U256,
}

/// Applies transactions to a state.
///
/// Implementations must leave `state` untouched when returning an error.
/// Gas pool accounting and the blacklist are enforced by the caller.
pub trait StateTransition {
    /// The state transactions are applied to.
    type State: Clone;

    /// Apply `tx` on top of `state` in the block described by `header`.
    fn apply_tx(
        &self,
        state: &mut Self::State,
        header: &PendingHeader,
        tx: &PoolTx,
    ) -> Result<ExecutedTx, CommitError>;
}

/// Balance and nonce of an account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Account {
    /// Balance in wei.
    pub balance: U256,
    /// Number of transactions sent.
    pub nonce: u64,
}

/// An in-memory account ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    accounts: HashMap<Address, Account>,
    reverting: HashSet<Address>,
}

impl Ledger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the balance and nonce of `address`.
    pub fn with_account(mut self, address: Address, balance: U256, nonce: u64) -> Self {
        self.accounts.insert(address, Account { balance, nonce });
        self
    }

    /// Mark `address` as a contract whose calls always revert.
    pub fn with_reverting_contract(mut self, address: Address) -> Self {
        self.reverting.insert(address);
        self
    }

    /// Get the account at `address`. Unknown accounts are empty.
    pub fn account(&self, address: Address) -> Account {
        self.accounts.get(&address).copied().unwrap_or_default()
    }

    /// Balance of `address`.
    pub fn balance(&self, address: Address) -> U256 {
        self.account(address).balance
    }

    /// Nonce of `address`.
    pub fn nonce(&self, address: Address) -> u64 {
        self.account(address).nonce
    }

    fn account_mut(&mut self, address: Address) -> &mut Account {
        self.accounts.entry(address).or_default()
    }
}

/// Executes plain value transfers against a [`Ledger`].
///
/// Gas used is the intrinsic gas of the transaction. Calls to an address
/// registered with [`Ledger::with_reverting_contract`] revert: fees are
/// charged and the nonce advances, but no value moves.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferExecutor;

impl StateTransition for TransferExecutor {
    type State = Ledger;

    fn apply_tx(
        &self,
        state: &mut Ledger,
        header: &PendingHeader,
        tx: &PoolTx,
    ) -> Result<ExecutedTx, CommitError> {
        let sender = tx.signer();
        match tx.inner().recover_signer() {
            Ok(recovered) if recovered == sender => {}
            _ => return Err(CommitError::InvalidSignature),
        }

        let account = state.account(sender);
        if tx.nonce() < account.nonce {
            return Err(CommitError::NonceTooLow { expected: account.nonce, got: tx.nonce() });
        }
        if tx.nonce() > account.nonce {
            return Err(CommitError::NonceTooHigh { expected: account.nonce, got: tx.nonce() });
        }

        let intrinsic = intrinsic_gas(tx.input(), tx.kind().is_create());
        if tx.gas_limit() < intrinsic {
            return Err(CommitError::IntrinsicGasTooLow { have: tx.gas_limit(), want: intrinsic });
        }

        let tip = tx.effective_tip_per_gas(header.base_fee).ok_or(CommitError::FeeCapTooLow)?;
        let gas_price = U256::from(tx.effective_gas_price(Some(header.base_fee)));

        // a cost that does not fit in 256 bits is never affordable
        let max_cost = U256::from(tx.gas_limit())
            .checked_mul(gas_price)
            .and_then(|gas_cost| gas_cost.checked_add(tx.value()))
            .ok_or(CommitError::InsufficientFunds { have: account.balance, want: U256::MAX })?;
        if account.balance < max_cost {
            return Err(CommitError::InsufficientFunds { have: account.balance, want: max_cost });
        }

        let gas_used = intrinsic;
        let fee = U256::from(gas_used) * gas_price;
        let success = !tx.to().is_some_and(|to| state.reverting.contains(&to));
        let value = if success { tx.value() } else { U256::ZERO };
        let mut coinbase_value = U256::from(gas_used) * U256::from(tip);

        let from = state.account_mut(sender);
        from.balance -= fee + value;
        from.nonce += 1;

        if let Some(to) = tx.to() {
            let to_account = state.account_mut(to);
            to_account.balance = to_account.balance.saturating_add(value);
            if to == header.fee_recipient {
                coinbase_value += value;
            }
        }
        let fee_recipient = state.account_mut(header.fee_recipient);
        fee_recipient.balance =
            fee_recipient.balance.saturating_add(U256::from(gas_used) * U256::from(tip));

        Ok(ExecutedTx { gas_used, success, coinbase_value })
    }
}

/// Gas charged before execution starts.
pub fn intrinsic_gas(input: &[u8], is_create: bool) -> u64 {
    let base = if is_create { TX_CREATE_GAS } else { TX_GAS };
    input.iter().fold(base, |gas, byte| {
        gas + if *byte == 0 { CALLDATA_ZERO_BYTE_GAS } else { CALLDATA_NONZERO_BYTE_GAS }
    })
}
