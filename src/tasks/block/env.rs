//! Speculative block environment: an immutable base plus a mergeable delta.
use crate::{
    primitives::{BuiltBlock, PendingHeader, PoolTx, SimulatedBundle, TxReceipt, per_gas},
    tasks::block::{CommitError, Disposition, StateTransition},
};
use alloy::{
    consensus::{
        Header, Transaction, TxEnvelope,
        proofs::{calculate_transaction_root, calculate_withdrawals_root},
    },
    primitives::{Address, U256},
};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Percentage of the simulated coinbase price a bundle must still pay when
/// committed.
const BUNDLE_PRICE_FLOOR_PERCENT: u64 = 99;

/// The header of the block under construction and the state it builds on.
#[derive(Debug, Clone)]
pub struct BlockEnvironment<S> {
    /// The pending header.
    pub header: PendingHeader,
    /// The pre-state.
    pub state: S,
}

impl<S> BlockEnvironment<S> {
    /// Create a new environment.
    pub const fn new(header: PendingHeader, state: S) -> Self {
        Self { header, state }
    }
}

/// Everything a speculative environment has accumulated on top of its base.
#[derive(Debug, Clone)]
pub struct EnvDelta<S> {
    state: S,
    gas_pool: u64,
    gas_used: u64,
    coinbase_value: U256,
    txs: Vec<PoolTx>,
    receipts: Vec<TxReceipt>,
}

impl<S> EnvDelta<S> {
    fn new(state: S, gas_limit: u64) -> Self {
        Self {
            state,
            gas_pool: gas_limit,
            gas_used: 0,
            coinbase_value: U256::ZERO,
            txs: Vec::new(),
            receipts: Vec::new(),
        }
    }

    fn apply_tx<E>(
        &mut self,
        executor: &E,
        header: &PendingHeader,
        blacklist: &HashSet<Address>,
        tx: &PoolTx,
    ) -> Result<TxReceipt, CommitError>
    where
        E: StateTransition<State = S>,
    {
        let sender = tx.signer();
        if blacklist.contains(&sender) {
            return Err(CommitError::Blacklisted(sender));
        }
        if let Some(to) = tx.to() {
            if blacklist.contains(&to) {
                return Err(CommitError::Blacklisted(to));
            }
        }

        let gas_limit = tx.gas_limit();
        if self.gas_pool < gas_limit {
            return Err(CommitError::GasLimitReached { needed: gas_limit, remaining: self.gas_pool });
        }

        let executed = executor.apply_tx(&mut self.state, header, tx)?;

        self.gas_pool -= executed.gas_used;
        self.gas_used += executed.gas_used;
        self.coinbase_value += executed.coinbase_value;

        let receipt = TxReceipt {
            tx_hash: *tx.tx_hash(),
            success: executed.success,
            gas_used: executed.gas_used,
            cumulative_gas_used: self.gas_used,
            coinbase_value: executed.coinbase_value,
        };
        self.txs.push(tx.clone());
        self.receipts.push(receipt);

        Ok(receipt)
    }
}

/// A block environment that orders can be speculatively committed to.
///
/// Every commit either lands completely or leaves the environment as it was.
/// [`SpeculativeEnv::finalize`] consumes the environment, so a block is
/// sealed at most once.
pub struct SpeculativeEnv<E: StateTransition> {
    executor: E,
    header: PendingHeader,
    blacklist: HashSet<Address>,
    delta: EnvDelta<E::State>,
}

impl<E: StateTransition> core::fmt::Debug for SpeculativeEnv<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SpeculativeEnv")
            .field("number", &self.header.number)
            .field("gas_used", &self.delta.gas_used)
            .field("txs", &self.delta.txs.len())
            .finish_non_exhaustive()
    }
}

impl<E: StateTransition> SpeculativeEnv<E> {
    /// Create a speculative environment on top of `base`.
    pub fn new(executor: E, base: BlockEnvironment<E::State>) -> Self {
        let BlockEnvironment { header, state } = base;
        let delta = EnvDelta::new(state, header.gas_limit);
        Self { executor, header, blacklist: HashSet::new(), delta }
    }

    /// Reject transactions sent from or to any of `blacklist`.
    pub fn with_blacklist(mut self, blacklist: HashSet<Address>) -> Self {
        self.blacklist = blacklist;
        self
    }

    /// The pending header.
    pub const fn header(&self) -> &PendingHeader {
        &self.header
    }

    /// The current state, including all committed orders.
    pub const fn state(&self) -> &E::State {
        &self.delta.state
    }

    /// Gas left in the block.
    pub const fn gas_pool(&self) -> u64 {
        self.delta.gas_pool
    }

    /// Gas used so far.
    pub const fn gas_used(&self) -> u64 {
        self.delta.gas_used
    }

    /// Value paid to the fee recipient so far.
    pub const fn coinbase_value(&self) -> U256 {
        self.delta.coinbase_value
    }

    /// Committed transactions, in order.
    pub fn txs(&self) -> &[PoolTx] {
        &self.delta.txs
    }

    /// Receipts of the committed transactions.
    pub fn receipts(&self) -> &[TxReceipt] {
        &self.delta.receipts
    }

    /// Commit a single transaction.
    ///
    /// The returned [`Disposition`] tells the caller how to advance the
    /// sender's queue.
    pub fn commit_tx(&mut self, tx: &PoolTx) -> (Disposition, Result<TxReceipt, CommitError>) {
        match self.delta.apply_tx(&self.executor, &self.header, &self.blacklist, tx) {
            Ok(receipt) => (Disposition::Keep, Ok(receipt)),
            Err(err) => (err.disposition(), Err(err)),
        }
    }

    /// Commit every transaction of `bundle`, or none of them.
    ///
    /// Returns [`CommitError::Interrupted`] without touching the environment
    /// if `interrupt` has fired, and [`CommitError::BundleNotEligible`] if the
    /// bundle targets another block or timestamp window.
    pub fn commit_bundle(
        &mut self,
        bundle: &SimulatedBundle,
        interrupt: &CancellationToken,
    ) -> Result<(), CommitError> {
        if interrupt.is_cancelled() {
            return Err(CommitError::Interrupted);
        }

        let (number, timestamp) = (self.header.number, self.header.timestamp);
        if !bundle.bundle.is_eligible(number, timestamp) {
            return Err(CommitError::BundleNotEligible { number, timestamp });
        }

        let mut scratch = self.delta.clone();
        let gas_before = scratch.gas_used;
        let value_before = scratch.coinbase_value;

        for tx in &bundle.bundle.txs {
            let receipt = scratch.apply_tx(&self.executor, &self.header, &self.blacklist, tx)?;
            if !receipt.success && !bundle.bundle.may_revert(&receipt.tx_hash) {
                return Err(CommitError::BundleReverted(receipt.tx_hash));
            }
        }

        let used = scratch.gas_used - gas_before;
        if used.abs_diff(bundle.total_gas_used) > bundle.gas_tolerance {
            return Err(CommitError::BundleGasMismatch { simulated: bundle.total_gas_used, used });
        }

        let simulated = bundle.simulated_gas_price();
        let paid = per_gas(scratch.coinbase_value - value_before, used);
        if paid * U256::from(100) < simulated * U256::from(BUNDLE_PRICE_FLOOR_PERCENT) {
            return Err(CommitError::BundleUnderpaid { simulated, paid });
        }

        trace!(bundle = %bundle.hash(), gas_used = used, "bundle committed");
        self.delta = scratch;
        Ok(())
    }

    /// Seal the block, returning it together with the post-state.
    pub fn finalize(self) -> (BuiltBlock, E::State) {
        let Self { header: pending, delta, .. } = self;

        let envelopes: Vec<TxEnvelope> = delta.txs.iter().map(|tx| tx.inner().clone()).collect();
        let withdrawals_root = pending.withdrawals.as_deref().map(calculate_withdrawals_root);

        let header = Header {
            parent_hash: pending.parent_hash,
            beneficiary: pending.fee_recipient,
            transactions_root: calculate_transaction_root(&envelopes),
            withdrawals_root,
            number: pending.number,
            gas_limit: pending.gas_limit,
            gas_used: delta.gas_used,
            timestamp: pending.timestamp,
            mix_hash: pending.prev_randao,
            base_fee_per_gas: Some(pending.base_fee),
            ..Default::default()
        };
        let hash = header.hash_slow();

        let block = BuiltBlock {
            slot: pending.slot,
            header,
            hash,
            transactions: delta.txs,
            receipts: delta.receipts,
            withdrawals: pending.withdrawals,
            value: delta.coinbase_value,
        };
        (block, delta.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        primitives::MevBundle,
        tasks::block::{Ledger, TransferExecutor},
        test_utils::{TEST_GAS_LIMIT, TestAccounts, create_transfer_tx, test_header},
    };
    use alloy::{eips::eip4895::Withdrawal, primitives::B256};

    const BASE_FEE: u64 = 10;
    const ETH: u128 = 1_000_000_000_000_000_000;

    fn funded(accounts: &TestAccounts) -> Ledger {
        accounts
            .addresses()
            .into_iter()
            .fold(Ledger::new(), |ledger, address| ledger.with_account(address, U256::from(ETH), 0))
    }

    fn env(accounts: &TestAccounts) -> SpeculativeEnv<TransferExecutor> {
        SpeculativeEnv::new(
            TransferExecutor,
            BlockEnvironment::new(test_header(BASE_FEE), funded(accounts)),
        )
    }

    #[test]
    fn commit_tx_accumulates() {
        let accounts = TestAccounts::new();
        let mut env = env(&accounts);
        let tx = create_transfer_tx(&accounts.alice, accounts.bob_address(), U256::from(1), 0, 1, 2)
            .unwrap();

        let (disposition, receipt) = env.commit_tx(&tx);
        assert_eq!(disposition, Disposition::Keep);
        assert_eq!(receipt.unwrap().cumulative_gas_used, 21_000);
        assert_eq!(env.gas_used(), 21_000);
        assert_eq!(env.coinbase_value(), U256::from(42_000));
        assert_eq!(env.txs().len(), 1);
    }

    #[test]
    fn blacklisted_recipient_is_dropped() {
        let accounts = TestAccounts::new();
        let mut env = env(&accounts).with_blacklist([accounts.bob_address()].into());
        let tx = create_transfer_tx(&accounts.alice, accounts.bob_address(), U256::from(1), 0, 1, 2)
            .unwrap();

        let (disposition, result) = env.commit_tx(&tx);
        assert_eq!(disposition, Disposition::Drop);
        assert_eq!(result, Err(CommitError::Blacklisted(accounts.bob_address())));
        assert_eq!(env.gas_used(), 0);
    }

    #[test]
    fn gas_pool_exhaustion_drops() {
        let accounts = TestAccounts::new();
        let mut header = test_header(BASE_FEE);
        header.gas_limit = 30_000;
        let mut env =
            SpeculativeEnv::new(TransferExecutor, BlockEnvironment::new(header, funded(&accounts)));

        let first = create_transfer_tx(&accounts.alice, Address::ZERO, U256::ZERO, 0, 1, 1).unwrap();
        let second = create_transfer_tx(&accounts.bob, Address::ZERO, U256::ZERO, 0, 1, 1).unwrap();

        assert!(env.commit_tx(&first).1.is_ok());
        let (disposition, result) = env.commit_tx(&second);
        assert_eq!(disposition, Disposition::Drop);
        assert_eq!(result, Err(CommitError::GasLimitReached { needed: 21_000, remaining: 9_000 }));
    }

    #[test]
    fn failing_bundle_leaves_no_trace() {
        let accounts = TestAccounts::new();
        let mut env = env(&accounts);

        let first = create_transfer_tx(&accounts.charlie, Address::ZERO, U256::ZERO, 0, 1, 4).unwrap();
        env.commit_tx(&first).1.unwrap();
        let gas_used = env.gas_used();
        let coinbase_value = env.coinbase_value();
        let receipts = env.receipts().to_vec();

        let ok = create_transfer_tx(&accounts.alice, Address::ZERO, U256::ZERO, 0, 1, 5).unwrap();
        // nonce gap makes the second transaction fail
        let bad = create_transfer_tx(&accounts.bob, Address::ZERO, U256::ZERO, 3, 1, 5).unwrap();
        let bundle = SimulatedBundle::new(MevBundle::new(vec![ok, bad], 1), 42_000, U256::from(210_000));

        let err = env.commit_bundle(&bundle, &CancellationToken::new()).unwrap_err();
        assert_eq!(err, CommitError::NonceTooHigh { expected: 0, got: 3 });
        assert_eq!(env.gas_used(), gas_used);
        assert_eq!(env.coinbase_value(), coinbase_value);
        assert_eq!(env.receipts(), receipts.as_slice());
        assert_eq!(env.txs().len(), 1);
        assert_eq!(env.gas_pool(), TEST_GAS_LIMIT - gas_used);
        assert_eq!(env.state().nonce(accounts.alice_address()), 0);
    }

    #[test]
    fn bundle_checks_revert_gas_and_price() {
        let accounts = TestAccounts::new();
        let target = Address::repeat_byte(0x99);
        let base = funded(&accounts).with_reverting_contract(target);
        let mut env = SpeculativeEnv::new(
            TransferExecutor,
            BlockEnvironment::new(test_header(BASE_FEE), base),
        );
        let interrupt = CancellationToken::new();

        let reverting = create_transfer_tx(&accounts.alice, target, U256::ZERO, 0, 1, 5).unwrap();
        let hash = *reverting.tx_hash();
        let bundle = MevBundle::new(vec![reverting], 1);

        let strict = SimulatedBundle::new(bundle.clone(), 21_000, U256::from(105_000));
        assert_eq!(env.commit_bundle(&strict, &interrupt), Err(CommitError::BundleReverted(hash)));

        let lenient = bundle.clone().with_reverting_tx(hash);
        let wrong_gas = SimulatedBundle::new(lenient.clone(), 30_000, U256::from(150_000));
        assert_eq!(
            env.commit_bundle(&wrong_gas, &interrupt),
            Err(CommitError::BundleGasMismatch { simulated: 30_000, used: 21_000 })
        );

        // simulated 10 wei per gas, committed pays 5
        let overpromised = SimulatedBundle::new(lenient.clone(), 21_000, U256::from(210_000));
        assert!(matches!(
            env.commit_bundle(&overpromised, &interrupt),
            Err(CommitError::BundleUnderpaid { .. })
        ));

        let honest = SimulatedBundle::new(lenient, 21_000, U256::from(105_000));
        assert_eq!(env.commit_bundle(&honest, &interrupt), Ok(()));
        assert_eq!(env.gas_used(), 21_000);
        assert!(!env.receipts()[0].success);
    }

    #[test]
    fn interrupted_bundle_is_not_applied() {
        let accounts = TestAccounts::new();
        let mut env = env(&accounts);
        let tx = create_transfer_tx(&accounts.alice, Address::ZERO, U256::ZERO, 0, 1, 5).unwrap();
        let bundle = SimulatedBundle::new(MevBundle::new(vec![tx], 1), 21_000, U256::from(105_000));

        let interrupt = CancellationToken::new();
        interrupt.cancel();
        assert_eq!(env.commit_bundle(&bundle, &interrupt), Err(CommitError::Interrupted));
        assert_eq!(env.gas_used(), 0);
    }

    #[test]
    fn bundle_outside_target_block_is_rejected() {
        let accounts = TestAccounts::new();
        let mut env = env(&accounts);
        let interrupt = CancellationToken::new();
        let timestamp = env.header().timestamp;
        let tx = create_transfer_tx(&accounts.alice, Address::ZERO, U256::ZERO, 0, 1, 5).unwrap();
        let simulated =
            |bundle: MevBundle| SimulatedBundle::new(bundle, 21_000, U256::from(105_000));

        let future_block = simulated(MevBundle::new(vec![tx.clone()], 2));
        assert_eq!(
            env.commit_bundle(&future_block, &interrupt),
            Err(CommitError::BundleNotEligible { number: 1, timestamp })
        );

        let too_early =
            simulated(MevBundle::new(vec![tx.clone()], 1).with_timestamps(Some(timestamp + 1), None));
        assert!(matches!(
            env.commit_bundle(&too_early, &interrupt),
            Err(CommitError::BundleNotEligible { .. })
        ));

        let expired =
            simulated(MevBundle::new(vec![tx.clone()], 1).with_timestamps(None, Some(timestamp - 1)));
        assert!(matches!(
            env.commit_bundle(&expired, &interrupt),
            Err(CommitError::BundleNotEligible { .. })
        ));
        assert_eq!(env.gas_used(), 0);
        assert!(env.receipts().is_empty());

        let in_window = simulated(
            MevBundle::new(vec![tx], 1).with_timestamps(Some(timestamp), Some(timestamp)),
        );
        assert_eq!(env.commit_bundle(&in_window, &interrupt), Ok(()));
        assert_eq!(env.gas_used(), 21_000);
    }

    #[test]
    fn finalize_seals_header() {
        let accounts = TestAccounts::new();
        let mut header = test_header(BASE_FEE);
        header.withdrawals = Some(vec![Withdrawal {
            index: 0,
            validator_index: 1,
            address: accounts.charlie_address(),
            amount: 32,
        }]);
        let mut env =
            SpeculativeEnv::new(TransferExecutor, BlockEnvironment::new(header, funded(&accounts)));

        let tx = create_transfer_tx(&accounts.alice, accounts.bob_address(), U256::from(7), 0, 1, 2)
            .unwrap();
        env.commit_tx(&tx).1.unwrap();

        let (block, state) = env.finalize();
        assert_eq!(block.gas_used(), 21_000);
        assert_eq!(block.tx_count(), 1);
        assert_eq!(block.value, U256::from(42_000));
        assert_eq!(block.hash, block.header.hash_slow());
        assert_ne!(block.header.transactions_root, B256::ZERO);
        assert!(block.header.withdrawals_root.is_some());
        assert_eq!(state.balance(accounts.bob_address()), U256::from(ETH + 7));
    }
}
