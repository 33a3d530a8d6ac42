//! Greedy merge of transactions and bundles into a block.
use crate::{
    primitives::{BuiltBlock, Order, PoolTx, SimulatedBundle},
    tasks::block::{
        BlockEnvironment, CommitError, Disposition, OrderedSupply, SpeculativeEnv,
        StateTransition,
    },
};
use alloy::primitives::Address;
use metrics::{counter, histogram};
use std::{
    collections::{HashMap, HashSet},
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

/// Why the build loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    /// The supply was exhausted.
    Done,
    /// The interrupt fired before a bundle commit.
    Cancelled,
}

/// Result of a single greedy build.
#[derive(Debug, Clone)]
pub struct BuildOutcome<S> {
    /// The sealed block.
    pub block: BuiltBlock,
    /// State after the last included order.
    pub state: S,
    /// Bundles included in the block, in inclusion order.
    pub used_bundles: Vec<SimulatedBundle>,
    /// Why the build stopped.
    pub status: BuildStatus,
    /// Transactions offered to the environment.
    pub txs_considered: usize,
    /// Bundles offered to the environment.
    pub bundles_considered: usize,
}

impl<S> BuildOutcome<S> {
    /// True if the build was cut short by the interrupt.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.status, BuildStatus::Cancelled)
    }
}

/// Builds blocks by repeatedly committing the best remaining order.
///
/// A builder is tied to one block environment. Call [`GreedyBuilder::build`]
/// again when new orders arrive.
#[derive(Debug, Clone)]
pub struct GreedyBuilder<E: StateTransition> {
    executor: E,
    env: BlockEnvironment<E::State>,
    interrupt: CancellationToken,
    blacklist: HashSet<Address>,
}

impl<E> GreedyBuilder<E>
where
    E: StateTransition + Clone,
{
    /// Create a new builder.
    pub const fn new(
        executor: E,
        env: BlockEnvironment<E::State>,
        interrupt: CancellationToken,
        blacklist: HashSet<Address>,
    ) -> Self {
        Self { executor, env, interrupt, blacklist }
    }

    /// The interrupt checked before every bundle commit.
    pub const fn interrupt(&self) -> &CancellationToken {
        &self.interrupt
    }

    /// Build a block from `bundles` and the per-sender transactions in
    /// `txs`.
    #[instrument(skip_all, fields(
        slot = self.env.header.slot,
        number = self.env.header.number,
        bundles = bundles.len(),
        senders = txs.len(),
    ))]
    pub fn build(
        &self,
        bundles: Vec<SimulatedBundle>,
        txs: HashMap<Address, Vec<PoolTx>>,
    ) -> BuildOutcome<E::State> {
        let start = Instant::now();

        let mut supply = OrderedSupply::new(txs, bundles, self.env.header.base_fee);
        let mut env = SpeculativeEnv::new(self.executor.clone(), self.env.clone())
            .with_blacklist(self.blacklist.clone());

        let mut used_bundles = Vec::new();
        let mut txs_considered = 0;
        let mut bundles_considered = 0;

        let status = loop {
            let Some(order) = supply.peek() else { break BuildStatus::Done };

            match order {
                Order::Tx(tx) => {
                    txs_considered += 1;
                    let tx_hash = *tx.tx_hash();

                    let (disposition, result) = env.commit_tx(tx);
                    match disposition {
                        Disposition::Keep | Disposition::SkipSender => supply.shift(),
                        Disposition::Drop => supply.pop(),
                    };

                    match result {
                        Ok(receipt) => {
                            counter!("builder.included_txs").increment(1);
                            trace!(
                                %tx_hash,
                                gas_used = receipt.gas_used,
                                coinbase_value = %receipt.coinbase_value,
                                "included tx"
                            );
                        }
                        Err(err) => trace!(%tx_hash, %err, ?disposition, "could not apply tx"),
                    }
                }
                Order::Bundle(bundle) => {
                    bundles_considered += 1;

                    match env.commit_bundle(bundle, &self.interrupt) {
                        Err(CommitError::Interrupted) => {
                            debug!(bundle = %bundle.hash(), "interrupted, sealing partial block");
                            break BuildStatus::Cancelled;
                        }
                        Err(err) => {
                            counter!("builder.failed_bundles").increment(1);
                            trace!(bundle = %bundle.hash(), %err, "could not apply bundle");
                            supply.pop();
                        }
                        Ok(()) => {
                            if let Some(Order::Bundle(bundle)) = supply.pop() {
                                counter!("builder.included_bundles").increment(1);
                                trace!(
                                    bundle = %bundle.hash(),
                                    txs = bundle.bundle.txs.len(),
                                    mev_gas_price = %bundle.mev_gas_price,
                                    "included bundle"
                                );
                                used_bundles.push(bundle);
                            }
                        }
                    }
                }
            }
        };

        let (block, state) = env.finalize();

        histogram!("builder.build_time_ms").record(start.elapsed().as_millis() as f64);
        debug!(
            ?status,
            tx_count = block.tx_count(),
            used_bundles = used_bundles.len(),
            gas_used = block.gas_used(),
            value = %block.value,
            "block built"
        );

        BuildOutcome { block, state, used_bundles, status, txs_considered, bundles_considered }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        primitives::MevBundle,
        tasks::block::TransferExecutor,
        test_utils::{TestAccounts, create_transfer_tx, test_builder},
    };
    use alloy::primitives::U256;

    const BASE_FEE: u64 = 10;

    fn builder(accounts: &TestAccounts) -> GreedyBuilder<TransferExecutor> {
        test_builder(accounts, BASE_FEE, CancellationToken::new())
    }

    #[test]
    fn empty_supply_builds_empty_block() {
        let accounts = TestAccounts::new();
        let outcome = builder(&accounts).build(vec![], HashMap::new());

        assert_eq!(outcome.status, BuildStatus::Done);
        assert!(outcome.block.is_empty());
        assert_eq!(outcome.block.gas_used(), 0);
        assert_eq!(outcome.txs_considered, 0);
    }

    #[test]
    fn failed_bundle_is_dropped_and_build_continues() {
        let accounts = TestAccounts::new();
        let good = create_transfer_tx(&accounts.alice, Address::ZERO, U256::ZERO, 0, 1, 3).unwrap();
        // bob has no transaction with nonce 5 pending, so this never applies
        let bad = create_transfer_tx(&accounts.bob, Address::ZERO, U256::ZERO, 5, 1, 3).unwrap();
        let bundle = SimulatedBundle::new(MevBundle::new(vec![bad], 1), 21_000, U256::from(1_000_000));

        let outcome = builder(&accounts)
            .build(vec![bundle], HashMap::from([(accounts.alice_address(), vec![good])]));

        assert_eq!(outcome.status, BuildStatus::Done);
        assert!(outcome.used_bundles.is_empty());
        assert_eq!(outcome.bundles_considered, 1);
        assert_eq!(outcome.block.tx_count(), 1);
    }

    #[test]
    fn nonce_gap_skips_to_next_tx() {
        let accounts = TestAccounts::new();
        let gapped = vec![
            create_transfer_tx(&accounts.alice, Address::ZERO, U256::ZERO, 1, 1, 3).unwrap(),
            create_transfer_tx(&accounts.alice, Address::ZERO, U256::ZERO, 2, 1, 3).unwrap(),
        ];

        let outcome =
            builder(&accounts).build(vec![], HashMap::from([(accounts.alice_address(), gapped)]));

        // each gapped tx is offered in turn, none applies
        assert!(outcome.block.is_empty());
        assert_eq!(outcome.txs_considered, 2);
    }
}
