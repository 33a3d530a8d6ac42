//! Tests for the greedy block builder.

use alloy::primitives::{Address, U256};
use builder::{
    primitives::{MevBundle, PendingHeader, PoolTx, SimulatedBundle},
    tasks::block::{
        BlockEnvironment, BuildStatus, CommitError, ExecutedTx, GreedyBuilder, Ledger,
        OrderedSupply, StateTransition, TransferExecutor,
    },
    test_utils::{
        DEFAULT_BALANCE, TestAccounts, by_sender, create_bundle, create_transfer_tx,
        funded_ledger, setup_logging, test_builder, test_header,
    },
};
use proptest::prelude::*;
use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio_util::sync::CancellationToken;

const BASE_FEE: u64 = 7;
const CHAIN_ID: u64 = 1;

fn transfer(signer: &alloy::signers::local::PrivateKeySigner, nonce: u64, tip: u128) -> PoolTx {
    create_transfer_tx(signer, Address::repeat_byte(0xaa), U256::from(1), nonce, CHAIN_ID, tip)
        .unwrap()
}

/// Sender X has A (nonce 0, tip 10) and B (nonce 1, tip 50). Bundle C pays
/// 30 per gas. B cannot overtake A, and C outranks A, so the block is C, A, B.
#[test]
fn bundle_outranks_cheaper_head_of_nonce_chain() {
    setup_logging();
    let accounts = TestAccounts::new();

    let a = transfer(&accounts.alice, 0, 10);
    let b = transfer(&accounts.alice, 1, 50);
    let c_tx = transfer(&accounts.bob, 0, 30);
    let c = create_bundle(vec![c_tx.clone()], 1, BASE_FEE);
    assert_eq!(c.mev_gas_price, U256::from(30));

    let outcome = test_builder(&accounts, BASE_FEE, CancellationToken::new())
        .build(vec![c], by_sender([b.clone(), a.clone()]));

    assert_eq!(outcome.status, BuildStatus::Done);
    assert_eq!(outcome.block.tx_hashes(), vec![*c_tx.tx_hash(), *a.tx_hash(), *b.tx_hash()]);
    assert_eq!(outcome.used_bundles.len(), 1);
    assert_eq!(outcome.txs_considered, 2);
    assert_eq!(outcome.bundles_considered, 1);
    assert_eq!(outcome.block.value, U256::from(21_000 * (30 + 10 + 50)));
}

/// A bundle whose second transaction fails lands nothing, and the standalone
/// transactions of its first sender are unaffected.
#[test]
fn failing_bundle_is_atomic() {
    let accounts = TestAccounts::new();

    let alice_in_bundle = transfer(&accounts.alice, 0, 90);
    let bob_gapped = transfer(&accounts.bob, 4, 90);
    let bundle = create_bundle(vec![alice_in_bundle, bob_gapped], 1, BASE_FEE);

    let alice_standalone = transfer(&accounts.alice, 0, 5);

    let outcome = test_builder(&accounts, BASE_FEE, CancellationToken::new())
        .build(vec![bundle], by_sender([alice_standalone.clone()]));

    assert!(outcome.used_bundles.is_empty());
    assert_eq!(outcome.block.tx_hashes(), vec![*alice_standalone.tx_hash()]);
    assert_eq!(outcome.state.nonce(accounts.alice_address()), 1);
    assert_eq!(outcome.state.nonce(accounts.bob_address()), 0);

    // only the standalone transfer left a trace
    assert_eq!(outcome.block.gas_used(), 21_000);
    assert_eq!(outcome.block.receipts.len(), 1);
    assert_eq!(outcome.block.receipts[0].tx_hash, *alice_standalone.tx_hash());
    assert_eq!(outcome.block.value, U256::from(21_000 * 5));
}

/// The sender's pool holds nonces 1 and 2, and a bundle carries nonces 0
/// and 1. The gapped nonce 1 is skipped without losing nonce 2, which lands
/// once the bundle has filled the gap.
#[test]
fn bundle_fills_nonce_gap_for_later_tx() {
    let accounts = TestAccounts::new();

    let x1_pool = transfer(&accounts.alice, 1, 50);
    let x2_pool = transfer(&accounts.alice, 2, 30);
    let x0_bundle = transfer(&accounts.alice, 0, 40);
    let x1_bundle = transfer(&accounts.alice, 1, 40);
    let bundle = create_bundle(vec![x0_bundle.clone(), x1_bundle.clone()], 1, BASE_FEE);

    let outcome = test_builder(&accounts, BASE_FEE, CancellationToken::new())
        .build(vec![bundle], by_sender([x1_pool, x2_pool.clone()]));

    assert_eq!(outcome.used_bundles.len(), 1);
    assert_eq!(
        outcome.block.tx_hashes(),
        vec![*x0_bundle.tx_hash(), *x1_bundle.tx_hash(), *x2_pool.tx_hash()]
    );
    assert_eq!(outcome.txs_considered, 2);
    assert_eq!(outcome.state.nonce(accounts.alice_address()), 3);
}

/// A bundle aimed at a later block is skipped, and the sender's pool
/// transaction still lands.
#[test]
fn bundle_for_other_block_is_skipped() {
    let accounts = TestAccounts::new();

    let next_block = create_bundle(vec![transfer(&accounts.alice, 0, 90)], 2, BASE_FEE);
    let pool_tx = transfer(&accounts.alice, 0, 5);

    let outcome = test_builder(&accounts, BASE_FEE, CancellationToken::new())
        .build(vec![next_block], by_sender([pool_tx.clone()]));

    assert!(outcome.used_bundles.is_empty());
    assert_eq!(outcome.bundles_considered, 1);
    assert_eq!(outcome.block.tx_hashes(), vec![*pool_tx.tx_hash()]);
}

#[test]
fn blacklisted_sender_is_excluded() {
    let accounts = TestAccounts::new();
    let ledger = funded_ledger(&accounts, U256::from(DEFAULT_BALANCE));
    let builder = GreedyBuilder::new(
        TransferExecutor,
        BlockEnvironment::new(test_header(BASE_FEE), ledger),
        CancellationToken::new(),
        HashSet::from([accounts.bob_address()]),
    );

    let txs = [transfer(&accounts.alice, 0, 3), transfer(&accounts.bob, 0, 9), transfer(&accounts.bob, 1, 9)];
    let outcome = builder.build(vec![], by_sender(txs.clone()));

    assert_eq!(outcome.block.tx_hashes(), vec![*txs[0].tx_hash()]);
    // bob's queue is dropped after the first rejection
    assert_eq!(outcome.txs_considered, 2);
}

#[test]
fn block_gas_limit_is_respected() {
    let accounts = TestAccounts::new();
    let mut header = test_header(BASE_FEE);
    header.gas_limit = 50_000;
    let builder = GreedyBuilder::new(
        TransferExecutor,
        BlockEnvironment::new(header, funded_ledger(&accounts, U256::from(DEFAULT_BALANCE))),
        CancellationToken::new(),
        HashSet::new(),
    );

    let txs = [
        transfer(&accounts.alice, 0, 3),
        transfer(&accounts.bob, 0, 4),
        transfer(&accounts.charlie, 0, 5),
    ];
    let outcome = builder.build(vec![], by_sender(txs.clone()));

    assert_eq!(outcome.block.tx_hashes(), vec![*txs[2].tx_hash(), *txs[1].tx_hash()]);
    assert!(outcome.block.gas_used() <= 50_000);
}

/// Wraps the transfer executor and fires the interrupt once a number of
/// transactions have been applied.
#[derive(Debug, Clone)]
struct CancelAfter {
    remaining: Arc<AtomicUsize>,
    interrupt: CancellationToken,
}

impl StateTransition for CancelAfter {
    type State = Ledger;

    fn apply_tx(
        &self,
        state: &mut Ledger,
        header: &PendingHeader,
        tx: &PoolTx,
    ) -> Result<ExecutedTx, CommitError> {
        let executed = TransferExecutor.apply_tx(state, header, tx)?;
        if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.interrupt.cancel();
        }
        Ok(executed)
    }
}

#[test]
fn interrupt_stops_at_next_bundle() {
    setup_logging();
    let accounts = TestAccounts::new();
    let interrupt = CancellationToken::new();
    let executor =
        CancelAfter { remaining: Arc::new(AtomicUsize::new(2)), interrupt: interrupt.clone() };

    let builder = GreedyBuilder::new(
        executor,
        BlockEnvironment::new(
            test_header(BASE_FEE),
            funded_ledger(&accounts, U256::from(DEFAULT_BALANCE)),
        ),
        interrupt,
        HashSet::new(),
    );

    let pending_tx = transfer(&accounts.charlie, 0, 70);
    let pending = create_bundle(vec![pending_tx.clone()], 1, BASE_FEE);
    let bundles = vec![
        create_bundle(vec![transfer(&accounts.alice, 0, 90)], 1, BASE_FEE),
        create_bundle(vec![transfer(&accounts.bob, 0, 80)], 1, BASE_FEE),
        pending.clone(),
    ];
    let leftover = transfer(&accounts.alice, 1, 1);

    let outcome = builder.build(bundles, by_sender([leftover]));

    assert_eq!(outcome.status, BuildStatus::Cancelled);
    assert!(outcome.is_cancelled());
    assert_eq!(outcome.used_bundles.len(), 2);
    assert_eq!(outcome.block.tx_count(), 2);
    assert_eq!(outcome.bundles_considered, 3);
    assert_eq!(outcome.txs_considered, 0);
    assert_eq!(outcome.block.gas_used(), 42_000);

    // the pending bundle was neither applied nor dropped into the block
    assert!(!outcome.block.tx_hashes().contains(pending_tx.tx_hash()));
    assert_eq!(outcome.state.nonce(accounts.charlie_address()), 0);
    assert_eq!(outcome.state.balance(accounts.charlie_address()), U256::from(DEFAULT_BALANCE));
    assert!(outcome.used_bundles.iter().all(|used| used.hash() != pending.hash()));
}

#[test]
fn rebuild_reuses_base_environment() {
    let accounts = TestAccounts::new();
    let builder = test_builder(&accounts, BASE_FEE, CancellationToken::new());
    let tx = transfer(&accounts.alice, 0, 3);

    let first = builder.build(vec![], by_sender([tx.clone()]));
    let second = builder.build(vec![], by_sender([tx]));

    assert_eq!(first.block.tx_count(), 1);
    assert_eq!(second.block.tx_count(), 1);
    assert_eq!(first.block.hash, second.block.hash);
}

fn bundle_at(price: u64) -> SimulatedBundle {
    SimulatedBundle::new(MevBundle::new(vec![], 1), 21_000, U256::from(price * 21_000))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Draining the supply emits every order once, keeps each sender's nonce
    /// order, and only ever rises in price when a sender's next transaction
    /// has just become eligible.
    #[test]
    fn supply_respects_price_and_nonce_order(
        txs in prop::collection::vec((0usize..3, 1u128..100), 0..12),
        bundle_prices in prop::collection::vec(0u64..100, 0..4),
    ) {
        let accounts = TestAccounts::new();
        let signers = [&accounts.alice, &accounts.bob, &accounts.charlie];

        let mut nonces = [0u64; 3];
        let pool: Vec<PoolTx> = txs
            .iter()
            .map(|(who, tip)| {
                let nonce = nonces[*who];
                nonces[*who] += 1;
                transfer(signers[*who], nonce, *tip)
            })
            .collect();
        let total = pool.len() + bundle_prices.len();

        let mut supply = OrderedSupply::new(
            by_sender(pool),
            bundle_prices.into_iter().map(bundle_at).collect(),
            BASE_FEE,
        );

        let mut emitted = 0;
        let mut last: Option<(U256, Option<Address>)> = None;
        let mut next_nonce: HashMap<Address, u64> = HashMap::new();

        while let Some(price) = supply.peek_price() {
            let order = supply.shift().unwrap();
            let sender = order.as_tx().map(|tx| tx.signer());

            if let Some(tx) = order.as_tx() {
                let expected = next_nonce.entry(tx.signer()).or_default();
                prop_assert_eq!(alloy::consensus::Transaction::nonce(tx.inner()), *expected);
                *expected += 1;
            }

            if let Some((last_price, last_sender)) = last {
                if price > last_price {
                    prop_assert!(sender.is_some() && sender == last_sender);
                }
            }

            last = Some((price, sender));
            emitted += 1;
        }

        prop_assert_eq!(emitted, total);
        prop_assert!(supply.is_empty());
    }
}
