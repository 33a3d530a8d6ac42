//! Price-then-nonce ordered supply of transactions and bundles.
use crate::primitives::{Order, PoolTx, SimulatedBundle};
use alloy::{
    consensus::Transaction,
    primitives::{Address, U256},
};
use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, VecDeque},
};
use tracing::trace;

/// An order waiting in the heap, with its ranking price.
#[derive(Debug)]
struct Ranked {
    price: U256,
    /// Insertion sequence, lower wins ties.
    seq: u64,
    /// Sender of the order, if it is a transaction.
    sender: Option<Address>,
    order: Order,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.price.cmp(&other.price).then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A lazily advancing sequence of orders, highest price first.
///
/// Each sender contributes only its lowest-nonce pending transaction at a
/// time, ranked by its effective tip at the block's base fee. Bundles are
/// ranked by their aggregate gas price. The next transaction of a sender only
/// becomes eligible once its predecessor has been consumed by
/// [`OrderedSupply::shift`].
///
/// Once empty, the supply stays empty.
#[derive(Debug)]
pub struct OrderedSupply {
    heads: BinaryHeap<Ranked>,
    queues: HashMap<Address, VecDeque<PoolTx>>,
    base_fee: u64,
    seq: u64,
}

impl OrderedSupply {
    /// Create a new supply from per-sender transactions and simulated
    /// bundles. Senders whose lowest-nonce transaction cannot pay the base
    /// fee are excluded.
    pub fn new(
        txs: HashMap<Address, Vec<PoolTx>>,
        bundles: Vec<SimulatedBundle>,
        base_fee: u64,
    ) -> Self {
        let mut supply = Self {
            heads: BinaryHeap::with_capacity(txs.len() + bundles.len()),
            queues: HashMap::with_capacity(txs.len()),
            base_fee,
            seq: 0,
        };

        for bundle in bundles {
            supply.push(bundle.mev_gas_price, None, Order::Bundle(bundle));
        }

        // sort senders so that ties resolve the same way on every run
        let mut senders: Vec<_> = txs.into_iter().collect();
        senders.sort_unstable_by_key(|(sender, _)| *sender);

        for (sender, mut list) in senders {
            list.sort_by_key(|tx| tx.nonce());
            supply.promote(sender, list.into());
        }

        supply
    }

    /// The base fee transactions are ranked against.
    pub const fn base_fee(&self) -> u64 {
        self.base_fee
    }

    /// Inspect the best order without consuming it.
    pub fn peek(&self) -> Option<&Order> {
        self.heads.peek().map(|ranked| &ranked.order)
    }

    /// Ranking price of the best order.
    pub fn peek_price(&self) -> Option<U256> {
        self.heads.peek().map(|ranked| ranked.price)
    }

    /// Consume the best order. If it is a transaction, the sender's next
    /// transaction becomes eligible.
    pub fn shift(&mut self) -> Option<Order> {
        let head = self.heads.pop()?;
        if let Some(sender) = head.sender {
            if let Some(queue) = self.queues.remove(&sender) {
                self.promote(sender, queue);
            }
        }
        Some(head.order)
    }

    /// Consume the best order. If it is a transaction, the rest of the
    /// sender's queue is discarded.
    pub fn pop(&mut self) -> Option<Order> {
        let head = self.heads.pop()?;
        if let Some(sender) = head.sender {
            self.queues.remove(&sender);
        }
        Some(head.order)
    }

    /// True once no order remains.
    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }

    /// Number of orders remaining, including transactions that are not yet
    /// eligible.
    pub fn len(&self) -> usize {
        self.heads.len() + self.queues.values().map(VecDeque::len).sum::<usize>()
    }

    fn push(&mut self, price: U256, sender: Option<Address>, order: Order) {
        let seq = self.seq;
        self.seq += 1;
        self.heads.push(Ranked { price, seq, sender, order });
    }

    /// Make the front of `queue` the sender's eligible head.
    fn promote(&mut self, sender: Address, mut queue: VecDeque<PoolTx>) {
        let Some(tx) = queue.pop_front() else { return };

        let Some(tip) = tx.effective_tip_per_gas(self.base_fee) else {
            trace!(%sender, tx_hash = %tx.tx_hash(), base_fee = self.base_fee, "fee cap below base fee, dropping sender");
            return;
        };

        if !queue.is_empty() {
            self.queues.insert(sender, queue);
        }
        self.push(U256::from(tip), Some(sender), Order::Tx(tx));
    }
}

impl Iterator for OrderedSupply {
    type Item = Order;

    fn next(&mut self) -> Option<Self::Item> {
        self.shift()
    }
}
