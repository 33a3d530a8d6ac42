//! Orders consumed by the block builder: standalone pool transactions and
//! atomic bundles.
use alloy::{
    consensus::{TxEnvelope, transaction::Recovered},
    primitives::{B256, TxHash, U256, keccak256},
};

/// A pool transaction together with its recovered sender.
pub type PoolTx = Recovered<TxEnvelope>;

/// An ordered group of transactions that must land together or not at all.
#[derive(Debug, Clone)]
pub struct MevBundle {
    /// The transactions, in execution order.
    pub txs: Vec<PoolTx>,
    /// The block number the bundle targets.
    pub block_number: u64,
    /// Earliest block timestamp the bundle is valid for.
    pub min_timestamp: Option<u64>,
    /// Latest block timestamp the bundle is valid for.
    pub max_timestamp: Option<u64>,
    /// Hashes of transactions that are allowed to revert.
    pub reverting_tx_hashes: Vec<TxHash>,
    /// Identifying hash, used for logging and accounting.
    pub hash: B256,
}

impl MevBundle {
    /// Create a new bundle targeting `block_number`. The bundle hash is the
    /// keccak256 of the concatenated transaction hashes.
    pub fn new(txs: Vec<PoolTx>, block_number: u64) -> Self {
        let mut buf = Vec::with_capacity(txs.len() * 32);
        for tx in &txs {
            buf.extend_from_slice(tx.tx_hash().as_slice());
        }
        let hash = keccak256(&buf);

        Self {
            txs,
            block_number,
            min_timestamp: None,
            max_timestamp: None,
            reverting_tx_hashes: Vec::new(),
            hash,
        }
    }

    /// Allow the transaction with the given hash to revert.
    pub fn with_reverting_tx(mut self, hash: TxHash) -> Self {
        self.reverting_tx_hashes.push(hash);
        self
    }

    /// Restrict the bundle to blocks whose timestamp falls within
    /// `[min, max]`. Either bound may be left open.
    pub const fn with_timestamps(mut self, min: Option<u64>, max: Option<u64>) -> Self {
        self.min_timestamp = min;
        self.max_timestamp = max;
        self
    }

    /// True if `hash` is allowed to revert without failing the bundle.
    pub fn may_revert(&self, hash: &TxHash) -> bool {
        self.reverting_tx_hashes.contains(hash)
    }

    /// True if the bundle may land in the block with the given number and
    /// timestamp.
    pub fn is_eligible(&self, number: u64, timestamp: u64) -> bool {
        self.block_number == number
            && self.min_timestamp.is_none_or(|min| timestamp >= min)
            && self.max_timestamp.is_none_or(|max| timestamp <= max)
    }
}

/// A bundle annotated with the results of its simulation.
#[derive(Debug, Clone)]
pub struct SimulatedBundle {
    /// The bundle itself.
    pub bundle: MevBundle,
    /// Aggregate gas price of the bundle, used for ranking.
    pub mev_gas_price: U256,
    /// Gas used by the bundle during simulation.
    pub total_gas_used: u64,
    /// Value paid to the fee recipient during simulation.
    pub total_eth: U256,
    /// Allowed absolute deviation between simulated and actual gas usage.
    pub gas_tolerance: u64,
}

impl SimulatedBundle {
    /// Create a new simulated bundle. The ranking price is derived from the
    /// simulated payment and gas usage.
    pub fn new(bundle: MevBundle, total_gas_used: u64, total_eth: U256) -> Self {
        let mev_gas_price = per_gas(total_eth, total_gas_used);
        Self { bundle, mev_gas_price, total_gas_used, total_eth, gas_tolerance: 0 }
    }

    /// Override the ranking price.
    pub const fn with_mev_gas_price(mut self, price: U256) -> Self {
        self.mev_gas_price = price;
        self
    }

    /// Set the allowed gas deviation.
    pub const fn with_gas_tolerance(mut self, tolerance: u64) -> Self {
        self.gas_tolerance = tolerance;
        self
    }

    /// The bundle hash.
    pub const fn hash(&self) -> B256 {
        self.bundle.hash
    }

    /// Payment to the fee recipient per unit of gas, as simulated.
    pub fn simulated_gas_price(&self) -> U256 {
        per_gas(self.total_eth, self.total_gas_used)
    }
}

/// Divide a payment by the gas used, treating zero gas as a zero price.
pub(crate) fn per_gas(value: U256, gas: u64) -> U256 {
    if gas == 0 { U256::ZERO } else { value / U256::from(gas) }
}

/// A unit of work for the block builder.
#[derive(Debug, Clone)]
pub enum Order {
    /// A standalone pool transaction.
    Tx(PoolTx),
    /// An atomic bundle.
    Bundle(SimulatedBundle),
}

impl Order {
    /// True if this is a transaction.
    pub const fn is_tx(&self) -> bool {
        matches!(self, Self::Tx(_))
    }

    /// True if this is a bundle.
    pub const fn is_bundle(&self) -> bool {
        matches!(self, Self::Bundle(_))
    }

    /// Get the transaction, if this is one.
    pub const fn as_tx(&self) -> Option<&PoolTx> {
        match self {
            Self::Tx(tx) => Some(tx),
            Self::Bundle(_) => None,
        }
    }

    /// Get the bundle, if this is one.
    pub const fn as_bundle(&self) -> Option<&SimulatedBundle> {
        match self {
            Self::Bundle(bundle) => Some(bundle),
            Self::Tx(_) => None,
        }
    }
}

impl From<PoolTx> for Order {
    fn from(tx: PoolTx) -> Self {
        Self::Tx(tx)
    }
}

impl From<SimulatedBundle> for Order {
    fn from(bundle: SimulatedBundle) -> Self {
        Self::Bundle(bundle)
    }
}
