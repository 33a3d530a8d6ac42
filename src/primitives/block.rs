//! Block-level types: the header under construction, the sealed block, and
//! the payloads exchanged with relays.
use crate::primitives::{PoolTx, PubkeyHex, ValidatorData};
use alloy::{
    consensus::Header,
    eips::{Encodable2718, eip4895::Withdrawal},
    primitives::{Address, B256, Bloom, Bytes, TxHash, U256},
};
use serde::{Deserialize, Serialize};

/// Payload attributes handed to the builder by the consensus client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadAttributes {
    /// Timestamp of the block to build.
    #[serde(with = "alloy::serde::quantity")]
    pub timestamp: u64,
    /// The prev_randao value of the block to build.
    #[serde(rename = "prevRandao")]
    pub random: B256,
    /// Fee recipient suggested by the consensus client.
    #[serde(default)]
    pub suggested_fee_recipient: Address,
    /// Slot of the block to build.
    pub slot: u64,
    /// Hash of the parent block.
    #[serde(rename = "blockHash")]
    pub head_hash: B256,
    /// Gas limit of the block to build.
    #[serde(default)]
    pub gas_limit: u64,
    /// Withdrawals to include, present from the capella upgrade onwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawals: Option<Vec<Withdrawal>>,
}

/// Header fields of the block under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingHeader {
    /// Beacon slot of the block.
    pub slot: u64,
    /// Execution block number.
    pub number: u64,
    /// Parent block hash.
    pub parent_hash: B256,
    /// Block timestamp.
    pub timestamp: u64,
    /// Block gas limit.
    pub gas_limit: u64,
    /// Base fee per gas.
    pub base_fee: u64,
    /// Address credited with the block value.
    pub fee_recipient: Address,
    /// The prev_randao value.
    pub prev_randao: B256,
    /// Withdrawals, if the block is post-capella.
    pub withdrawals: Option<Vec<Withdrawal>>,
}

impl PendingHeader {
    /// Create a header for the block described by `attrs`, using the fee
    /// recipient and gas limit the proposing validator registered.
    pub fn from_attributes(
        attrs: &PayloadAttributes,
        number: u64,
        base_fee: u64,
        validator: &ValidatorData,
    ) -> Self {
        Self {
            slot: attrs.slot,
            number,
            parent_hash: attrs.head_hash,
            timestamp: attrs.timestamp,
            gas_limit: validator.gas_limit,
            base_fee,
            fee_recipient: validator.fee_recipient,
            prev_randao: attrs.random,
            withdrawals: attrs.withdrawals.clone(),
        }
    }
}

/// Outcome of a transaction applied to the speculative environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceipt {
    /// Hash of the transaction.
    pub tx_hash: TxHash,
    /// False if the transaction reverted.
    pub success: bool,
    /// Gas used by this transaction.
    pub gas_used: u64,
    /// Gas used by the block up to and including this transaction.
    pub cumulative_gas_used: u64,
    /// Value credited to the fee recipient by this transaction.
    pub coinbase_value: U256,
}

/// A sealed block produced by the builder.
#[derive(Debug, Clone)]
pub struct BuiltBlock {
    /// Beacon slot the block was built for.
    pub slot: u64,
    /// The sealed header.
    pub header: Header,
    /// Hash of the sealed header.
    pub hash: B256,
    /// Included transactions, in order.
    pub transactions: Vec<PoolTx>,
    /// Receipts, one per transaction.
    pub receipts: Vec<TxReceipt>,
    /// Withdrawals, if the block is post-capella.
    pub withdrawals: Option<Vec<Withdrawal>>,
    /// Value paid to the fee recipient.
    pub value: U256,
}

impl BuiltBlock {
    /// Block number.
    pub const fn number(&self) -> u64 {
        self.header.number
    }

    /// Total gas used by the block.
    pub const fn gas_used(&self) -> u64 {
        self.header.gas_used
    }

    /// Number of included transactions.
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    /// True if no transaction was included.
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Hashes of the included transactions, in order.
    pub fn tx_hashes(&self) -> Vec<TxHash> {
        self.transactions.iter().map(|tx| *tx.tx_hash()).collect()
    }
}

/// Bid metadata signed by the builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidTrace {
    /// Slot of the block.
    #[serde(with = "alloy::serde::displayfromstr")]
    pub slot: u64,
    /// Parent block hash.
    pub parent_hash: B256,
    /// Block hash.
    pub block_hash: B256,
    /// Public key of the builder.
    pub builder_pubkey: PubkeyHex,
    /// Public key of the proposer.
    pub proposer_pubkey: PubkeyHex,
    /// Fee recipient of the proposer.
    pub proposer_fee_recipient: Address,
    /// Block gas limit.
    #[serde(with = "alloy::serde::displayfromstr")]
    pub gas_limit: u64,
    /// Block gas used.
    #[serde(with = "alloy::serde::displayfromstr")]
    pub gas_used: u64,
    /// Value of the block to the proposer, in wei.
    #[serde(with = "alloy::serde::displayfromstr")]
    pub value: U256,
}

/// Execution payload of a submitted block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPayload {
    /// Parent block hash.
    pub parent_hash: B256,
    /// Fee recipient.
    pub fee_recipient: Address,
    /// State root.
    pub state_root: B256,
    /// Receipts root.
    pub receipts_root: B256,
    /// Logs bloom.
    pub logs_bloom: Bloom,
    /// The prev_randao value.
    pub prev_randao: B256,
    /// Block number.
    #[serde(with = "alloy::serde::displayfromstr")]
    pub block_number: u64,
    /// Gas limit.
    #[serde(with = "alloy::serde::displayfromstr")]
    pub gas_limit: u64,
    /// Gas used.
    #[serde(with = "alloy::serde::displayfromstr")]
    pub gas_used: u64,
    /// Timestamp.
    #[serde(with = "alloy::serde::displayfromstr")]
    pub timestamp: u64,
    /// Extra data.
    pub extra_data: Bytes,
    /// Base fee per gas.
    #[serde(with = "alloy::serde::displayfromstr")]
    pub base_fee_per_gas: U256,
    /// Block hash.
    pub block_hash: B256,
    /// EIP-2718 encoded transactions.
    pub transactions: Vec<Bytes>,
    /// Withdrawals, present from the capella upgrade onwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawals: Option<Vec<Withdrawal>>,
}

impl From<&BuiltBlock> for ExecutionPayload {
    fn from(block: &BuiltBlock) -> Self {
        let header = &block.header;
        Self {
            parent_hash: header.parent_hash,
            fee_recipient: header.beneficiary,
            state_root: header.state_root,
            receipts_root: header.receipts_root,
            logs_bloom: header.logs_bloom,
            prev_randao: header.mix_hash,
            block_number: header.number,
            gas_limit: header.gas_limit,
            gas_used: header.gas_used,
            timestamp: header.timestamp,
            extra_data: header.extra_data.clone(),
            base_fee_per_gas: U256::from(header.base_fee_per_gas.unwrap_or_default()),
            block_hash: block.hash,
            transactions: block
                .transactions
                .iter()
                .map(|tx| tx.inner().encoded_2718().into())
                .collect(),
            withdrawals: block.withdrawals.clone(),
        }
    }
}

/// A signed block submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitBlockRequest {
    /// The bid trace.
    pub message: BidTrace,
    /// The execution payload.
    pub execution_payload: ExecutionPayload,
    /// Builder signature over the bid trace.
    pub signature: Bytes,
}

/// A block submission, in the shape required by the active protocol version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum BlockSubmission {
    /// Pre-capella submission, without withdrawals.
    Bellatrix(SubmitBlockRequest),
    /// Capella submission, carrying withdrawals.
    Capella(SubmitBlockRequest),
}

impl BlockSubmission {
    /// Create a submission for `block`, proposed by `validator`. The variant
    /// is chosen by whether the block carries withdrawals.
    pub fn new(
        block: &BuiltBlock,
        validator: &ValidatorData,
        builder_pubkey: PubkeyHex,
        signature: Bytes,
    ) -> Self {
        let message = BidTrace {
            slot: block.slot,
            parent_hash: block.header.parent_hash,
            block_hash: block.hash,
            builder_pubkey,
            proposer_pubkey: validator.pubkey.clone(),
            proposer_fee_recipient: validator.fee_recipient,
            gas_limit: block.header.gas_limit,
            gas_used: block.header.gas_used,
            value: block.value,
        };
        let request =
            SubmitBlockRequest { message, execution_payload: block.into(), signature };

        if block.withdrawals.is_some() {
            Self::Capella(request)
        } else {
            Self::Bellatrix(request)
        }
    }

    /// Get the inner request.
    pub const fn request(&self) -> &SubmitBlockRequest {
        match self {
            Self::Bellatrix(request) | Self::Capella(request) => request,
        }
    }

    /// Slot of the submitted block.
    pub const fn slot(&self) -> u64 {
        self.request().message.slot
    }

    /// Hash of the submitted block.
    pub const fn block_hash(&self) -> B256 {
        self.request().message.block_hash
    }

    /// Value of the submitted block.
    pub const fn value(&self) -> U256 {
        self.request().message.value
    }

    /// True for the capella variant.
    pub const fn is_capella(&self) -> bool {
        matches!(self, Self::Capella(_))
    }
}
