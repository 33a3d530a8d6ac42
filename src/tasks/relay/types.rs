//! Wire types of the relay builder API.
use crate::{
    constants::EMPTY_TX_ROOT,
    primitives::{PubkeyHex, SlotMap, ValidatorData},
};
use alloy::primitives::{Address, B256, U256};
use serde::Deserialize;
use std::str::FromStr;
use tracing::error;

/// Response of `GET /relay/v1/builder/validators`.
pub type GetValidatorRelayResponse = Vec<ValidatorRegistrationEntry>;

/// A validator registered to propose a slot.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorRegistrationEntry {
    /// The slot the validator proposes.
    #[serde(with = "alloy::serde::displayfromstr")]
    pub slot: u64,
    /// The signed registration.
    pub entry: SignedValidatorRegistration,
}

/// A validator registration and its signature.
#[derive(Debug, Clone, Deserialize)]
pub struct SignedValidatorRegistration {
    /// The registration.
    pub message: ValidatorRegistration,
    /// BLS signature over the registration.
    pub signature: String,
}

/// Preferences a validator registered with the relay.
///
/// The fee recipient is kept as a string so a single malformed entry does
/// not fail the whole response.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorRegistration {
    /// Requested fee recipient.
    pub fee_recipient: String,
    /// Requested gas limit.
    #[serde(with = "alloy::serde::displayfromstr")]
    pub gas_limit: u64,
    /// Registration timestamp.
    #[serde(with = "alloy::serde::displayfromstr")]
    pub timestamp: u64,
    /// Validator public key.
    pub pubkey: String,
}

/// Convert a validators response into a slot map. Entries with a malformed
/// fee recipient are logged and skipped.
pub fn into_slot_map(response: GetValidatorRelayResponse) -> SlotMap {
    response
        .into_iter()
        .filter_map(|data| {
            let message = data.entry.message;
            let Ok(fee_recipient) = Address::from_str(&message.fee_recipient) else {
                error!(
                    slot = data.slot,
                    fee_recipient = %message.fee_recipient,
                    pubkey = %message.pubkey,
                    "ill-formatted fee_recipient from relay"
                );
                return None;
            };
            let validator =
                ValidatorData::new(PubkeyHex::new(&message.pubkey), fee_recipient, message.gas_limit);
            Some((data.slot, validator))
        })
        .collect()
}

/// Response of `GET /eth/v1/builder/header/{slot}/{parent_hash}/{pubkey}`.
///
/// Every level is optional, since relays are not trusted to send
/// well-formed bids.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetHeaderResponse {
    /// Fork version of the bid.
    #[serde(default)]
    pub version: String,
    /// The signed bid.
    #[serde(default)]
    pub data: Option<SignedBuilderBid>,
}

/// A bid and the relay's signature over it.
#[derive(Debug, Clone, Deserialize)]
pub struct SignedBuilderBid {
    /// The bid.
    #[serde(default)]
    pub message: Option<BuilderBid>,
    /// Signature over the bid.
    #[serde(default)]
    pub signature: String,
}

/// A builder bid for a slot.
#[derive(Debug, Clone, Deserialize)]
pub struct BuilderBid {
    /// The header of the bid block.
    #[serde(default)]
    pub header: Option<BidHeader>,
    /// Value paid to the proposer, as a decimal string.
    #[serde(default)]
    pub value: Option<String>,
    /// Public key of the bidding builder.
    #[serde(default)]
    pub pubkey: PubkeyHex,
}

/// The execution header fields the builder inspects in a bid.
#[derive(Debug, Clone, Deserialize)]
pub struct BidHeader {
    /// Parent block hash.
    pub parent_hash: B256,
    /// Block hash.
    pub block_hash: B256,
    /// Transactions root.
    pub transactions_root: B256,
}

/// A well-formed bid returned by a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayBid {
    /// Fork version of the bid.
    pub version: String,
    /// Parent block hash.
    pub parent_hash: B256,
    /// Block hash.
    pub block_hash: B256,
    /// Transactions root.
    pub transactions_root: B256,
    /// Value paid to the proposer.
    pub value: U256,
    /// Public key of the bidding builder.
    pub pubkey: PubkeyHex,
}

impl RelayBid {
    /// True for bids that pay nothing or carry an empty block. Such bids
    /// are ignored.
    pub fn is_empty(&self) -> bool {
        self.value.is_zero() || self.transactions_root == EMPTY_TX_ROOT
    }
}

impl GetHeaderResponse {
    /// Extract the bid, or `None` if the response is missing any part of it.
    pub fn into_bid(self) -> Option<RelayBid> {
        let message = self.data?.message?;
        let header = message.header?;
        let value = U256::from_str(message.value.as_deref()?).ok()?;
        Some(RelayBid {
            version: self.version,
            parent_hash: header.parent_hash,
            block_hash: header.block_hash,
            transactions_root: header.transactions_root,
            value,
            pubkey: message.pubkey,
        })
    }
}
