use alloy::primitives::Address;
use serde::{Deserialize, Deserializer, Serialize};
use std::{collections::HashMap, fmt};

/// Mapping from slot number to the validator registered to propose it.
pub type SlotMap = HashMap<u64, ValidatorData>;

/// A validator BLS public key as a `0x`-prefixed hex string.
///
/// The key is always stored lowercased, so two encodings of the same key
/// compare equal regardless of the casing the relay used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PubkeyHex(String);

impl PubkeyHex {
    /// Create a new [`PubkeyHex`], normalizing the key to lowercase.
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(key.as_ref().to_lowercase())
    }

    /// Get the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PubkeyHex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PubkeyHex {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for PubkeyHex {
    fn from(key: String) -> Self {
        Self::new(key)
    }
}

impl<'de> Deserialize<'de> for PubkeyHex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

/// Registration data of the validator proposing a given slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorData {
    /// The validator's public key.
    pub pubkey: PubkeyHex,
    /// The address that receives the block value.
    pub fee_recipient: Address,
    /// The gas limit the validator asked for.
    pub gas_limit: u64,
}

impl ValidatorData {
    /// Create a new [`ValidatorData`].
    pub fn new(pubkey: impl Into<PubkeyHex>, fee_recipient: Address, gas_limit: u64) -> Self {
        Self { pubkey: pubkey.into(), fee_recipient, gas_limit }
    }
}
