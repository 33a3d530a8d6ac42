//! Constants used in the builder.

use alloy::primitives::{B256, b256};

/// Number of slots in a beacon chain epoch.
pub const SLOTS_PER_EPOCH: u64 = 32;

/// Transactions root of a block without transactions.
pub const EMPTY_TX_ROOT: B256 =
    b256!("0x7ffe241ea60187fdb0187bfa22de35d1f9bed7ab061d9401fd47e34a54fbede1");

/// The default basefee to build against when none is configured.
pub const BASEFEE_DEFAULT: u64 = 7;

/// Default timeout of relay requests, in milliseconds.
pub const DEFAULT_RELAY_TIMEOUT_MS: u64 = 1_000;
/// Default number of retries of the initial validator fetch.
pub const DEFAULT_REFRESH_RETRIES: usize = 3;
/// Retries of a validator refresh triggered by a slot lookup.
pub const LOOKUP_REFRESH_RETRIES: usize = 1;
/// Default pause between validator fetch attempts, in milliseconds.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 1_000;
/// Default time allowed for a block build, in milliseconds.
pub const DEFAULT_BUILD_TIMEOUT_MS: u64 = 2_000;

/// Relay path listing validator registrations.
pub const VALIDATORS_PATH: &str = "/relay/v1/builder/validators";
/// Relay path accepting block submissions.
pub const SUBMIT_BLOCK_PATH: &str = "/relay/v1/builder/blocks";
/// Relay path prefix serving bids.
pub const GET_HEADER_PATH: &str = "/eth/v1/builder/header";

/// Balance given to every sender when replaying pending transactions: 1000 ETH in wei.
pub const BACKTEST_BALANCE: u128 = 1_000_000_000_000_000_000_000;
