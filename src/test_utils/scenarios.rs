//! Ready-made headers, ledgers and builders for tests.

use super::tx::TestAccounts;
use crate::{
    primitives::{PendingHeader, PoolTx, ValidatorData},
    tasks::block::{BlockEnvironment, GreedyBuilder, Ledger, TransferExecutor},
    utils::now,
};
use alloy::primitives::{Address, B256, U256};
use std::collections::{HashMap, HashSet};
use tokio_util::sync::CancellationToken;

/// Default test balance: 100 ETH in wei.
pub const DEFAULT_BALANCE: u128 = 100_000_000_000_000_000_000;

/// Gas limit of test blocks.
pub const TEST_GAS_LIMIT: u64 = 30_000_000;

/// A ledger where every test account holds `balance` at nonce zero.
pub fn funded_ledger(accounts: &TestAccounts, balance: U256) -> Ledger {
    Ledger::new()
        .with_account(accounts.alice_address(), balance, 0)
        .with_account(accounts.bob_address(), balance, 0)
        .with_account(accounts.charlie_address(), balance, 0)
}

/// A pending header for slot 64, block 1, at `base_fee`.
pub fn test_header(base_fee: u64) -> PendingHeader {
    PendingHeader {
        slot: 64,
        number: 1,
        parent_hash: B256::repeat_byte(0x11),
        timestamp: now(),
        gas_limit: TEST_GAS_LIMIT,
        base_fee,
        fee_recipient: Address::repeat_byte(0xfe),
        prev_randao: B256::repeat_byte(0x22),
        withdrawals: None,
    }
}

/// A validator with the given fee recipient and the test gas limit.
pub fn test_validator(fee_recipient: Address) -> ValidatorData {
    ValidatorData::new(
        "0x8a1d7b8dd64e0aafe7ea7b6c95065c9364cf99d38470c12ee807d55f7de1529ad29ce2c422e0b65e3d5a05c02caca249",
        fee_recipient,
        TEST_GAS_LIMIT,
    )
}

/// Group transactions by their recovered sender.
pub fn by_sender(txs: impl IntoIterator<Item = PoolTx>) -> HashMap<Address, Vec<PoolTx>> {
    let mut map: HashMap<Address, Vec<PoolTx>> = HashMap::new();
    for tx in txs {
        map.entry(tx.signer()).or_default().push(tx);
    }
    map
}

/// A greedy builder over funded test accounts, with an empty blacklist.
pub fn test_builder(
    accounts: &TestAccounts,
    base_fee: u64,
    interrupt: CancellationToken,
) -> GreedyBuilder<TransferExecutor> {
    let ledger = funded_ledger(accounts, U256::from(DEFAULT_BALANCE));
    GreedyBuilder::new(
        TransferExecutor,
        BlockEnvironment::new(test_header(base_fee), ledger),
        interrupt,
        HashSet::new(),
    )
}
