//! Signed test transactions and the accounts that sign them.

use crate::primitives::{MevBundle, PoolTx, SimulatedBundle};
use alloy::{
    consensus::{SignableTransaction, TxEip1559, TxEnvelope, transaction::SignerRecoverable},
    primitives::{Address, Bytes, TxKind, U256},
    signers::{SignerSync, local::PrivateKeySigner},
};
use eyre::Result;

/// Max fee per gas of every test transaction: 100 gwei.
const TEST_MAX_FEE_PER_GAS: u128 = 100_000_000_000;

/// Three random signing accounts.
#[derive(Debug, Clone)]
pub struct TestAccounts {
    /// First account.
    pub alice: PrivateKeySigner,
    /// Second account.
    pub bob: PrivateKeySigner,
    /// Third account.
    pub charlie: PrivateKeySigner,
}

impl Default for TestAccounts {
    fn default() -> Self {
        Self::new()
    }
}

impl TestAccounts {
    /// Create new random accounts.
    pub fn new() -> Self {
        Self {
            alice: PrivateKeySigner::random(),
            bob: PrivateKeySigner::random(),
            charlie: PrivateKeySigner::random(),
        }
    }

    /// All three addresses.
    pub fn addresses(&self) -> Vec<Address> {
        vec![self.alice.address(), self.bob.address(), self.charlie.address()]
    }

    /// Alice's address.
    pub const fn alice_address(&self) -> Address {
        self.alice.address()
    }

    /// Bob's address.
    pub const fn bob_address(&self) -> Address {
        self.bob.address()
    }

    /// Charlie's address.
    pub const fn charlie_address(&self) -> Address {
        self.charlie.address()
    }
}

fn sign(signer: &PrivateKeySigner, tx: TxEip1559) -> Result<PoolTx> {
    let signature = signer.sign_hash_sync(&tx.signature_hash())?;
    let signed = TxEnvelope::Eip1559(tx.into_signed(signature));
    Ok(signed.try_into_recovered()?)
}

/// Create a signed EIP-1559 value transfer with a 21000 gas limit and a
/// 100 gwei fee cap.
pub fn create_transfer_tx(
    signer: &PrivateKeySigner,
    to: Address,
    value: U256,
    nonce: u64,
    chain_id: u64,
    max_priority_fee_per_gas: u128,
) -> Result<PoolTx> {
    let tx = TxEip1559 {
        chain_id,
        nonce,
        max_fee_per_gas: TEST_MAX_FEE_PER_GAS,
        max_priority_fee_per_gas,
        gas_limit: 21_000,
        to: TxKind::Call(to),
        value,
        ..Default::default()
    };
    sign(signer, tx)
}

/// Create a signed EIP-1559 call carrying `input`.
#[allow(clippy::too_many_arguments)]
pub fn create_call_tx(
    signer: &PrivateKeySigner,
    to: Address,
    input: Bytes,
    value: U256,
    nonce: u64,
    chain_id: u64,
    gas_limit: u64,
    max_priority_fee_per_gas: u128,
) -> Result<PoolTx> {
    let tx = TxEip1559 {
        chain_id,
        nonce,
        max_fee_per_gas: TEST_MAX_FEE_PER_GAS,
        max_priority_fee_per_gas,
        gas_limit,
        to: TxKind::Call(to),
        value,
        input,
        ..Default::default()
    };
    sign(signer, tx)
}

/// Wrap `txs` in a simulated bundle whose simulation matches what the
/// transfer ledger will compute for plain transfers at `base_fee`.
pub fn create_bundle(txs: Vec<PoolTx>, block_number: u64, base_fee: u64) -> SimulatedBundle {
    use alloy::consensus::Transaction;

    let (gas, eth) = txs.iter().fold((0u64, U256::ZERO), |(gas, eth), tx| {
        let tip = tx.effective_tip_per_gas(base_fee).unwrap_or_default();
        (gas + tx.gas_limit(), eth + U256::from(tx.gas_limit()) * U256::from(tip))
    });
    SimulatedBundle::new(MevBundle::new(txs, block_number), gas, eth)
}
