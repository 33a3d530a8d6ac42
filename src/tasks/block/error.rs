use alloy::primitives::{Address, TxHash, U256};

/// What the builder should do with the rest of a sender's queue after a
/// transaction was offered to the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The transaction was included. Advance to the sender's next one.
    Keep,
    /// The transaction failed, but the sender's next one may still succeed.
    SkipSender,
    /// The transaction failed in a way that invalidates the sender's queue.
    Drop,
}

/// Errors raised while committing orders to a speculative environment.
///
/// A failed commit never leaves a partial effect behind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommitError {
    /// Not enough gas left in the block.
    #[error("block gas limit reached: {needed} needed, {remaining} remaining")]
    GasLimitReached {
        /// Gas limit of the transaction.
        needed: u64,
        /// Gas left in the block.
        remaining: u64,
    },
    /// The transaction nonce is behind the sender's account nonce.
    #[error("nonce too low: expected {expected}, got {got}")]
    NonceTooLow {
        /// The account nonce.
        expected: u64,
        /// The transaction nonce.
        got: u64,
    },
    /// The transaction nonce is ahead of the sender's account nonce.
    #[error("nonce too high: expected {expected}, got {got}")]
    NonceTooHigh {
        /// The account nonce.
        expected: u64,
        /// The transaction nonce.
        got: u64,
    },
    /// The sender cannot cover the maximum cost of the transaction.
    #[error("insufficient funds: have {have}, want {want}")]
    InsufficientFunds {
        /// Sender balance.
        have: U256,
        /// Maximum transaction cost.
        want: U256,
    },
    /// The fee cap is below the block base fee.
    #[error("max fee per gas below base fee")]
    FeeCapTooLow,
    /// The gas limit does not cover intrinsic gas.
    #[error("intrinsic gas too low: have {have}, want {want}")]
    IntrinsicGasTooLow {
        /// Transaction gas limit.
        have: u64,
        /// Intrinsic gas.
        want: u64,
    },
    /// The signature does not recover to the claimed sender.
    #[error("invalid transaction signature")]
    InvalidSignature,
    /// The sender or recipient is blacklisted.
    #[error("address {0} is blacklisted")]
    Blacklisted(Address),
    /// Generic execution failure reported by the state transition.
    #[error("execution failed: {0}")]
    Execution(String),
    /// The bundle targets another block number or timestamp window.
    #[error("bundle not eligible for block {number} at timestamp {timestamp}")]
    BundleNotEligible {
        /// Number of the block being built.
        number: u64,
        /// Timestamp of the block being built.
        timestamp: u64,
    },
    /// A bundle transaction reverted and was not allowed to.
    #[error("bundle transaction {0} reverted")]
    BundleReverted(TxHash),
    /// Actual bundle gas deviated from the simulated gas by more than the
    /// bundle's tolerance.
    #[error("bundle gas mismatch: simulated {simulated}, used {used}")]
    BundleGasMismatch {
        /// Gas used in simulation.
        simulated: u64,
        /// Gas used when committed.
        used: u64,
    },
    /// The bundle paid the fee recipient less than its simulation promised.
    #[error("bundle underpaid: simulated {simulated} wei per gas, paid {paid}")]
    BundleUnderpaid {
        /// Simulated payment per gas.
        simulated: U256,
        /// Actual payment per gas.
        paid: U256,
    },
    /// The build was interrupted before the commit started.
    #[error("interrupted")]
    Interrupted,
}

impl CommitError {
    /// How a failed transaction affects the rest of its sender's queue.
    pub const fn disposition(&self) -> Disposition {
        match self {
            Self::NonceTooLow { .. }
            | Self::NonceTooHigh { .. }
            | Self::InsufficientFunds { .. }
            | Self::FeeCapTooLow
            | Self::Execution(_) => Disposition::SkipSender,
            _ => Disposition::Drop,
        }
    }
}
