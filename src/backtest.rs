//! Fixture loaders for replaying a recorded slot through the builder.
use crate::{
    primitives::{PayloadAttributes, PoolTx},
    tasks::block::Ledger,
};
use alloy::{
    consensus::{Transaction, TxEnvelope, transaction::Recovered},
    primitives::{Address, U256},
};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, debug_span};

/// Errors raised while loading fixtures.
#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    /// The fixture file could not be read.
    #[error("could not read {path}: {source}")]
    Io {
        /// The file that failed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The payload attributes could not be decoded.
    #[error("could not decode payload attributes: {0}")]
    Attributes(#[source] serde_json::Error),
    /// A pending transaction could not be decoded.
    #[error("line {line}: could not decode transaction: {source}")]
    Transaction {
        /// One-based line number.
        line: usize,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },
}

fn read(path: &Path) -> Result<String, FixtureError> {
    std::fs::read_to_string(path)
        .map_err(|source| FixtureError::Io { path: path.to_path_buf(), source })
}

/// Load payload attributes from a JSON file.
pub fn payload_attributes_from_file(
    path: impl AsRef<Path>,
) -> Result<PayloadAttributes, FixtureError> {
    let content = read(path.as_ref())?;
    serde_json::from_str(&content).map_err(FixtureError::Attributes)
}

/// Load pending transactions from a file of `<sender> <tx-json>` lines.
///
/// Lines without a separating space or with an unparsable sender are
/// skipped. The sender is taken from
/// the file as is; its signature is only checked when the transaction is
/// executed.
pub fn pending_txs_from_file(
    path: impl AsRef<Path>,
) -> Result<HashMap<Address, Vec<PoolTx>>, FixtureError> {
    let path = path.as_ref();
    let content = read(path)?;
    let span = debug_span!("pending_txs_from_file", path = %path.display());

    let mut pending: HashMap<Address, Vec<PoolTx>> = HashMap::new();
    for (index, line) in content.lines().enumerate() {
        let line_number = index + 1;
        let (sender, tx_json) = opt_unwrap_or_continue!(
            line.split_once(' '),
            span,
            trace!(line = line_number, "skipping line without sender")
        );

        let sender = opt_unwrap_or_continue!(
            Address::from_str(sender).ok(),
            span,
            warn!(line = line_number, sender, "skipping line with invalid sender")
        );
        let tx: TxEnvelope = serde_json::from_str(tx_json)
            .map_err(|source| FixtureError::Transaction { line: line_number, source })?;

        pending.entry(sender).or_default().push(Recovered::new_unchecked(tx, sender));
    }

    span_debug!(span, senders = pending.len(), "loaded pending transactions");
    Ok(pending)
}

/// A ledger where every sender in `pending` holds `balance`, with its nonce
/// set to its lowest pending nonce.
pub fn ledger_for_pending(pending: &HashMap<Address, Vec<PoolTx>>, balance: U256) -> Ledger {
    let ledger = pending.iter().fold(Ledger::new(), |ledger, (sender, txs)| {
        let nonce = txs.iter().map(|tx| tx.nonce()).min().unwrap_or_default();
        ledger.with_account(*sender, balance, nonce)
    });
    debug!(accounts = pending.len(), %balance, "funded backtest ledger");
    ledger
}
