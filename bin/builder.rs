use alloy::primitives::{Bytes, U256, utils::format_ether};
use builder::{
    backtest::{ledger_for_pending, payload_attributes_from_file, pending_txs_from_file},
    config::BuilderConfig,
    constants::BACKTEST_BALANCE,
    primitives::{BlockSubmission, PendingHeader},
    service::serve_healthcheck,
    telemetry::install_recorder,
    tasks::{
        block::{BlockEnvironment, GreedyBuilder, TransferExecutor},
        relay::{InMemoryLocalRelay, LocalRelay},
    },
    utils::init_tracing,
};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn};

// Note: Must be set to `multi_thread` to support async tasks.
// See: https://docs.rs/tokio/latest/tokio/attr.main.html
#[tokio::main(flavor = "multi_thread")]
async fn main() -> eyre::Result<()> {
    init_tracing()?;
    let recorder = install_recorder();
    let init_span_guard = info_span!("builder initialization");

    // Pull the configuration from the command line and environment
    let config = BuilderConfig::parse();

    // Start the healthcheck server
    let (_, server) = serve_healthcheck(([0, 0, 0, 0], config.builder_port)).await?;

    // Load the slot to replay
    let attrs = payload_attributes_from_file(&config.payload_attributes_path)?;
    let pending = pending_txs_from_file(&config.pending_txs_path)?;

    // Connect to the relays, sharing one local relay if enabled
    let local_relay = config
        .enable_local_relay
        .then(|| Arc::new(InMemoryLocalRelay::new()) as Arc<dyn LocalRelay>);
    let relays = config.connect_relays(local_relay).await?;
    let Some(primary) = relays.first() else {
        eyre::bail!("no relay endpoint configured");
    };

    let validator = primary.validator_for_slot(attrs.slot).await?;
    info!(slot = attrs.slot, pubkey = %validator.pubkey, fee_recipient = %validator.fee_recipient, "found proposer");

    // We have finished initializing the builder, so we can drop the init span
    // guard.
    drop(init_span_guard);

    let header =
        PendingHeader::from_attributes(&attrs, config.block_number, config.base_fee, &validator);
    let ledger = ledger_for_pending(&pending, U256::from(BACKTEST_BALANCE));

    let interrupt = CancellationToken::new();
    let builder = GreedyBuilder::new(
        TransferExecutor,
        BlockEnvironment::new(header, ledger),
        interrupt.clone(),
        config.blacklist(),
    );

    let build_timeout = config.build_timeout();
    let timer = tokio::spawn(async move {
        tokio::time::sleep(build_timeout).await;
        interrupt.cancel();
    });
    let outcome = tokio::task::spawn_blocking(move || builder.build(vec![], pending)).await?;
    timer.abort();

    info!(
        status = ?outcome.status,
        block_hash = %outcome.block.hash,
        tx_count = outcome.block.tx_count(),
        gas_used = outcome.block.gas_used(),
        value = %format_ether(outcome.block.value),
        "built block"
    );

    let submission =
        BlockSubmission::new(&outcome.block, &validator, config.builder_pubkey(), Bytes::new());

    for relay in &relays {
        match relay.get_header(attrs.slot, attrs.head_hash, &validator.pubkey).await {
            Ok(Some(bid)) => info!(
                endpoint = %relay.endpoint(),
                bid_value = %format_ether(bid.value),
                our_value = %format_ether(outcome.block.value),
                "relay bid for slot"
            ),
            Ok(None) => info!(endpoint = %relay.endpoint(), "relay has no bid for slot"),
            Err(err) => warn!(endpoint = %relay.endpoint(), %err, "could not get relay bid"),
        }

        if let Err(err) = relay.submit_block(&submission, &validator).await {
            warn!(endpoint = %relay.endpoint(), %err, "block submission failed");
        }
    }

    server.abort();
    info!(metrics = %recorder.render(), "shutting down");

    Ok(())
}
