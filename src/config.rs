use crate::{
    constants::{
        BASEFEE_DEFAULT, DEFAULT_BUILD_TIMEOUT_MS, DEFAULT_RELAY_TIMEOUT_MS, DEFAULT_REFRESH_RETRIES,
        DEFAULT_RETRY_BACKOFF_MS,
    },
    primitives::PubkeyHex,
    tasks::relay::{LocalRelay, RelayError, RemoteRelay},
};
use alloy::primitives::Address;
use std::{collections::HashSet, path::PathBuf, sync::Arc, time::Duration};
use url::Url;

/// Configuration for a builder submitting to one or more relays.
#[derive(Debug, Clone, PartialEq, Eq, clap::Parser)]
#[command(version, about = "Greedy PBS block builder")]
pub struct BuilderConfig {
    /// Relay endpoints to fetch validators from and submit blocks to.
    #[arg(long, env = "RELAY_ENDPOINTS", value_delimiter = ',', required = true)]
    pub relay_endpoints: Vec<Url>,

    /// Timeout applied to every relay request, in milliseconds.
    #[arg(long, env = "RELAY_TIMEOUT_MS", default_value_t = DEFAULT_RELAY_TIMEOUT_MS)]
    pub relay_timeout_ms: u64,

    /// Retries of the initial validator fetch.
    #[arg(long, env = "VALIDATOR_REFRESH_RETRIES", default_value_t = DEFAULT_REFRESH_RETRIES)]
    pub validator_refresh_retries: usize,

    /// Pause between validator fetch attempts, in milliseconds.
    #[arg(long, env = "VALIDATOR_RETRY_BACKOFF_MS", default_value_t = DEFAULT_RETRY_BACKOFF_MS)]
    pub validator_retry_backoff_ms: u64,

    /// Run an in-process local relay whose registrations override the
    /// remote ones.
    #[arg(long, env = "ENABLE_LOCAL_RELAY", default_value = "false")]
    pub enable_local_relay: bool,

    /// Port for the healthcheck server.
    #[arg(long, env = "BUILDER_PORT", default_value_t = 8080)]
    pub builder_port: u16,

    /// Addresses whose transactions are never included.
    #[arg(long, env = "BUILDER_BLACKLIST", value_delimiter = ',')]
    pub blacklist: Vec<Address>,

    /// Time allowed for a single block build before it is interrupted, in
    /// milliseconds.
    #[arg(long, env = "BUILD_TIMEOUT_MS", default_value_t = DEFAULT_BUILD_TIMEOUT_MS)]
    pub build_timeout_ms: u64,

    /// Base fee of the block being built, in wei.
    #[arg(long, env = "BUILDER_BASE_FEE", default_value_t = BASEFEE_DEFAULT)]
    pub base_fee: u64,

    /// Number of the block being built.
    #[arg(long, env = "BLOCK_NUMBER", default_value_t = 1)]
    pub block_number: u64,

    /// BLS public key of the builder, hex encoded.
    #[arg(long, env = "BUILDER_PUBKEY", default_value = "0x")]
    pub builder_pubkey: String,

    /// JSON file holding the payload attributes to build for.
    #[arg(long, env = "PAYLOAD_ATTRIBUTES_PATH")]
    pub payload_attributes_path: PathBuf,

    /// File of pending transactions, one `<sender> <tx-json>` per line.
    #[arg(long, env = "PENDING_TXS_PATH")]
    pub pending_txs_path: PathBuf,
}

impl BuilderConfig {
    /// Settings for the relay clients.
    pub const fn relay_config(&self) -> RelayClientConfig {
        RelayClientConfig {
            timeout: Duration::from_millis(self.relay_timeout_ms),
            refresh_retries: self.validator_refresh_retries,
            retry_backoff: Duration::from_millis(self.validator_retry_backoff_ms),
        }
    }

    /// Time allowed for a block build.
    pub const fn build_timeout(&self) -> Duration {
        Duration::from_millis(self.build_timeout_ms)
    }

    /// The blacklist as a set.
    pub fn blacklist(&self) -> HashSet<Address> {
        self.blacklist.iter().copied().collect()
    }

    /// The builder public key.
    pub fn builder_pubkey(&self) -> PubkeyHex {
        PubkeyHex::new(&self.builder_pubkey)
    }

    /// Connect to every configured relay, sharing `local_relay` between them.
    pub async fn connect_relays(
        &self,
        local_relay: Option<Arc<dyn LocalRelay>>,
    ) -> Result<Vec<RemoteRelay>, RelayError> {
        let mut relays = Vec::with_capacity(self.relay_endpoints.len());
        for endpoint in &self.relay_endpoints {
            let relay =
                RemoteRelay::connect(endpoint.clone(), local_relay.clone(), self.relay_config())
                    .await?;
            relays.push(relay);
        }
        Ok(relays)
    }
}

/// Settings shared by every relay client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayClientConfig {
    /// Timeout applied to every request.
    pub timeout: Duration,
    /// Retries of the initial validator fetch. Refreshes triggered by
    /// lookups retry once.
    pub refresh_retries: usize,
    /// Pause between fetch attempts.
    pub retry_backoff: Duration,
}

impl Default for RelayClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_RELAY_TIMEOUT_MS),
            refresh_retries: DEFAULT_REFRESH_RETRIES,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
        }
    }
}
