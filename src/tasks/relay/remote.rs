//! HTTP client for a remote relay.
use crate::{
    config::RelayClientConfig,
    constants::{GET_HEADER_PATH, LOOKUP_REFRESH_RETRIES, SUBMIT_BLOCK_PATH, VALIDATORS_PATH},
    primitives::{BlockSubmission, PubkeyHex, SlotMap, ValidatorData},
    tasks::relay::{
        GetHeaderResponse, GetValidatorRelayResponse, LocalRelay, RelayBid, RelayError,
        ValidatorRegistry, into_slot_map,
    },
};
use alloy::primitives::{B256, utils::format_ether};
use metrics::counter;
use reqwest::{Client, RequestBuilder, StatusCode};
use std::sync::Arc;
use tracing::{Instrument, debug, debug_span, info, instrument, warn};
use url::Url;

/// A relay reached over HTTP, with an optional local relay whose validator
/// registrations take precedence.
///
/// Cloning is cheap, and clones share the validator registry.
#[derive(Debug, Clone)]
pub struct RemoteRelay {
    endpoint: Url,
    client: Client,
    local_relay: Option<Arc<dyn LocalRelay>>,
    registry: Arc<ValidatorRegistry>,
    config: RelayClientConfig,
}

impl RemoteRelay {
    /// Create a new relay client. No request is made.
    pub fn new(
        endpoint: Url,
        local_relay: Option<Arc<dyn LocalRelay>>,
        config: RelayClientConfig,
    ) -> Result<Self, RelayError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { endpoint, client, local_relay, registry: Default::default(), config })
    }

    /// Create a new relay client and fetch the validator map.
    ///
    /// A failed fetch is logged and the client is returned anyway, with an
    /// empty map that the next lookup will try to refresh.
    pub async fn connect(
        endpoint: Url,
        local_relay: Option<Arc<dyn LocalRelay>>,
        config: RelayClientConfig,
    ) -> Result<Self, RelayError> {
        let relay = Self::new(endpoint, local_relay, config)?;
        if let Err(err) = relay.refresh_validators(0, config.refresh_retries).await {
            warn!(%err, endpoint = %relay.endpoint, "could not connect to remote relay, continuing anyway");
        }
        Ok(relay)
    }

    /// The relay base URL.
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// The validator registry backing this client.
    pub fn registry(&self) -> &ValidatorRegistry {
        &self.registry
    }

    /// The local relay, if one is configured.
    pub fn local_relay(&self) -> Option<&Arc<dyn LocalRelay>> {
        self.local_relay.as_ref()
    }

    /// Refetch the validator map, recording `target_slot` as its watermark.
    pub async fn refresh_validators(
        &self,
        target_slot: u64,
        retries: usize,
    ) -> Result<usize, RelayError> {
        self.registry
            .refresh(target_slot, retries, self.config.retry_backoff, || self.fetch_validators())
            .await
    }

    /// The validator proposing `slot`.
    ///
    /// Answers from the registry as it is, without waiting for the network.
    /// If the map is due for a refresh, one is started in the background.
    pub async fn validator_for_slot(&self, slot: u64) -> Result<ValidatorData, RelayError> {
        let (remote, due) = self.registry.get(slot).await;

        if due {
            let relay = self.clone();
            let span = debug_span!("validator_refresh", endpoint = %self.endpoint, slot);
            tokio::spawn(async move {
                let result = relay
                    .refresh_validators(slot, LOOKUP_REFRESH_RETRIES)
                    .instrument(span.clone())
                    .await;
                match result {
                    Err(RelayError::SyncOngoing) => span_debug!(span, "refresh already running"),
                    Err(err) => span_error!(span, %err, "could not update validators map"),
                    Ok(_) => {}
                }
            });
        }

        if let Some(local) = &self.local_relay {
            if let Some(validator) = local.validator_for_slot(slot) {
                info!(slot, pubkey = %validator.pubkey, "validator registration overwritten by local data");
                return Ok(validator);
            }
        }

        remote.ok_or(RelayError::ValidatorNotFound(slot))
    }

    /// Ask the relay for its best bid for `slot`.
    ///
    /// Returns `None` if the relay has no bid, sent a malformed one, or sent
    /// one that is empty or pays nothing.
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    pub async fn get_header(
        &self,
        slot: u64,
        parent_hash: B256,
        pubkey: &PubkeyHex,
    ) -> Result<Option<RelayBid>, RelayError> {
        let url = self.url(&format!("{GET_HEADER_PATH}/{slot}/{parent_hash}/{pubkey}"))?;
        info!(%url, "get header from remote relay");

        let Some(body) = self.send_request(self.client.get(url.clone()), &url).await? else {
            info!("no-content response");
            return Ok(None);
        };

        let response: GetHeaderResponse = match serde_json::from_str(&body) {
            Ok(response) => response,
            Err(err) => {
                warn!(%err, "ignoring undecodable bid");
                return Ok(None);
            }
        };
        let Some(bid) = response.into_bid() else {
            warn!("ignoring incomplete bid");
            return Ok(None);
        };

        info!(
            response_parent_hash = %bid.parent_hash,
            pubkey = %bid.pubkey,
            value = %format_ether(bid.value),
            "get bid from remote relay"
        );

        if bid.is_empty() {
            warn!("ignoring bid with 0 value");
            return Ok(None);
        }

        counter!("relay.bids_received").increment(1);
        debug!(block_hash = %bid.block_hash, "bid received");
        Ok(Some(bid))
    }

    /// Submit a block to the relay. Accepted blocks are mirrored to the local
    /// relay, if one is configured.
    #[instrument(skip_all, fields(
        endpoint = %self.endpoint,
        slot = submission.slot(),
        block_hash = %submission.block_hash(),
        capella = submission.is_capella(),
    ))]
    pub async fn submit_block(
        &self,
        submission: &BlockSubmission,
        _validator: &ValidatorData,
    ) -> Result<(), RelayError> {
        info!("submitting block to remote relay");

        let url = self.url(SUBMIT_BLOCK_PATH)?;
        self.send_request(self.client.post(url.clone()).json(submission), &url).await?;

        counter!("relay.submitted_blocks").increment(1);

        if let Some(local) = &self.local_relay {
            local.accept_block(submission);
        }
        Ok(())
    }

    async fn fetch_validators(&self) -> Result<SlotMap, RelayError> {
        let url = self.url(VALIDATORS_PATH)?;
        let body = self.send_request(self.client.get(url.clone()), &url).await?.unwrap_or_default();
        let response: GetValidatorRelayResponse = serde_json::from_str(&body)?;
        Ok(into_slot_map(response))
    }

    /// Send `request`, returning the body unless the relay answered 204.
    async fn send_request(
        &self,
        request: RequestBuilder,
        url: &Url,
    ) -> Result<Option<String>, RelayError> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if status.as_u16() > 299 {
            return Err(RelayError::Status { status, endpoint: url.clone() });
        }

        Ok(Some(response.text().await?))
    }

    /// Append `path` to the endpoint, keeping any path the endpoint has.
    fn url(&self, path: &str) -> Result<Url, RelayError> {
        let base = self.endpoint.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}{path}"))?)
    }
}
