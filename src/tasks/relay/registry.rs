//! Per-slot validator registry with single-flight refresh.
use crate::{
    primitives::{SlotMap, ValidatorData},
    tasks::relay::RelayError,
    utils::epoch_of,
};
use metrics::counter;
use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

#[derive(Debug, Default)]
struct RegistryState {
    slot_map: Arc<SlotMap>,
    last_requested_slot: u64,
}

/// Holds the sync flag for the duration of a refresh, and releases it when
/// dropped, so a refresh cancelled mid-fetch does not leave the flag set.
#[derive(Debug)]
struct SyncGuard<'a>(&'a AtomicBool);

impl<'a> SyncGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).ok()?;
        Some(Self(flag))
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Map from slot to the validator registered to propose it.
///
/// The map is only ever replaced as a whole by [`ValidatorRegistry::refresh`],
/// never edited in place, and readers never wait on the network: the lock is
/// only held to swap the map.
#[derive(Debug, Default)]
pub struct ValidatorRegistry {
    state: RwLock<RegistryState>,
    sync_ongoing: AtomicBool,
}

impl ValidatorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current slot map.
    pub async fn slot_map(&self) -> Arc<SlotMap> {
        self.state.read().await.slot_map.clone()
    }

    /// The slot the current map was fetched for. Zero until the first
    /// successful refresh.
    pub async fn last_requested_slot(&self) -> u64 {
        self.state.read().await.last_requested_slot
    }

    /// True while a refresh is running.
    pub fn is_syncing(&self) -> bool {
        self.sync_ongoing.load(Ordering::Acquire)
    }

    /// Look up the validator for `slot`, and report whether the map is due
    /// for a refresh. A refresh is due before the first successful fetch, and
    /// once `slot` is in a later epoch than the last fetch.
    pub async fn get(&self, slot: u64) -> (Option<ValidatorData>, bool) {
        let state = self.state.read().await;
        let due = state.last_requested_slot == 0
            || epoch_of(slot) > epoch_of(state.last_requested_slot);
        (state.slot_map.get(&slot).cloned(), due)
    }

    /// Replace the map with the result of `fetch`.
    ///
    /// `fetch` is attempted up to `1 + retries` times, sleeping `backoff`
    /// between attempts. On failure the previous map is kept and the last
    /// error is returned. Only one refresh may run at a time, others fail
    /// immediately with [`RelayError::SyncOngoing`].
    ///
    /// Returns the number of validators in the new map.
    #[instrument(skip(self, fetch))]
    pub async fn refresh<F, Fut>(
        &self,
        target_slot: u64,
        retries: usize,
        backoff: Duration,
        fetch: F,
    ) -> Result<usize, RelayError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<SlotMap, RelayError>>,
    {
        let Some(guard) = SyncGuard::acquire(&self.sync_ongoing) else {
            return Err(RelayError::SyncOngoing);
        };

        info!("requesting validators");
        let mut result = fetch().await;
        let mut remaining = retries;
        while let Err(err) = &result {
            if remaining == 0 {
                break;
            }
            warn!(%err, remaining, "could not get validators map from relay, retrying");
            tokio::time::sleep(backoff).await;
            result = fetch().await;
            remaining -= 1;
        }

        let map = result.inspect_err(|err| {
            counter!("relay.validator_refresh_failures").increment(1);
            warn!(%err, "could not get validators map from relay");
        })?;

        let count = map.len();
        {
            let mut state = self.state.write().await;
            state.slot_map = Arc::new(map);
            state.last_requested_slot = target_slot;
        }
        drop(guard);

        counter!("relay.validator_refreshes").increment(1);
        info!(count, "updated validators");
        Ok(count)
    }
}
