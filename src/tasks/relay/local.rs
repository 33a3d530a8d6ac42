use crate::primitives::{BlockSubmission, SlotMap, ValidatorData};
use std::{
    fmt,
    sync::{PoisonError, RwLock},
};
use tracing::debug;

/// A relay run alongside the builder. Its validator registrations take
/// precedence over the remote relay's, and it receives a copy of every block
/// the remote relay accepts.
pub trait LocalRelay: fmt::Debug + Send + Sync {
    /// The validator registered locally for `slot`, if any.
    fn validator_for_slot(&self, slot: u64) -> Option<ValidatorData>;

    /// Record a block accepted by the remote relay.
    fn accept_block(&self, submission: &BlockSubmission);
}

/// A [`LocalRelay`] holding registrations and submissions in memory.
#[derive(Debug, Default)]
pub struct InMemoryLocalRelay {
    validators: RwLock<SlotMap>,
    submissions: RwLock<Vec<BlockSubmission>>,
}

impl InMemoryLocalRelay {
    /// Create an empty local relay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `validator` as the proposer of `slot`.
    pub fn register_validator(&self, slot: u64, validator: ValidatorData) {
        self.validators.write().unwrap_or_else(PoisonError::into_inner).insert(slot, validator);
    }

    /// All accepted submissions, oldest first.
    pub fn submissions(&self) -> Vec<BlockSubmission> {
        self.submissions.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The most recently accepted submission.
    pub fn latest(&self) -> Option<BlockSubmission> {
        self.submissions.read().unwrap_or_else(PoisonError::into_inner).last().cloned()
    }
}

impl LocalRelay for InMemoryLocalRelay {
    fn validator_for_slot(&self, slot: u64) -> Option<ValidatorData> {
        self.validators.read().unwrap_or_else(PoisonError::into_inner).get(&slot).cloned()
    }

    fn accept_block(&self, submission: &BlockSubmission) {
        debug!(
            slot = submission.slot(),
            block_hash = %submission.block_hash(),
            capella = submission.is_capella(),
            "local relay accepted block"
        );
        self.submissions.write().unwrap_or_else(PoisonError::into_inner).push(submission.clone());
    }
}
