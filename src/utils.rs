use crate::constants::SLOTS_PER_EPOCH;
use std::time::UNIX_EPOCH;
use tracing_subscriber::{
    EnvFilter, Layer, fmt, layer::SubscriberExt, registry, util::SubscriberInitExt,
    util::TryInitError,
};

/// Returns the current timestamp in seconds since the UNIX epoch.
pub fn now() -> u64 {
    let now = std::time::SystemTime::now();
    now.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// Epoch containing `slot`.
pub const fn epoch_of(slot: u64) -> u64 {
    slot / SLOTS_PER_EPOCH
}

/// Install a global fmt subscriber filtered by `RUST_LOG`, defaulting to
/// `info`.
pub fn init_tracing() -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt = fmt::layer().with_filter(filter);
    registry().with(fmt).try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epochs_start_every_32_slots() {
        assert_eq!(epoch_of(0), 0);
        assert_eq!(epoch_of(31), 0);
        assert_eq!(epoch_of(32), 1);
        assert_eq!(epoch_of(95), 2);
    }
}
