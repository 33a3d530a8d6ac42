//! Test utilities for the block builder and relay client.
//!
//! Public so integration tests in `tests/` can use them.

mod relay;
pub use relay::{MockRelay, header_response, validators_response};

mod scenarios;
pub use scenarios::{
    DEFAULT_BALANCE, TEST_GAS_LIMIT, by_sender, funded_ledger, test_builder, test_header,
    test_validator,
};

mod tx;
pub use tx::{TestAccounts, create_bundle, create_call_tx, create_transfer_tx};

/// Initializes a logger that prints during testing
pub fn setup_logging() {
    let _ = crate::utils::init_tracing();
}
