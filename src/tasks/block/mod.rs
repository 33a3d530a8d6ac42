//! block holds the block construction engine: the ordered order supply, the
//! speculative environment, and the greedy builder driving them.

mod error;
pub use error::{CommitError, Disposition};

mod env;
pub use env::{BlockEnvironment, EnvDelta, SpeculativeEnv};

mod greedy;
pub use greedy::{BuildOutcome, BuildStatus, GreedyBuilder};

mod state;
pub use state::{Account, ExecutedTx, Ledger, StateTransition, TransferExecutor, intrinsic_gas};

mod supply;
pub use supply::OrderedSupply;
