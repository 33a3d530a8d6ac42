//! Core data types shared by the block builder and the relay client.

mod block;
pub use block::{
    BidTrace, BlockSubmission, BuiltBlock, ExecutionPayload, PayloadAttributes, PendingHeader,
    SubmitBlockRequest, TxReceipt,
};

mod order;
pub use order::{MevBundle, Order, PoolTx, SimulatedBundle};
pub(crate) use order::per_gas;

mod validator;
pub use validator::{PubkeyHex, SlotMap, ValidatorData};
