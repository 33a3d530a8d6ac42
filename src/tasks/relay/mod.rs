//! relay holds the client side of the relay builder API: the validator
//! registry, the remote relay client, and the local override relay.

mod error;
pub use error::RelayError;

mod local;
pub use local::{InMemoryLocalRelay, LocalRelay};

mod registry;
pub use registry::ValidatorRegistry;

mod remote;
pub use remote::RemoteRelay;

mod types;
pub use types::{
    BidHeader, BuilderBid, GetHeaderResponse, GetValidatorRelayResponse, RelayBid,
    SignedBuilderBid, SignedValidatorRegistration, ValidatorRegistration,
    ValidatorRegistrationEntry, into_slot_map,
};
