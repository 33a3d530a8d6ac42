use reqwest::StatusCode;
use url::Url;

/// Errors that can occur when interacting with a relay.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Error contacting the relay.
    #[error("error contacting relay: {0}")]
    Transport(#[from] reqwest::Error),

    /// The relay answered with a non-success status code.
    #[error("non-ok response code {status} from relay {endpoint}")]
    Status {
        /// The status code returned.
        status: StatusCode,
        /// The URL that was requested.
        endpoint: Url,
    },

    /// The relay response could not be decoded.
    #[error("could not decode relay response: {0}")]
    Decode(#[from] serde_json::Error),

    /// No validator is registered for the slot, neither locally nor remotely.
    #[error("validator not found for slot {0}")]
    ValidatorNotFound(u64),

    /// A validator sync is already running.
    #[error("sync is ongoing")]
    SyncOngoing,

    /// The relay URL could not be built.
    #[error("invalid relay url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl RelayError {
    /// True if the error was caused by another sync already running.
    pub const fn is_sync_ongoing(&self) -> bool {
        matches!(self, Self::SyncOngoing)
    }
}
