/// Block construction engine
pub mod block;

/// Relay client
pub mod relay;
