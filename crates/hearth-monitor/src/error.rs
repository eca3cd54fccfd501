//! Error types for the telemetry core.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the streaming pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// The hub has shut down and no longer accepts observers.
    #[error("monitor hub is shut down")]
    HubClosed,

    /// An observer's transport failed or was closed mid-operation.
    #[error("transport error: {0}")]
    Transport(String),

    /// A snapshot could not be serialized for the wire.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}
