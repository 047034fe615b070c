//! Client error types.

use parley_core::error::ConnectionError;
use thiserror::Error;

/// Errors returned by the sync client state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The transport is not connected. Sends are rejected up front rather
    /// than queued; the caller keeps the draft.
    #[error("not connected")]
    NotConnected,

    /// Connection-layer failure.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Malformed or unexpected frame.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<parley_proto::ProtocolError> for ClientError {
    fn from(err: parley_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}
