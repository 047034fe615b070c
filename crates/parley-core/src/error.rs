//! Error types for the connection layer.
//!
//! Strongly-typed errors instead of `std::io::Error` so callers can
//! distinguish retryable transport failures from fatal protocol or auth
//! violations. Conversion to/from `io::Error` happens only at the driver
//! boundary.

use std::io;

use thiserror::Error;

use crate::connection::ConnectionState;

/// Errors that can occur during connection state machine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Invalid state transition attempted.
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// Current state when the error occurred.
        state: ConnectionState,
        /// Operation that was attempted.
        operation: String,
    },

    /// Received unexpected frame for the current state.
    #[error("unexpected frame: received opcode {opcode:#06x} in state {state:?}")]
    UnexpectedFrame {
        /// Current state when the frame was received.
        state: ConnectionState,
        /// Opcode of the unexpected frame.
        opcode: u16,
    },

    /// Server rejected the session token. Never retried automatically;
    /// the caller must obtain a fresh token and call `connect` again.
    #[error("authentication rejected: {reason}")]
    AuthRejected {
        /// Server-provided rejection reason.
        reason: String,
    },

    /// Automatic reconnection gave up after exhausting the attempt cap.
    /// Carried by the `GaveUp` action when the connection turns terminal.
    #[error("reconnect attempts exhausted after {attempts} tries: {last_error}")]
    RetriesExhausted {
        /// How many reconnect attempts were made.
        attempts: u32,
        /// The transport failure that burned the final attempt.
        last_error: String,
    },

    /// Protocol error from frame parsing/validation.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Underlying transport error.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ConnectionError {
    /// Returns true if this error is transient and may succeed on retry.
    ///
    /// Transport failures and retry exhaustion are transient. Auth
    /// rejections and protocol violations are not — they indicate an
    /// expired credential or a broken peer, and retrying cannot fix either.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::RetriesExhausted { .. })
    }
}

/// Boundary conversion for async I/O APIs. Internally we keep
/// `ConnectionError`.
impl From<ConnectionError> for io::Error {
    fn from(err: ConnectionError) -> Self {
        let kind = match &err {
            ConnectionError::AuthRejected { .. } => io::ErrorKind::PermissionDenied,
            ConnectionError::InvalidState { .. }
            | ConnectionError::UnexpectedFrame { .. }
            | ConnectionError::Protocol(_) => io::ErrorKind::InvalidData,
            ConnectionError::RetriesExhausted { .. } | ConnectionError::Transport(_) => {
                io::ErrorKind::Other
            },
        };
        Self::new(kind, err.to_string())
    }
}

impl From<parley_proto::ProtocolError> for ConnectionError {
    fn from(err: parley_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<io::Error> for ConnectionError {
    fn from(err: io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
