//! Core connection layer for the Parley conversation sync client.
//!
//! Provides the transport connection state machine and the environment
//! abstraction the rest of the stack builds on.
//!
//! # Architecture
//!
//! Protocol logic is Sans-IO and action-based: state machines receive
//! events (frames, time), mutate internal state, and return actions for a
//! driver to execute. No component here performs I/O; this keeps the
//! ordering and reconnection invariants testable with plain unit tests and
//! explicit instants.
//!
//! # Components
//!
//! - [`connection::Connection`]: the session's single connection — auth
//!   handshake, heartbeats, disconnect detection, capped
//!   reconnect-with-backoff
//! - [`env::Environment`]: time and randomness injection
//! - [`error::ConnectionError`]: typed connection errors

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod connection;
pub mod env;
pub mod error;

pub use connection::{Connection, ConnectionAction, ConnectionConfig, ConnectionState};
pub use env::Environment;
pub use error::ConnectionError;
