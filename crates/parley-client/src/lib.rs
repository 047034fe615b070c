//! Conversation synchronization client for the Parley platform.
//!
//! Keeps a candidate/recruiter conversation view consistent with the
//! server over a single persistent connection: optimistic sends with
//! correlation-id reconciliation, single-room membership, typing
//! indicators, and read receipts.
//!
//! # Architecture
//!
//! [`SyncClient`] is Sans-IO and action-based: the driver feeds
//! [`ClientEvent`]s (frames, time ticks, application intents) and executes
//! the returned [`ClientAction`]s (dial, send frame, mutate the visible
//! message list). The optional `transport` feature provides a QUIC driver.
//!
//! # Send pipeline
//!
//! A send appears in the visible list immediately under a client-generated
//! correlation id, then reconciles against the server ack or the broadcast
//! echo — whichever arrives first, matched strictly by correlation id. A
//! failed or timed-out send is rolled back with its draft intact.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod api;
pub mod client;
pub mod dispatch;
pub mod error;
pub mod event;

mod pending;
mod rooms;
mod typing;

#[cfg(feature = "transport")]
pub mod transport;

pub use api::{ApiError, ConversationApi, ConversationSummary, MessagePage, TokenProvider};
pub use client::{ClientConfig, SyncClient};
pub use dispatch::{ConversationConsumer, Dispatcher, Subscription};
pub use error::ClientError;
pub use event::{ClientAction, ClientEvent, MessageId, MessageRecord};
