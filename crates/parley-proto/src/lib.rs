//! Wire protocol for the Parley conversation sync core.
//!
//! A frame on the wire is a fixed 48-byte binary header followed by a
//! CBOR-encoded payload. The header carries everything needed to route a
//! frame (opcode, conversation, sender, correlation id) without touching
//! the payload; payloads are serde structs selected by the header opcode.
//!
//! # Components
//!
//! - [`FrameHeader`]: fixed binary header, zero-copy parseable
//! - [`Frame`]: header + raw payload bytes
//! - [`Payload`]: typed payload enum, one variant per opcode
//! - [`Opcode`]: operation codes for both directions

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod errors;
mod frame;
mod header;
pub mod payloads;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::FrameHeader;
pub use payloads::Payload;

/// Conversation identifier (server-assigned, 128-bit).
pub type ConversationId = u128;

/// User identifier (server-assigned).
pub type UserId = u64;

/// Server-assigned message identifier.
pub type ServerMessageId = u64;

/// Frame operation codes.
///
/// Stable `u16` values; unknown opcodes are rejected at the frame layer so
/// the client never dispatches on garbage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    /// Client handshake carrying the session token.
    Hello = 0x0001,
    /// Server handshake acceptance.
    HelloReply = 0x0002,
    /// Graceful disconnect, either direction.
    Goodbye = 0x0003,
    /// Keepalive probe.
    Ping = 0x0004,
    /// Keepalive response.
    Pong = 0x0005,

    /// Subscribe to a conversation room.
    JoinConversation = 0x0010,
    /// Unsubscribe from a conversation room.
    LeaveConversation = 0x0011,

    /// Outbound chat message.
    SendMessage = 0x0020,
    /// Direct acknowledgement of a `SendMessage`.
    SendAck = 0x0021,
    /// Broadcast of a confirmed message to room members.
    MessageReceived = 0x0022,

    /// Typing started in a conversation.
    UserTyping = 0x0030,
    /// Typing stopped in a conversation.
    UserStopTyping = 0x0031,

    /// Client marks messages as read.
    MessageRead = 0x0040,
    /// Server fan-out of a read receipt.
    MessagesMarkedRead = 0x0041,

    /// Error frame.
    Error = 0x00FF,
}

impl Opcode {
    /// Wire value of this opcode.
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// Parse a wire value. `None` for unknown opcodes.
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::Hello),
            0x0002 => Some(Self::HelloReply),
            0x0003 => Some(Self::Goodbye),
            0x0004 => Some(Self::Ping),
            0x0005 => Some(Self::Pong),
            0x0010 => Some(Self::JoinConversation),
            0x0011 => Some(Self::LeaveConversation),
            0x0020 => Some(Self::SendMessage),
            0x0021 => Some(Self::SendAck),
            0x0022 => Some(Self::MessageReceived),
            0x0030 => Some(Self::UserTyping),
            0x0031 => Some(Self::UserStopTyping),
            0x0040 => Some(Self::MessageRead),
            0x0041 => Some(Self::MessagesMarkedRead),
            0x00FF => Some(Self::Error),
            _ => None,
        }
    }
}
