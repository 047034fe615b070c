//! CBOR-encoded protocol messages.
//!
//! Frame headers are raw binary for cheap routing; payloads use CBOR for
//! type safety and forward compatibility (self-describing, no code
//! generation). The opcode in the frame header selects the payload type, so
//! no enum variant tag is serialized — a peer cannot send a mismatched
//! opcode/payload pair without failing deserialization.
//!
//! # Invariants
//!
//! Each [`Payload`] variant maps to exactly one [`Opcode`] (enforced by
//! match exhaustiveness in `opcode()`, `encode()`, and `decode()`).

use bytes::BufMut;
use serde::{Deserialize, Serialize};

use crate::{
    ConversationId, Frame, FrameHeader, Opcode, ServerMessageId, UserId,
    errors::{ProtocolError, Result},
};

/// Which side of the platform a message author belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderType {
    /// A candidate account.
    Candidate,
    /// A recruiter account.
    Recruiter,
    /// Platform-generated message (system notices).
    System,
}

/// Client handshake. First frame on every new socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Protocol version the client speaks.
    pub version: u8,
    /// Session credential from the token provider.
    pub token: String,
}

/// Server handshake acceptance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloReply {
    /// Server-assigned session identifier.
    pub session_id: u64,
    /// The authenticated user.
    pub user_id: UserId,
}

/// Graceful disconnect notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goodbye {
    /// Human-readable reason.
    pub reason: String,
}

/// Subscribe to a conversation room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinConversation {
    /// Conversation to join.
    pub conversation_id: ConversationId,
}

/// Unsubscribe from a conversation room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveConversation {
    /// Conversation to leave.
    pub conversation_id: ConversationId,
}

/// Outbound chat message. The correlation id travels in the frame header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessage {
    /// Target conversation.
    pub conversation_id: ConversationId,
    /// Message text.
    pub text: String,
}

/// Direct acknowledgement of a [`SendMessage`] frame.
///
/// Correlated to the originating send by the header correlation id, never by
/// arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendAck {
    /// Whether the server accepted the message.
    pub success: bool,
    /// Server-assigned message id on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<ServerMessageId>,
    /// Server timestamp (Unix millis) on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
    /// Rejection reason on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Broadcast of a confirmed message to everyone joined to the room,
/// including the sender (the echo).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBroadcast {
    /// Server-assigned message id.
    pub message_id: ServerMessageId,
    /// Conversation the message belongs to.
    pub conversation_id: ConversationId,
    /// Author of the message.
    pub sender_id: UserId,
    /// Which side of the platform the author is.
    pub sender_type: SenderType,
    /// Message text.
    pub content: String,
    /// Server timestamp (Unix millis).
    pub created_at: u64,
    /// Correlation id of the originating send, echoed back so the sender
    /// can reconcile the broadcast against its pending entry. Absent on
    /// messages from other participants.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<u64>,
}

/// Typing indicator, both directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Typing {
    /// Conversation the indicator is scoped to.
    pub conversation_id: ConversationId,
    /// User who is (or stopped) typing.
    pub user_id: UserId,
}

/// Client request to mark messages as read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkRead {
    /// Conversation the messages belong to.
    pub conversation_id: ConversationId,
    /// Messages to mark.
    pub message_ids: Vec<ServerMessageId>,
}

/// Server fan-out after messages were marked as read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceipt {
    /// Conversation the receipt is scoped to.
    pub conversation_id: ConversationId,
    /// Messages that were marked.
    pub message_ids: Vec<ServerMessageId>,
    /// How many messages the server actually marked.
    pub marked_count: u32,
    /// User who read them.
    pub read_by: UserId,
    /// When they were read (Unix millis).
    pub read_at: u64,
}

/// Error payload for error frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error code identifying the type of error.
    pub code: u16,
    /// Human-readable error message.
    pub message: String,
    /// Optional retry-after duration in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ErrorPayload {
    /// Session token invalid or expired. Never retried.
    pub const AUTH_FAILED: u16 = 0x0001;
    /// Conversation does not exist or the user is not a participant.
    pub const CONVERSATION_NOT_FOUND: u16 = 0x0002;
    /// Client is sending too fast.
    pub const RATE_LIMITED: u16 = 0x0003;
    /// Payload failed to deserialize or validate.
    pub const INVALID_PAYLOAD: u16 = 0x0004;
    /// Server-side failure.
    pub const INTERNAL: u16 = 0x0005;

    /// Create an auth failure error.
    pub fn auth_failed(reason: impl Into<String>) -> Self {
        Self { code: Self::AUTH_FAILED, message: reason.into(), retry_after: None }
    }

    /// Create a conversation-not-found error.
    #[must_use]
    pub fn conversation_not_found(conversation_id: ConversationId) -> Self {
        Self {
            code: Self::CONVERSATION_NOT_FOUND,
            message: format!("conversation not found: {conversation_id:032x}"),
            retry_after: None,
        }
    }

    /// Create a rate-limit error with a retry hint.
    pub fn rate_limited(message: impl Into<String>, retry_after: u64) -> Self {
        Self { code: Self::RATE_LIMITED, message: message.into(), retry_after: Some(retry_after) }
    }

    /// Create an invalid payload error.
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self { code: Self::INVALID_PAYLOAD, message: msg.into(), retry_after: None }
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self { code: Self::INTERNAL, message: msg.into(), retry_after: None }
    }
}

/// All possible frame payloads.
///
/// The payload type is determined by the `Opcode` in the frame header, so
/// only the inner struct content is serialized (no variant tag in CBOR).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Initial handshake.
    Hello(Hello),
    /// Server response to Hello.
    HelloReply(HelloReply),
    /// Graceful disconnect.
    Goodbye(Goodbye),
    /// Keepalive probe.
    Ping,
    /// Keepalive response.
    Pong,

    /// Subscribe to a conversation room.
    JoinConversation(JoinConversation),
    /// Unsubscribe from a conversation room.
    LeaveConversation(LeaveConversation),

    /// Outbound chat message.
    SendMessage(SendMessage),
    /// Acknowledgement of a send.
    SendAck(SendAck),
    /// Broadcast of a confirmed message.
    MessageReceived(MessageBroadcast),

    /// Typing started.
    UserTyping(Typing),
    /// Typing stopped.
    UserStopTyping(Typing),

    /// Client marks messages as read.
    MessageRead(MarkRead),
    /// Server read-receipt fan-out.
    MessagesMarkedRead(ReadReceipt),

    /// Error response.
    Error(ErrorPayload),
}

impl Payload {
    /// Opcode corresponding to this payload type.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Hello(_) => Opcode::Hello,
            Self::HelloReply(_) => Opcode::HelloReply,
            Self::Goodbye(_) => Opcode::Goodbye,
            Self::Ping => Opcode::Ping,
            Self::Pong => Opcode::Pong,
            Self::JoinConversation(_) => Opcode::JoinConversation,
            Self::LeaveConversation(_) => Opcode::LeaveConversation,
            Self::SendMessage(_) => Opcode::SendMessage,
            Self::SendAck(_) => Opcode::SendAck,
            Self::MessageReceived(_) => Opcode::MessageReceived,
            Self::UserTyping(_) => Opcode::UserTyping,
            Self::UserStopTyping(_) => Opcode::UserStopTyping,
            Self::MessageRead(_) => Opcode::MessageRead,
            Self::MessagesMarkedRead(_) => Opcode::MessagesMarkedRead,
            Self::Error(_) => Opcode::Error,
        }
    }

    /// Encode the payload into a buffer.
    ///
    /// Serializes only the inner struct, NOT the variant tag; the frame
    /// header's opcode already identifies the payload type.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::CborEncode`] if serialization fails
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let mut writer = dst.writer();

        match self {
            Self::Hello(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::HelloReply(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Goodbye(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Ping | Self::Pong => Ok(()), // Zero-byte payloads
            Self::JoinConversation(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::LeaveConversation(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::SendMessage(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::SendAck(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::MessageReceived(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::UserTyping(inner) | Self::UserStopTyping(inner) => {
                ciborium::ser::into_writer(inner, &mut writer)
            },
            Self::MessageRead(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::MessagesMarkedRead(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Error(inner) => ciborium::ser::into_writer(inner, &mut writer),
        }
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))
    }

    /// Decode a payload of the type selected by `opcode`.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::CborDecode`] if deserialization fails
    pub fn decode(opcode: Opcode, bytes: &[u8]) -> Result<Self> {
        fn de<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
            ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
        }

        Ok(match opcode {
            Opcode::Hello => Self::Hello(de(bytes)?),
            Opcode::HelloReply => Self::HelloReply(de(bytes)?),
            Opcode::Goodbye => Self::Goodbye(de(bytes)?),
            Opcode::Ping => Self::Ping,
            Opcode::Pong => Self::Pong,
            Opcode::JoinConversation => Self::JoinConversation(de(bytes)?),
            Opcode::LeaveConversation => Self::LeaveConversation(de(bytes)?),
            Opcode::SendMessage => Self::SendMessage(de(bytes)?),
            Opcode::SendAck => Self::SendAck(de(bytes)?),
            Opcode::MessageReceived => Self::MessageReceived(de(bytes)?),
            Opcode::UserTyping => Self::UserTyping(de(bytes)?),
            Opcode::UserStopTyping => Self::UserStopTyping(de(bytes)?),
            Opcode::MessageRead => Self::MessageRead(de(bytes)?),
            Opcode::MessagesMarkedRead => Self::MessagesMarkedRead(de(bytes)?),
            Opcode::Error => Self::Error(de(bytes)?),
        })
    }

    /// Encode this payload into a complete frame.
    ///
    /// The header's opcode is overwritten with this payload's opcode so the
    /// two can never disagree.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::CborEncode`] if serialization fails
    pub fn into_frame(self, mut header: FrameHeader) -> Result<Frame> {
        header.opcode = self.opcode().to_u16().to_be_bytes();

        let mut payload = Vec::new();
        self.encode(&mut payload)?;

        Ok(Frame::new(header, payload))
    }

    /// Decode the typed payload from a frame.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::UnknownOpcode`] if the header opcode is unknown
    /// - [`ProtocolError::CborDecode`] if deserialization fails
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let opcode = frame
            .header
            .opcode_enum()
            .ok_or(ProtocolError::UnknownOpcode(frame.header.opcode()))?;

        Self::decode(opcode, &frame.payload)
    }
}
