//! Client events and actions.

use parley_proto::{ConversationId, Frame, ServerMessageId, UserId, payloads::SenderType};

/// Message identity as the UI sees it.
///
/// A message is born with a client-generated local id and keeps its list
/// position when reconciliation swaps the id for the server-assigned one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageId {
    /// Client-generated temporary id (the send correlation id).
    Local(u64),
    /// Server-assigned id after confirmation.
    Server(ServerMessageId),
}

/// A message row in the visible conversation list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    /// Temporary or server-assigned identity.
    pub id: MessageId,
    /// Conversation the message belongs to.
    pub conversation_id: ConversationId,
    /// Author of the message.
    pub sender_id: UserId,
    /// Which side of the platform the author is.
    pub sender_type: SenderType,
    /// Message text.
    pub content: String,
    /// Server timestamp (Unix millis). `None` while pending.
    pub created_at: Option<u64>,
    /// Whether the counterpart has read the message.
    pub is_read: bool,
    /// True until the server confirms the message.
    pub pending: bool,
}

/// Events the caller feeds into the client.
///
/// The caller is responsible for:
/// - Receiving frames from the transport and reporting socket lifecycle
/// - Driving time forward via ticks
/// - Forwarding application intents (send, open conversation, typing)
///
/// Generic over `I` (Instant type) so tests can pass explicit instants.
#[derive(Debug, Clone)]
pub enum ClientEvent<I = std::time::Instant> {
    /// Establish the session connection with this credential.
    Connect {
        /// Session token from the token provider.
        token: String,
    },

    /// Deliberate teardown (logout / token invalidation).
    Disconnect,

    /// The driver opened a socket in response to a `Dial` action.
    TransportOpened,

    /// The driver lost the socket (or failed to open one).
    TransportLost {
        /// Why the socket went away.
        reason: String,
    },

    /// Frame received from the server.
    FrameReceived(Frame),

    /// Time tick for timeout processing.
    ///
    /// The caller should send ticks periodically so the client can detect
    /// ack timeouts, fire due redials, and expire typing indicators.
    Tick {
        /// Current time from the environment.
        now: I,
    },

    /// A conversation view became active. The client ensures exactly this
    /// room is joined on the shared transport.
    OpenConversation {
        /// Conversation to activate.
        conversation_id: ConversationId,
    },

    /// A conversation view was torn down. Stale closes (for a conversation
    /// that is no longer active) are no-ops.
    CloseConversation {
        /// Conversation being closed.
        conversation_id: ConversationId,
    },

    /// User wants to send a message.
    SendMessage {
        /// Target conversation.
        conversation_id: ConversationId,
        /// Message text (the draft).
        content: String,
    },

    /// User typed in the composer. Throttled before anything is emitted on
    /// the wire.
    InputActivity {
        /// Conversation the composer belongs to.
        conversation_id: ConversationId,
    },

    /// User viewed messages; mark them read on the server.
    MarkRead {
        /// Conversation the messages belong to.
        conversation_id: ConversationId,
        /// Messages to mark.
        message_ids: Vec<ServerMessageId>,
    },
}

/// Actions the client produces for the caller to execute.
#[derive(Debug, Clone)]
pub enum ClientAction {
    /// Open a new transport socket; report back via `TransportOpened` /
    /// `TransportLost`.
    Dial,

    /// Send a frame to the server.
    Send(Frame),

    /// Close the socket (if any).
    Close {
        /// Reason for closing.
        reason: String,
    },

    /// The connection entered the terminal Failed state. Surface to the
    /// user; only an explicit `Connect` leaves it.
    ConnectionFailed {
        /// Why the connection gave up.
        reason: String,
    },

    /// A send was accepted locally: append this pending record to the
    /// visible list (before any network round trip).
    MessagePending(MessageRecord),

    /// A pending send was confirmed: replace the entry with this
    /// correlation id in place (same list position, id swapped).
    MessageConfirmed {
        /// Correlation id of the pending entry to promote.
        correlation_id: u64,
        /// The confirmed record.
        record: MessageRecord,
    },

    /// A pending send failed: remove the entry and restore the draft so
    /// the user can retry. No user-entered content is ever dropped.
    MessageFailed {
        /// Correlation id of the pending entry to remove.
        correlation_id: u64,
        /// Conversation the send belonged to.
        conversation_id: ConversationId,
        /// The original draft text.
        draft: String,
        /// Why the send failed.
        reason: String,
    },

    /// A confirmed message from another participant (or an unmatched
    /// echo): append to the visible list.
    MessageReceived(MessageRecord),

    /// Server-reported error scoped to a conversation.
    MessageError {
        /// Conversation the error is scoped to (zero when unscoped).
        conversation_id: ConversationId,
        /// Error description.
        reason: String,
    },

    /// A participant started or stopped typing.
    TypingChanged {
        /// Conversation the indicator is scoped to.
        conversation_id: ConversationId,
        /// Who is typing.
        user_id: UserId,
        /// True for start, false for stop.
        typing: bool,
    },

    /// Messages were marked as read by the counterpart.
    MessagesRead {
        /// Conversation the receipt is scoped to.
        conversation_id: ConversationId,
        /// Messages that were marked.
        message_ids: Vec<ServerMessageId>,
        /// Who read them.
        read_by: UserId,
        /// When (Unix millis).
        read_at: u64,
    },

    /// Log message for debugging.
    Log {
        /// Log message.
        message: String,
    },
}
