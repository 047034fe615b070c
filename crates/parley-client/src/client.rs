//! The synchronization client.
//!
//! [`SyncClient`] composes the connection state machine, the room
//! coordinator, the optimistic send registry, and the typing throttle into
//! a single event-driven facade. Like the connection layer it is pure: the
//! caller feeds [`ClientEvent`]s in and executes the returned
//! [`ClientAction`]s, which keeps every race in the send pipeline
//! reproducible under test.

use std::time::Duration;

use parley_core::{
    connection::{Connection, ConnectionAction, ConnectionConfig},
    env::Environment,
};
use parley_proto::{
    ConversationId, Frame, FrameHeader, Opcode, Payload, UserId,
    payloads::{
        JoinConversation, LeaveConversation, MarkRead, MessageBroadcast, SendMessage, SenderType,
        Typing,
    },
};

use crate::{
    error::ClientError,
    event::{ClientAction, ClientEvent, MessageId, MessageRecord},
    pending::{PendingRegistry, PendingSend},
    rooms::{RoomAction, RoomCoordinator},
    typing::{TypingSignal, TypingThrottle},
};

/// Time allowed between sending a message and receiving its ack (or echo)
/// before the send is declared failed.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Minimum gap between consecutive typing-start signals for one
/// conversation.
pub const DEFAULT_TYPING_THROTTLE: Duration = Duration::from_secs(3);

/// Input idle time after which a typing-stop is emitted automatically.
pub const DEFAULT_TYPING_IDLE_STOP: Duration = Duration::from_secs(5);

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Connection-layer timeouts and backoff.
    pub connection: ConnectionConfig,
    /// Which side of the platform this client authenticates as.
    pub sender_type: SenderType,
    /// Ack deadline for optimistic sends.
    pub ack_timeout: Duration,
    /// Typing-start rate limit.
    pub typing_throttle: Duration,
    /// Typing idle auto-stop threshold.
    pub typing_idle_stop: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            sender_type: SenderType::Candidate,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            typing_throttle: DEFAULT_TYPING_THROTTLE,
            typing_idle_stop: DEFAULT_TYPING_IDLE_STOP,
        }
    }
}

/// Conversation synchronization state machine.
///
/// One per authenticated session. All mutation goes through
/// [`SyncClient::handle`]; the environment supplies time and the
/// correlation-id entropy.
pub struct SyncClient<E: Environment> {
    env: E,
    sender_type: SenderType,
    conn: Connection<E::Instant>,
    rooms: RoomCoordinator,
    pending: PendingRegistry<E::Instant>,
    typing: TypingThrottle<E::Instant>,
}

impl<E: Environment> SyncClient<E> {
    /// Create a client with this environment and configuration.
    #[must_use]
    pub fn new(env: E, config: ClientConfig) -> Self {
        Self {
            env,
            sender_type: config.sender_type,
            conn: Connection::new(config.connection),
            rooms: RoomCoordinator::new(),
            pending: PendingRegistry::new(config.ack_timeout),
            typing: TypingThrottle::new(config.typing_throttle, config.typing_idle_stop),
        }
    }

    /// Whether the session handshake has completed.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Authenticated user id, once connected.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.conn.user_id()
    }

    /// The conversation whose room is (or will be) joined.
    #[must_use]
    pub fn active_conversation(&self) -> Option<ConversationId> {
        self.rooms.current()
    }

    /// Number of sends awaiting acknowledgement.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Process one event, returning the actions for the caller to execute.
    ///
    /// # Errors
    ///
    /// - [`ClientError::NotConnected`] for sends and read-marks while the
    ///   transport is down (the caller keeps the draft; nothing is queued)
    /// - [`ClientError::Connection`] for connection-layer failures,
    ///   including auth rejection
    /// - [`ClientError::Protocol`] for malformed frames
    pub fn handle(
        &mut self,
        event: ClientEvent<E::Instant>,
    ) -> Result<Vec<ClientAction>, ClientError> {
        match event {
            ClientEvent::Connect { token } => {
                let now = self.env.now();
                let actions = self.conn.connect(token, now);
                Ok(self.lower_connection_actions(actions))
            },
            ClientEvent::Disconnect => Ok(self.on_disconnect()),
            ClientEvent::TransportOpened => {
                let now = self.env.now();
                let actions = self.conn.transport_opened(now)?;
                Ok(self.lower_connection_actions(actions))
            },
            ClientEvent::TransportLost { reason } => Ok(self.on_transport_lost(&reason)),
            ClientEvent::FrameReceived(frame) => self.on_frame(&frame),
            ClientEvent::Tick { now } => Ok(self.on_tick(now)),
            ClientEvent::OpenConversation { conversation_id } => {
                Ok(self.on_open_conversation(conversation_id))
            },
            ClientEvent::CloseConversation { conversation_id } => {
                Ok(self.on_close_conversation(conversation_id))
            },
            ClientEvent::SendMessage { conversation_id, content } => {
                self.on_send_message(conversation_id, content)
            },
            ClientEvent::InputActivity { conversation_id } => {
                Ok(self.on_input_activity(conversation_id))
            },
            ClientEvent::MarkRead { conversation_id, message_ids } => {
                self.on_mark_read(conversation_id, message_ids)
            },
        }
    }

    fn on_disconnect(&mut self) -> Vec<ClientAction> {
        let conn_actions = self.conn.disconnect();
        let mut actions = self.lower_connection_actions(conn_actions);

        self.rooms.connection_dropped();
        self.typing.reset();

        for entry in self.pending.drain_all() {
            actions.push(ClientAction::MessageFailed {
                correlation_id: entry.correlation_id,
                conversation_id: entry.conversation_id,
                draft: entry.content,
                reason: "disconnected".to_string(),
            });
        }

        actions
    }

    fn on_transport_lost(&mut self, reason: &str) -> Vec<ClientAction> {
        let now = self.env.now();
        let conn_actions = self.conn.transport_lost(reason, now);
        let mut actions = self.lower_connection_actions(conn_actions);

        // Server-side room subscriptions and in-flight acks die with the
        // socket. Roll back every pending send so no draft is lost.
        self.rooms.connection_dropped();
        self.typing.reset();

        for entry in self.pending.drain_all() {
            actions.push(ClientAction::MessageFailed {
                correlation_id: entry.correlation_id,
                conversation_id: entry.conversation_id,
                draft: entry.content,
                reason: format!("connection lost: {reason}"),
            });
        }

        actions
    }

    fn on_frame(&mut self, frame: &Frame) -> Result<Vec<ClientAction>, ClientError> {
        let Some(opcode) = frame.header.opcode_enum() else {
            return Err(ClientError::Protocol(format!(
                "unknown opcode 0x{:04x}",
                frame.header.opcode()
            )));
        };

        match opcode {
            Opcode::HelloReply | Opcode::Ping | Opcode::Pong | Opcode::Goodbye => {
                self.on_session_frame(frame)
            },

            // Errors before authentication belong to the handshake (auth
            // rejection, server overload); afterwards they are
            // conversation-scoped application errors.
            Opcode::Error if !self.conn.is_connected() => self.on_session_frame(frame),
            Opcode::Error => self.on_error_frame(frame),

            Opcode::SendAck => self.on_send_ack(frame),
            Opcode::MessageReceived => self.on_broadcast(frame),
            Opcode::UserTyping | Opcode::UserStopTyping => self.on_typing_frame(frame, opcode),
            Opcode::MessagesMarkedRead => self.on_read_receipt(frame),

            Opcode::Hello
            | Opcode::JoinConversation
            | Opcode::LeaveConversation
            | Opcode::SendMessage
            | Opcode::MessageRead => Err(ClientError::Protocol(format!(
                "client-to-server opcode {opcode:?} received from server"
            ))),
        }
    }

    fn on_session_frame(&mut self, frame: &Frame) -> Result<Vec<ClientAction>, ClientError> {
        let now = self.env.now();
        let was_connected = self.conn.is_connected();
        let conn_actions = self.conn.handle_frame(frame, now)?;
        let mut actions = self.lower_connection_actions(conn_actions);

        // Handshake just completed (first connect or reconnect): restore
        // the active room subscription, which the server does not carry
        // across connections.
        if !was_connected && self.conn.is_connected() {
            if let Some(room_action) = self.rooms.rejoin() {
                if let Some(frame) = self.room_frame(room_action)? {
                    actions.push(ClientAction::Send(frame));
                }
            }
        }

        // Server-initiated Goodbye ends the session without a transport
        // loss event; the room subscription and in-flight acks die with it
        // just as they do on a drop.
        if was_connected && !self.conn.is_connected() {
            self.rooms.connection_dropped();
            self.typing.reset();

            for entry in self.pending.drain_all() {
                actions.push(ClientAction::MessageFailed {
                    correlation_id: entry.correlation_id,
                    conversation_id: entry.conversation_id,
                    draft: entry.content,
                    reason: "server disconnect".to_string(),
                });
            }
        }

        Ok(actions)
    }

    fn on_error_frame(&mut self, frame: &Frame) -> Result<Vec<ClientAction>, ClientError> {
        let Payload::Error(err) = Payload::from_frame(frame)? else {
            return Err(ClientError::Protocol("Error opcode with mismatched payload".to_string()));
        };

        // An error correlated to an in-flight send fails exactly that
        // send; anything else surfaces as a conversation-scoped error.
        let correlation_id = frame.header.correlation_id();
        if correlation_id != 0 {
            if let Some(entry) = self.pending.resolve(correlation_id) {
                return Ok(vec![ClientAction::MessageFailed {
                    correlation_id,
                    conversation_id: entry.conversation_id,
                    draft: entry.content,
                    reason: err.message,
                }]);
            }
        }

        Ok(vec![ClientAction::MessageError {
            conversation_id: frame.header.conversation_id(),
            reason: err.message,
        }])
    }

    fn on_send_ack(&mut self, frame: &Frame) -> Result<Vec<ClientAction>, ClientError> {
        let Payload::SendAck(ack) = Payload::from_frame(frame)? else {
            return Err(ClientError::Protocol(
                "SendAck opcode with mismatched payload".to_string(),
            ));
        };

        let correlation_id = frame.header.correlation_id();
        let Some(entry) = self.pending.resolve(correlation_id) else {
            // Already resolved by the broadcast echo, or expired. Late
            // acks are dropped, never misapplied to another entry.
            return Ok(vec![ClientAction::Log {
                message: format!("ack for unknown correlation id {correlation_id}, ignoring"),
            }]);
        };

        if !ack.success {
            return Ok(vec![ClientAction::MessageFailed {
                correlation_id,
                conversation_id: entry.conversation_id,
                draft: entry.content,
                reason: ack.error.unwrap_or_else(|| "send rejected".to_string()),
            }]);
        }

        let Some(message_id) = ack.message_id else {
            return Err(ClientError::Protocol("successful ack without message id".to_string()));
        };

        self.pending.mark_confirmed(message_id);

        Ok(vec![ClientAction::MessageConfirmed {
            correlation_id,
            record: MessageRecord {
                id: MessageId::Server(message_id),
                conversation_id: entry.conversation_id,
                sender_id: self.conn.user_id().unwrap_or_default(),
                sender_type: self.sender_type,
                content: entry.content,
                created_at: ack.created_at,
                is_read: false,
                pending: false,
            },
        }])
    }

    fn on_broadcast(&mut self, frame: &Frame) -> Result<Vec<ClientAction>, ClientError> {
        let Payload::MessageReceived(broadcast) = Payload::from_frame(frame)? else {
            return Err(ClientError::Protocol(
                "MessageReceived opcode with mismatched payload".to_string(),
            ));
        };

        // The echo of our own send can beat the direct ack. Whichever
        // arrives first confirms the pending entry; the loser is dropped
        // by the confirmed-id window.
        if let Some(correlation_id) = broadcast.correlation_id {
            if let Some(entry) = self.pending.resolve(correlation_id) {
                self.pending.mark_confirmed(broadcast.message_id);
                return Ok(vec![ClientAction::MessageConfirmed {
                    correlation_id,
                    record: self.broadcast_record(&broadcast, entry.content),
                }]);
            }
        }

        if self.pending.is_confirmed(broadcast.message_id) {
            return Ok(vec![ClientAction::Log {
                message: format!("duplicate delivery of message {}, ignoring", broadcast.message_id),
            }]);
        }

        self.pending.mark_confirmed(broadcast.message_id);
        let content = broadcast.content.clone();
        Ok(vec![ClientAction::MessageReceived(self.broadcast_record(&broadcast, content))])
    }

    fn broadcast_record(&self, broadcast: &MessageBroadcast, content: String) -> MessageRecord {
        MessageRecord {
            id: MessageId::Server(broadcast.message_id),
            conversation_id: broadcast.conversation_id,
            sender_id: broadcast.sender_id,
            sender_type: broadcast.sender_type,
            content,
            created_at: Some(broadcast.created_at),
            is_read: false,
            pending: false,
        }
    }

    fn on_typing_frame(
        &mut self,
        frame: &Frame,
        opcode: Opcode,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let payload = Payload::from_frame(frame)?;
        let (Payload::UserTyping(typing) | Payload::UserStopTyping(typing)) = payload else {
            return Err(ClientError::Protocol(
                "typing opcode with mismatched payload".to_string(),
            ));
        };

        // Own indicators are never echoed back; if one arrives anyway,
        // surfacing it would show the user as typing to themselves.
        if Some(typing.user_id) == self.conn.user_id() {
            return Ok(vec![]);
        }

        Ok(vec![ClientAction::TypingChanged {
            conversation_id: typing.conversation_id,
            user_id: typing.user_id,
            typing: opcode == Opcode::UserTyping,
        }])
    }

    fn on_read_receipt(&mut self, frame: &Frame) -> Result<Vec<ClientAction>, ClientError> {
        let Payload::MessagesMarkedRead(receipt) = Payload::from_frame(frame)? else {
            return Err(ClientError::Protocol(
                "MessagesMarkedRead opcode with mismatched payload".to_string(),
            ));
        };

        Ok(vec![ClientAction::MessagesRead {
            conversation_id: receipt.conversation_id,
            message_ids: receipt.message_ids,
            read_by: receipt.read_by,
            read_at: receipt.read_at,
        }])
    }

    fn on_tick(&mut self, now: E::Instant) -> Vec<ClientAction> {
        let conn_actions = self.conn.tick(now);
        let mut actions = self.lower_connection_actions(conn_actions);

        for entry in self.pending.expire(now) {
            actions.push(ClientAction::MessageFailed {
                correlation_id: entry.correlation_id,
                conversation_id: entry.conversation_id,
                draft: entry.content,
                reason: "ack timeout".to_string(),
            });
        }

        if let Some(signal) = self.typing.tick(now) {
            if let Ok(Some(frame)) = self.typing_frame(signal) {
                actions.push(ClientAction::Send(frame));
            }
        }

        actions
    }

    fn on_open_conversation(&mut self, conversation_id: ConversationId) -> Vec<ClientAction> {
        let room_actions = self.rooms.select(conversation_id, self.conn.is_connected());
        self.lower_room_actions(room_actions)
    }

    fn on_close_conversation(&mut self, conversation_id: ConversationId) -> Vec<ClientAction> {
        let mut actions = Vec::new();

        if let Some(signal) = self.typing.stop(conversation_id) {
            if let Ok(Some(frame)) = self.typing_frame(signal) {
                actions.push(ClientAction::Send(frame));
            }
        }

        let room_actions = self.rooms.close(conversation_id);
        actions.extend(self.lower_room_actions(room_actions));
        actions
    }

    fn on_send_message(
        &mut self,
        conversation_id: ConversationId,
        content: String,
    ) -> Result<Vec<ClientAction>, ClientError> {
        // Rejected up front while disconnected: the caller keeps the
        // draft, nothing enters the pending registry.
        let sender_id = self.conn.user_id().ok_or(ClientError::NotConnected)?;

        let now = self.env.now();
        let correlation_id = self.env.random_u64();
        let mut actions = Vec::new();

        // Sending implies the user finished typing this draft.
        if let Some(signal) = self.typing.stop(conversation_id) {
            if let Some(frame) = self.typing_frame(signal)? {
                actions.push(ClientAction::Send(frame));
            }
        }

        self.pending.push(PendingSend {
            correlation_id,
            conversation_id,
            content: content.clone(),
            sent_at: now,
        });

        actions.push(ClientAction::MessagePending(MessageRecord {
            id: MessageId::Local(correlation_id),
            conversation_id,
            sender_id,
            sender_type: self.sender_type,
            content: content.clone(),
            created_at: None,
            is_read: false,
            pending: true,
        }));

        let mut header = FrameHeader::new(Opcode::SendMessage);
        header.set_correlation_id(correlation_id);
        header.set_sender_id(sender_id);
        header.set_conversation_id(conversation_id);

        let frame =
            Payload::SendMessage(SendMessage { conversation_id, text: content }).into_frame(header)?;
        actions.push(ClientAction::Send(frame));

        Ok(actions)
    }

    fn on_input_activity(&mut self, conversation_id: ConversationId) -> Vec<ClientAction> {
        if !self.conn.is_connected() {
            return vec![];
        }

        let now = self.env.now();
        let mut actions = Vec::new();
        for signal in self.typing.input_activity(conversation_id, now) {
            if let Ok(Some(frame)) = self.typing_frame(signal) {
                actions.push(ClientAction::Send(frame));
            }
        }
        actions
    }

    fn on_mark_read(
        &mut self,
        conversation_id: ConversationId,
        message_ids: Vec<u64>,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let sender_id = self.conn.user_id().ok_or(ClientError::NotConnected)?;

        let mut header = FrameHeader::new(Opcode::MessageRead);
        header.set_sender_id(sender_id);
        header.set_conversation_id(conversation_id);

        let frame =
            Payload::MessageRead(MarkRead { conversation_id, message_ids }).into_frame(header)?;

        Ok(vec![ClientAction::Send(frame)])
    }

    /// Build the wire frame for a room membership intent.
    fn room_frame(&self, action: RoomAction) -> Result<Option<Frame>, ClientError> {
        let Some(sender_id) = self.conn.user_id() else {
            return Ok(None);
        };

        let (payload, conversation_id) = match action {
            RoomAction::Join(id) => {
                (Payload::JoinConversation(JoinConversation { conversation_id: id }), id)
            },
            RoomAction::Leave(id) => {
                (Payload::LeaveConversation(LeaveConversation { conversation_id: id }), id)
            },
        };

        let mut header = FrameHeader::new(payload.opcode());
        header.set_sender_id(sender_id);
        header.set_conversation_id(conversation_id);

        Ok(Some(payload.into_frame(header)?))
    }

    /// Build the wire frame for a typing signal. `None` when the session
    /// is not authenticated (nothing to signal about).
    fn typing_frame(&self, signal: TypingSignal) -> Result<Option<Frame>, ClientError> {
        let Some(user_id) = self.conn.user_id() else {
            return Ok(None);
        };

        let (payload, conversation_id) = match signal {
            TypingSignal::Start(id) => {
                (Payload::UserTyping(Typing { conversation_id: id, user_id }), id)
            },
            TypingSignal::Stop(id) => {
                (Payload::UserStopTyping(Typing { conversation_id: id, user_id }), id)
            },
        };

        let mut header = FrameHeader::new(payload.opcode());
        header.set_sender_id(user_id);
        header.set_conversation_id(conversation_id);

        Ok(Some(payload.into_frame(header)?))
    }

    fn lower_room_actions(&self, room_actions: Vec<RoomAction>) -> Vec<ClientAction> {
        let mut actions = Vec::new();
        for room_action in room_actions {
            if let Ok(Some(frame)) = self.room_frame(room_action) {
                actions.push(ClientAction::Send(frame));
            }
        }
        actions
    }

    fn lower_connection_actions(&self, conn_actions: Vec<ConnectionAction>) -> Vec<ClientAction> {
        conn_actions
            .into_iter()
            .filter_map(|action| match action {
                ConnectionAction::Dial => Some(ClientAction::Dial),
                ConnectionAction::SendFrame(frame) => Some(ClientAction::Send(frame)),
                // The post-handshake transition handles room rejoin.
                ConnectionAction::Reestablished => None,
                ConnectionAction::Close { reason } => Some(ClientAction::Close { reason }),
                ConnectionAction::GaveUp { error } => {
                    Some(ClientAction::ConnectionFailed { reason: error.to_string() })
                },
            })
            .collect()
    }
}
