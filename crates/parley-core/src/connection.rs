//! Transport connection state machine.
//!
//! Owns the single persistent connection for a session: auth handshake,
//! disconnection detection (heartbeats + idle timeout), and bounded
//! reconnect-with-backoff. Uses the action pattern: methods take time as
//! input and return actions for the driver to execute. This keeps the state
//! machine pure (no I/O) and makes every timeout deterministic under test.
//!
//! # State Machine
//!
//! ```text
//!                connect                opened/HelloReply
//! ┌──────────────┐      ┌────────────┐                  ┌───────────┐
//! │ Disconnected │─────>│ Connecting │─────────────────>│ Connected │
//! └──────────────┘      └────────────┘                  └───────────┘
//!        ▲                    │ drop                          │ drop
//!        │ disconnect         ↓                               ↓
//!        │              ┌──────────────┐  attempts ≤ cap ┌──────────────┐
//!        └──────────────│    Failed    │<────────────────│ Reconnecting │
//!                       └──────────────┘  attempts > cap └──────────────┘
//!                                              (HelloReply ──> Connected,
//!                                               signalling Reestablished)
//! ```
//!
//! Auth rejections skip Reconnecting entirely and land in Failed; both
//! terminal paths require an explicit `connect()` to leave.

use std::{ops::Sub, time::Duration};

use parley_proto::{
    Frame, FrameHeader, Opcode, Payload,
    payloads::{ErrorPayload, Goodbye, Hello},
};

use crate::error::ConnectionError;

/// Time allowed to open a socket and complete the Hello/HelloReply
/// handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum time allowed without any inbound frame before the connection is
/// declared lost.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Interval at which Ping frames are sent while connected.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

/// Delay before the first reconnect attempt. Doubles per attempt.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Cap on the per-attempt backoff delay.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Reconnect attempts before giving up and transitioning to Failed.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Actions returned by the connection state machine.
///
/// The driver (transport task or test harness) executes these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Open a new transport socket. The driver reports the outcome via
    /// [`Connection::transport_opened`] or [`Connection::transport_lost`].
    Dial,

    /// Send this frame to the peer.
    SendFrame(Frame),

    /// The connection came back after a drop. Room subscriptions do not
    /// survive a drop on the backend side, so the room coordinator must
    /// re-join the active conversation on seeing this.
    Reestablished,

    /// Close the socket (if any) with this reason.
    Close {
        /// Reason for closing.
        reason: String,
    },

    /// The connection entered the terminal Failed state. No automatic
    /// retry will happen; the caller must surface this and wait for an
    /// explicit reconnect.
    GaveUp {
        /// Why the connection gave up.
        error: ConnectionError,
    },
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none wanted.
    Disconnected,
    /// First connection attempt in progress (dialing or handshaking).
    Connecting,
    /// Handshake complete, frames flowing.
    Connected,
    /// Connection dropped; automatic retry scheduled or in progress.
    Reconnecting,
    /// Retries exhausted or auth rejected. Terminal until `connect()`.
    Failed,
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for socket open + handshake.
    pub handshake_timeout: Duration,
    /// Idle timeout before declaring the connection lost.
    pub idle_timeout: Duration,
    /// Heartbeat interval (should be well under `idle_timeout`).
    pub heartbeat_interval: Duration,
    /// Delay before the first reconnect attempt.
    pub initial_backoff: Duration,
    /// Cap on the per-attempt backoff delay.
    pub max_backoff: Duration,
    /// Reconnect attempts before transitioning to Failed.
    pub max_reconnect_attempts: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

/// Connection state machine.
///
/// Exactly one per session; the session's single transport socket is owned
/// (logically) by this machine, and no other component may dial or send on
/// it directly.
///
/// Generic over `Instant` to support both real time and virtual time for
/// deterministic testing.
#[derive(Debug, Clone)]
pub struct Connection<I = std::time::Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    state: ConnectionState,
    config: ConnectionConfig,
    /// Session credential; present from `connect()` until `disconnect()`.
    token: Option<String>,
    /// Server-assigned session id, once authenticated.
    session_id: Option<u64>,
    /// Authenticated user id from the HelloReply.
    user_id: Option<u64>,
    /// Reconnect attempts made since the connection was last healthy.
    attempt: u32,
    /// When the connection was lost (schedules the next dial).
    lost_at: Option<I>,
    /// When the current dial/handshake started (handshake timeout clock).
    dial_started: Option<I>,
    /// Last inbound frame (idle timeout clock).
    last_activity: Option<I>,
    /// Last heartbeat sent.
    last_heartbeat: Option<I>,
}

impl<I> Connection<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a new connection in [`ConnectionState::Disconnected`].
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            config,
            token: None,
            session_id: None,
            user_id: None,
            attempt: 0,
            lost_at: None,
            dial_started: None,
            last_activity: None,
            last_heartbeat: None,
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the handshake has completed and frames are flowing.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Server-assigned session id. `None` until authenticated.
    #[must_use]
    pub fn session_id(&self) -> Option<u64> {
        self.session_id
    }

    /// Authenticated user id. `None` until authenticated.
    #[must_use]
    pub fn user_id(&self) -> Option<u64> {
        self.user_id
    }

    /// Reconnect attempts made since the connection was last healthy.
    #[must_use]
    pub fn reconnect_attempt(&self) -> u32 {
        self.attempt
    }

    /// Establish (or reuse) the session's connection.
    ///
    /// From Disconnected or Failed this stores the token, resets the
    /// attempt counter, and emits [`ConnectionAction::Dial`]. In any other
    /// state the connection already exists or is being established, so this
    /// is an idempotent no-op (the fresher token is kept for the next
    /// handshake).
    pub fn connect(&mut self, token: impl Into<String>, now: I) -> Vec<ConnectionAction> {
        self.token = Some(token.into());

        match self.state {
            ConnectionState::Disconnected | ConnectionState::Failed => {
                self.state = ConnectionState::Connecting;
                self.attempt = 0;
                self.lost_at = None;
                self.dial_started = Some(now);
                vec![ConnectionAction::Dial]
            },
            ConnectionState::Connecting
            | ConnectionState::Connected
            | ConnectionState::Reconnecting => vec![],
        }
    }

    /// The driver opened a socket; begin the handshake.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::InvalidState`] if no dial was in progress
    pub fn transport_opened(&mut self, now: I) -> Result<Vec<ConnectionAction>, ConnectionError> {
        if !matches!(self.state, ConnectionState::Connecting | ConnectionState::Reconnecting) {
            return Err(ConnectionError::InvalidState {
                state: self.state,
                operation: "transport_opened".to_string(),
            });
        }

        let Some(token) = self.token.clone() else {
            return Err(ConnectionError::InvalidState {
                state: self.state,
                operation: "transport_opened without token".to_string(),
            });
        };

        self.dial_started = Some(now);
        self.last_activity = Some(now);

        let hello = Payload::Hello(Hello { version: FrameHeader::VERSION, token });
        let frame = hello.into_frame(FrameHeader::new(Opcode::Hello))?;

        Ok(vec![ConnectionAction::SendFrame(frame)])
    }

    /// The driver lost the socket (or failed to open one).
    ///
    /// Schedules a backoff-delayed redial while attempts remain; past the
    /// cap, transitions to Failed and emits [`ConnectionAction::GaveUp`].
    /// A deliberate Disconnected (or already Failed) state is unaffected.
    pub fn transport_lost(&mut self, reason: &str, now: I) -> Vec<ConnectionAction> {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Failed => vec![],
            ConnectionState::Connecting
            | ConnectionState::Connected
            | ConnectionState::Reconnecting => {
                self.session_id = None;
                self.user_id = None;
                self.dial_started = None;
                self.last_heartbeat = None;
                self.attempt += 1;

                if self.attempt > self.config.max_reconnect_attempts {
                    self.state = ConnectionState::Failed;
                    return vec![ConnectionAction::GaveUp {
                        error: ConnectionError::RetriesExhausted {
                            attempts: self.config.max_reconnect_attempts,
                            last_error: reason.to_string(),
                        },
                    }];
                }

                self.state = ConnectionState::Reconnecting;
                self.lost_at = Some(now);
                vec![]
            },
        }
    }

    /// Deliberate teardown (logout / token invalidation).
    ///
    /// Always lands in Disconnected and clears the credential; the
    /// connection's lifecycle is tied to the session token.
    pub fn disconnect(&mut self) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();

        if self.state == ConnectionState::Connected {
            let goodbye = Payload::Goodbye(Goodbye { reason: "client disconnect".to_string() });
            if let Ok(frame) = goodbye.into_frame(FrameHeader::new(Opcode::Goodbye)) {
                actions.push(ConnectionAction::SendFrame(frame));
            }
        }

        if self.state != ConnectionState::Disconnected {
            actions.push(ConnectionAction::Close { reason: "client disconnect".to_string() });
        }

        self.state = ConnectionState::Disconnected;
        self.token = None;
        self.session_id = None;
        self.user_id = None;
        self.attempt = 0;
        self.lost_at = None;
        self.dial_started = None;
        self.last_heartbeat = None;

        actions
    }

    /// Process an inbound session-level frame.
    ///
    /// Handles `HelloReply`, `Ping`/`Pong`, `Goodbye`, and `Error` frames
    /// received before authentication (auth rejections). Application frames
    /// belong to the layer above and are rejected here.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::AuthRejected`] if the server rejects the token
    /// - [`ConnectionError::UnexpectedFrame`] for opcodes invalid in the
    ///   current state
    /// - [`ConnectionError::Protocol`] on payload decode failure
    pub fn handle_frame(
        &mut self,
        frame: &Frame,
        now: I,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        self.last_activity = Some(now);

        let Some(opcode) = frame.header.opcode_enum() else {
            return Err(ConnectionError::UnexpectedFrame {
                state: self.state,
                opcode: frame.header.opcode(),
            });
        };

        match (self.state, opcode) {
            (ConnectionState::Connecting | ConnectionState::Reconnecting, Opcode::HelloReply) => {
                let payload = Payload::from_frame(frame)?;
                let Payload::HelloReply(reply) = payload else {
                    return Err(ConnectionError::Protocol(
                        "HelloReply opcode with mismatched payload".to_string(),
                    ));
                };

                let was_reconnecting = self.state == ConnectionState::Reconnecting;

                self.state = ConnectionState::Connected;
                self.session_id = Some(reply.session_id);
                self.user_id = Some(reply.user_id);
                self.attempt = 0;
                self.lost_at = None;
                self.dial_started = None;
                self.last_heartbeat = Some(now);

                if was_reconnecting {
                    Ok(vec![ConnectionAction::Reestablished])
                } else {
                    Ok(vec![])
                }
            },

            // Auth rejection during handshake: fatal, no retry.
            (ConnectionState::Connecting | ConnectionState::Reconnecting, Opcode::Error) => {
                let payload = Payload::from_frame(frame)?;
                let Payload::Error(err) = payload else {
                    return Err(ConnectionError::Protocol(
                        "Error opcode with mismatched payload".to_string(),
                    ));
                };

                if err.code == ErrorPayload::AUTH_FAILED {
                    self.state = ConnectionState::Failed;
                    self.dial_started = None;
                    self.session_id = None;
                    self.user_id = None;
                    Err(ConnectionError::AuthRejected { reason: err.message })
                } else {
                    // Non-auth handshake errors count as a failed attempt.
                    Ok(self.transport_lost(&err.message, now))
                }
            },

            (ConnectionState::Connected, Opcode::Ping) => {
                let pong = Frame::new(FrameHeader::new(Opcode::Pong), Vec::new());
                Ok(vec![ConnectionAction::SendFrame(pong)])
            },

            (ConnectionState::Connected, Opcode::Pong) => Ok(vec![]),

            (ConnectionState::Connected, Opcode::Goodbye) => {
                let reason = match Payload::from_frame(frame) {
                    Ok(Payload::Goodbye(goodbye)) => goodbye.reason,
                    _ => "peer goodbye".to_string(),
                };

                // Server-initiated close is deliberate, not a drop: no retry.
                self.state = ConnectionState::Disconnected;
                self.session_id = None;
                self.user_id = None;
                self.attempt = 0;
                self.last_heartbeat = None;

                Ok(vec![ConnectionAction::Close { reason: format!("peer goodbye: {reason}") }])
            },

            (state, opcode) => {
                Err(ConnectionError::UnexpectedFrame { state, opcode: opcode.to_u16() })
            },
        }
    }

    /// Process periodic maintenance: due redials, handshake timeout, idle
    /// detection, and heartbeats.
    pub fn tick(&mut self, now: I) -> Vec<ConnectionAction> {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Failed => vec![],

            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                // Handshake timeout on an in-progress dial.
                if let Some(started) = self.dial_started {
                    if now - started > self.config.handshake_timeout {
                        return self.transport_lost("handshake timeout", now);
                    }
                    return vec![];
                }

                // Waiting out the backoff before the next dial.
                if let Some(lost) = self.lost_at {
                    if now - lost >= self.backoff_delay() {
                        self.lost_at = None;
                        self.dial_started = Some(now);
                        return vec![ConnectionAction::Dial];
                    }
                }

                vec![]
            },

            ConnectionState::Connected => {
                if let Some(last) = self.last_activity {
                    if now - last > self.config.idle_timeout {
                        return self.transport_lost("idle timeout", now);
                    }
                }

                let due = match self.last_heartbeat {
                    None => true,
                    Some(last) => now - last >= self.config.heartbeat_interval,
                };

                if due {
                    self.last_heartbeat = Some(now);
                    let ping = Frame::new(FrameHeader::new(Opcode::Ping), Vec::new());
                    return vec![ConnectionAction::SendFrame(ping)];
                }

                vec![]
            },
        }
    }

    /// Backoff delay for the current attempt: `initial * 2^(attempt-1)`,
    /// capped at `max_backoff`.
    fn backoff_delay(&self) -> Duration {
        let exponent = self.attempt.saturating_sub(1).min(16);
        let delay = self.config.initial_backoff.saturating_mul(1u32 << exponent);
        delay.min(self.config.max_backoff)
    }
}
