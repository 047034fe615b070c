//! Room membership coordination.
//!
//! At most one conversation room is subscribed on the shared transport at
//! any instant. The coordinator tracks the intended room and a `joined`
//! guard flag so rapid A→B→A switching never emits duplicate join/leave
//! frames or leaks a subscription to an abandoned room. Server-side
//! subscriptions do not survive a connection drop, so the coordinator also
//! re-joins the tracked room when the connection comes back.

use parley_proto::ConversationId;

/// Wire intents produced by the coordinator. The client turns these into
/// `join_conversation` / `leave_conversation` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RoomAction {
    /// Subscribe to this conversation.
    Join(ConversationId),
    /// Unsubscribe from this conversation.
    Leave(ConversationId),
}

/// Tracks the single active room subscription.
#[derive(Debug, Default)]
pub(crate) struct RoomCoordinator {
    /// The conversation the user intends to view, joined or not.
    current: Option<ConversationId>,
    /// Whether a join for `current` has been emitted on the live
    /// connection. Reset on every drop.
    joined: bool,
}

impl RoomCoordinator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The conversation currently intended to be active.
    pub(crate) fn current(&self) -> Option<ConversationId> {
        self.current
    }

    /// Whether a join has been emitted for the current room.
    pub(crate) fn is_joined(&self) -> bool {
        self.joined
    }

    /// Make `conversation_id` the active room.
    ///
    /// Leaves the previously joined room first, then joins the requested
    /// one. Selecting the already-joined room is an idempotent no-op, not
    /// an error. When the transport is down the selection is remembered
    /// and the join fires from [`Self::rejoin`] once the handshake
    /// completes.
    pub(crate) fn select(
        &mut self,
        conversation_id: ConversationId,
        connected: bool,
    ) -> Vec<RoomAction> {
        if self.current == Some(conversation_id) {
            if connected && !self.joined {
                self.joined = true;
                return vec![RoomAction::Join(conversation_id)];
            }
            return vec![];
        }

        let mut actions = Vec::new();

        if self.joined {
            if let Some(old) = self.current {
                actions.push(RoomAction::Leave(old));
            }
            self.joined = false;
        }

        self.current = Some(conversation_id);

        if connected {
            self.joined = true;
            actions.push(RoomAction::Join(conversation_id));
        }

        actions
    }

    /// Tear down the view for `conversation_id`.
    ///
    /// A close for anything other than the current room is a stale
    /// teardown from an abandoned view and must be a no-op.
    pub(crate) fn close(&mut self, conversation_id: ConversationId) -> Vec<RoomAction> {
        if self.current != Some(conversation_id) {
            return vec![];
        }

        self.current = None;

        if self.joined {
            self.joined = false;
            return vec![RoomAction::Leave(conversation_id)];
        }

        vec![]
    }

    /// The connection dropped: the server forgot our subscription, but the
    /// intended room is kept so [`Self::rejoin`] can restore it.
    pub(crate) fn connection_dropped(&mut self) {
        self.joined = false;
    }

    /// The connection is (back) up: re-join the tracked room, if any.
    pub(crate) fn rejoin(&mut self) -> Option<RoomAction> {
        match self.current {
            Some(id) if !self.joined => {
                self.joined = true;
                Some(RoomAction::Join(id))
            },
            _ => None,
        }
    }
}
