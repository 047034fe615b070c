//! Optimistic send registry.
//!
//! Every send gets a client-generated correlation id before it touches the
//! wire. Reconciliation — against the ack or against the broadcast echo,
//! whichever arrives first — matches strictly by that id, never by list
//! position, so concurrent multi-send and multi-party races cannot promote
//! the wrong entry.
//!
//! # Invariants
//!
//! - Entries are kept in FIFO send order; resolution removes an entry
//!   without reordering the rest.
//! - Every entry eventually resolves: by ack, by broadcast echo, by ack
//!   timeout, or by connection-drop rollback. The registry cannot grow
//!   without bound.
//! - The confirmed-id window is bounded; it exists to drop duplicate
//!   deliveries of the same logical message (ack + echo race).

use std::{
    collections::{HashSet, VecDeque},
    ops::Sub,
    time::Duration,
};

use parley_proto::{ConversationId, ServerMessageId};

/// How many recently-confirmed server ids are remembered for dedup.
const CONFIRMED_WINDOW: usize = 256;

/// A send awaiting its acknowledgement.
#[derive(Debug, Clone)]
pub(crate) struct PendingSend<I> {
    /// Client-generated correlation id; doubles as the temp message id.
    pub correlation_id: u64,
    /// Target conversation.
    pub conversation_id: ConversationId,
    /// The draft text, kept verbatim so a failure can restore it.
    pub content: String,
    /// When the frame was handed to the transport.
    pub sent_at: I,
}

/// FIFO registry of unacknowledged sends plus a bounded dedup window of
/// confirmed server ids.
#[derive(Debug)]
pub(crate) struct PendingRegistry<I> {
    entries: Vec<PendingSend<I>>,
    confirmed_order: VecDeque<ServerMessageId>,
    confirmed: HashSet<ServerMessageId>,
    ack_timeout: Duration,
}

impl<I> PendingRegistry<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    pub(crate) fn new(ack_timeout: Duration) -> Self {
        Self {
            entries: Vec::new(),
            confirmed_order: VecDeque::new(),
            confirmed: HashSet::new(),
            ack_timeout,
        }
    }

    /// Number of unresolved sends.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Append a send in FIFO order.
    pub(crate) fn push(&mut self, entry: PendingSend<I>) {
        self.entries.push(entry);
    }

    /// Remove and return the entry with this correlation id, preserving
    /// the order of the rest. `None` if unknown — late acks for entries
    /// already resolved (by echo or timeout) land here and must be
    /// ignored, not treated as errors.
    pub(crate) fn resolve(&mut self, correlation_id: u64) -> Option<PendingSend<I>> {
        let index = self.entries.iter().position(|e| e.correlation_id == correlation_id)?;
        Some(self.entries.remove(index))
    }

    /// Record a server id as confirmed. Returns `false` if it was already
    /// known (a duplicate delivery that must not be appended again).
    pub(crate) fn mark_confirmed(&mut self, message_id: ServerMessageId) -> bool {
        if !self.confirmed.insert(message_id) {
            return false;
        }

        self.confirmed_order.push_back(message_id);
        while self.confirmed_order.len() > CONFIRMED_WINDOW {
            if let Some(evicted) = self.confirmed_order.pop_front() {
                self.confirmed.remove(&evicted);
            }
        }

        true
    }

    /// Whether this server id was already confirmed within the window.
    pub(crate) fn is_confirmed(&self, message_id: ServerMessageId) -> bool {
        self.confirmed.contains(&message_id)
    }

    /// Drain entries whose ack deadline has passed, preserving order.
    pub(crate) fn expire(&mut self, now: I) -> Vec<PendingSend<I>> {
        let timeout = self.ack_timeout;
        let (expired, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| now - e.sent_at > timeout);
        self.entries = kept;
        expired
    }

    /// Drain everything — used on connection drop, when no outstanding ack
    /// can ever arrive on the new socket.
    pub(crate) fn drain_all(&mut self) -> Vec<PendingSend<I>> {
        std::mem::take(&mut self.entries)
    }
}
