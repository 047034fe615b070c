//! Typing-indicator throttle.
//!
//! Keystrokes arrive far faster than anyone needs to hear about them. The
//! throttle collapses a burst of input activity into at most one start
//! signal per throttle interval, and emits a stop once input goes idle,
//! the draft is sent, or the conversation closes.

use std::{ops::Sub, time::Duration};

use parley_proto::ConversationId;

/// A typing state transition that needs to go on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TypingSignal {
    Start(ConversationId),
    Stop(ConversationId),
}

#[derive(Debug, Clone, Copy)]
struct ActiveTyping<I> {
    conversation_id: ConversationId,
    last_sent: I,
    last_activity: I,
}

/// Tracks the locally-typing conversation and rate-limits signals.
#[derive(Debug)]
pub(crate) struct TypingThrottle<I> {
    throttle: Duration,
    idle_stop: Duration,
    active: Option<ActiveTyping<I>>,
}

impl<I> TypingThrottle<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    pub(crate) fn new(throttle: Duration, idle_stop: Duration) -> Self {
        Self { throttle, idle_stop, active: None }
    }

    /// Record a keystroke in `conversation_id`. Emits at most one start
    /// per throttle interval; switching conversations mid-burst stops the
    /// old one first.
    pub(crate) fn input_activity(
        &mut self,
        conversation_id: ConversationId,
        now: I,
    ) -> Vec<TypingSignal> {
        let mut signals = Vec::new();

        match self.active {
            Some(ref mut active) if active.conversation_id == conversation_id => {
                active.last_activity = now;
                if now - active.last_sent >= self.throttle {
                    active.last_sent = now;
                    signals.push(TypingSignal::Start(conversation_id));
                }
            }
            Some(active) => {
                signals.push(TypingSignal::Stop(active.conversation_id));
                signals.push(TypingSignal::Start(conversation_id));
                self.active =
                    Some(ActiveTyping { conversation_id, last_sent: now, last_activity: now });
            }
            None => {
                signals.push(TypingSignal::Start(conversation_id));
                self.active =
                    Some(ActiveTyping { conversation_id, last_sent: now, last_activity: now });
            }
        }

        signals
    }

    /// Explicit stop for `conversation_id` — on message send or
    /// conversation close. No-op if nothing is active there.
    pub(crate) fn stop(&mut self, conversation_id: ConversationId) -> Option<TypingSignal> {
        match self.active {
            Some(active) if active.conversation_id == conversation_id => {
                self.active = None;
                Some(TypingSignal::Stop(conversation_id))
            }
            _ => None,
        }
    }

    /// Auto-stop once input has been idle past the threshold.
    pub(crate) fn tick(&mut self, now: I) -> Option<TypingSignal> {
        match self.active {
            Some(active) if now - active.last_activity >= self.idle_stop => {
                self.active = None;
                Some(TypingSignal::Stop(active.conversation_id))
            }
            _ => None,
        }
    }

    /// Forget local typing state without emitting anything. Used on
    /// connection loss, where the peer's view resets anyway.
    pub(crate) fn reset(&mut self) {
        self.active = None;
    }
}
