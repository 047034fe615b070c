//! Conversation event dispatch.
//!
//! A single consumer observes the active conversation at a time. Attaching
//! a new consumer replaces the previous one; detaching carries a
//! generation token so a stale detach (issued for a consumer that was
//! already replaced) cannot tear down its successor.

use parley_proto::{ConversationId, ServerMessageId, UserId};

use crate::event::{ClientAction, MessageRecord};

/// Receives events for the conversation it is attached to.
///
/// All callbacks run synchronously on the client's event loop; consumers
/// must not block.
pub trait ConversationConsumer {
    /// A message from another participant arrived.
    fn on_message(&mut self, record: &MessageRecord);

    /// An optimistic send was acknowledged; `record` carries the
    /// server-assigned id replacing the temp id under `correlation_id`.
    fn on_message_confirmed(&mut self, correlation_id: u64, record: &MessageRecord);

    /// An optimistic send failed; `draft` is the original text for
    /// restoration into the compose box.
    fn on_message_failed(&mut self, correlation_id: u64, draft: &str, reason: &str);

    /// The server reported a conversation-scoped error outside the send
    /// pipeline.
    fn on_message_error(&mut self, reason: &str);

    /// A participant started or stopped typing.
    fn on_typing(&mut self, user_id: UserId, typing: bool);

    /// Messages were marked read by a participant.
    fn on_messages_read(&mut self, message_ids: &[ServerMessageId], read_by: UserId, read_at: u64);
}

/// Handle returned by [`Dispatcher::attach`]; required to detach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    conversation_id: ConversationId,
    generation: u64,
}

impl Subscription {
    /// The conversation this subscription observes.
    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }
}

struct ActiveConsumer {
    conversation_id: ConversationId,
    generation: u64,
    consumer: Box<dyn ConversationConsumer>,
}

/// Routes conversation-scoped actions to the attached consumer.
#[derive(Default)]
pub struct Dispatcher {
    active: Option<ActiveConsumer>,
    next_generation: u64,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("active", &self.active.as_ref().map(|a| a.conversation_id))
            .field("next_generation", &self.next_generation)
            .finish()
    }
}

impl Dispatcher {
    /// Attach `consumer` to `conversation_id`, replacing any prior
    /// consumer.
    pub fn attach(
        &mut self,
        conversation_id: ConversationId,
        consumer: Box<dyn ConversationConsumer>,
    ) -> Subscription {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.active = Some(ActiveConsumer { conversation_id, generation, consumer });
        Subscription { conversation_id, generation }
    }

    /// Detach the consumer identified by `subscription`. A stale token —
    /// one whose consumer was already replaced — is a no-op.
    pub fn detach(&mut self, subscription: &Subscription) {
        if let Some(active) = &self.active {
            if active.generation == subscription.generation {
                self.active = None;
            }
        }
    }

    /// Conversation the active consumer observes, if any.
    pub fn active_conversation(&self) -> Option<ConversationId> {
        self.active.as_ref().map(|a| a.conversation_id)
    }

    /// Forward a conversation-scoped action to the consumer when it
    /// targets the active conversation. Actions for other conversations
    /// and non-conversation actions pass through silently.
    pub fn dispatch(&mut self, action: &ClientAction) {
        let Some(active) = &mut self.active else {
            return;
        };

        match action {
            ClientAction::MessageReceived(record) if record.conversation_id == active.conversation_id => {
                active.consumer.on_message(record);
            }
            ClientAction::MessageConfirmed { correlation_id, record }
                if record.conversation_id == active.conversation_id =>
            {
                active.consumer.on_message_confirmed(*correlation_id, record);
            }
            ClientAction::MessageFailed { correlation_id, conversation_id, draft, reason }
                if *conversation_id == active.conversation_id =>
            {
                active.consumer.on_message_failed(*correlation_id, draft, reason);
            }
            ClientAction::MessageError { conversation_id, reason }
                if *conversation_id == active.conversation_id =>
            {
                active.consumer.on_message_error(reason);
            }
            ClientAction::TypingChanged { conversation_id, user_id, typing }
                if *conversation_id == active.conversation_id =>
            {
                active.consumer.on_typing(*user_id, *typing);
            }
            ClientAction::MessagesRead { conversation_id, message_ids, read_by, read_at }
                if *conversation_id == active.conversation_id =>
            {
                active.consumer.on_messages_read(message_ids, *read_by, *read_at);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use parley_proto::payloads::SenderType;

    use super::*;
    use crate::event::MessageId;

    struct Recorder {
        log: Rc<RefCell<Vec<String>>>,
        tag: &'static str,
    }

    impl ConversationConsumer for Recorder {
        fn on_message(&mut self, record: &MessageRecord) {
            self.log.borrow_mut().push(format!("{}:message:{}", self.tag, record.content));
        }

        fn on_message_confirmed(&mut self, correlation_id: u64, record: &MessageRecord) {
            self.log
                .borrow_mut()
                .push(format!("{}:confirmed:{correlation_id}:{:?}", self.tag, record.id));
        }

        fn on_message_failed(&mut self, correlation_id: u64, draft: &str, reason: &str) {
            self.log
                .borrow_mut()
                .push(format!("{}:failed:{correlation_id}:{draft}:{reason}", self.tag));
        }

        fn on_message_error(&mut self, reason: &str) {
            self.log.borrow_mut().push(format!("{}:error:{reason}", self.tag));
        }

        fn on_typing(&mut self, user_id: UserId, typing: bool) {
            self.log.borrow_mut().push(format!("{}:typing:{user_id}:{typing}", self.tag));
        }

        fn on_messages_read(&mut self, ids: &[ServerMessageId], read_by: UserId, _read_at: u64) {
            self.log.borrow_mut().push(format!("{}:read:{ids:?}:{read_by}", self.tag));
        }
    }

    fn record(conversation_id: u128, content: &str) -> MessageRecord {
        MessageRecord {
            id: MessageId::Server(1),
            conversation_id,
            sender_id: 7,
            sender_type: SenderType::Candidate,
            content: content.to_string(),
            created_at: Some(1000),
            is_read: false,
            pending: false,
        }
    }

    #[test]
    fn routes_only_active_conversation() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut d = Dispatcher::default();
        d.attach(1, Box::new(Recorder { log: Rc::clone(&log), tag: "a" }));

        d.dispatch(&ClientAction::MessageReceived(record(1, "hit")));
        d.dispatch(&ClientAction::MessageReceived(record(2, "miss")));

        assert_eq!(*log.borrow(), vec!["a:message:hit"]);
    }

    #[test]
    fn attach_replaces_prior_consumer() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut d = Dispatcher::default();
        d.attach(1, Box::new(Recorder { log: Rc::clone(&log), tag: "old" }));
        d.attach(1, Box::new(Recorder { log: Rc::clone(&log), tag: "new" }));

        d.dispatch(&ClientAction::MessageReceived(record(1, "x")));

        assert_eq!(*log.borrow(), vec!["new:message:x"]);
    }

    #[test]
    fn stale_detach_leaves_successor_attached() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut d = Dispatcher::default();
        let stale = d.attach(1, Box::new(Recorder { log: Rc::clone(&log), tag: "old" }));
        d.attach(2, Box::new(Recorder { log: Rc::clone(&log), tag: "new" }));

        d.detach(&stale);
        assert_eq!(d.active_conversation(), Some(2));

        d.dispatch(&ClientAction::TypingChanged { conversation_id: 2, user_id: 9, typing: true });
        assert_eq!(*log.borrow(), vec!["new:typing:9:true"]);
    }

    #[test]
    fn detach_with_current_token_clears_consumer() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut d = Dispatcher::default();
        let sub = d.attach(1, Box::new(Recorder { log: Rc::clone(&log), tag: "a" }));

        d.detach(&sub);
        assert_eq!(d.active_conversation(), None);

        d.dispatch(&ClientAction::MessageReceived(record(1, "dropped")));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn failure_and_read_callbacks_carry_payloads() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut d = Dispatcher::default();
        d.attach(5, Box::new(Recorder { log: Rc::clone(&log), tag: "a" }));

        d.dispatch(&ClientAction::MessageFailed {
            correlation_id: 42,
            conversation_id: 5,
            draft: "hello".to_string(),
            reason: "ack timeout".to_string(),
        });
        d.dispatch(&ClientAction::MessagesRead {
            conversation_id: 5,
            message_ids: vec![10, 11],
            read_by: 3,
            read_at: 2000,
        });

        assert_eq!(
            *log.borrow(),
            vec!["a:failed:42:hello:ack timeout", "a:read:[10, 11]:3"]
        );
    }
}
