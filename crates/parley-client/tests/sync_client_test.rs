//! End-to-end scenario tests for the sync client.
//!
//! Drive the full client through its event interface and assert on the
//! returned actions: the optimistic send pipeline, correlation-id
//! reconciliation under reordering, connection-drop rollback, and room
//! membership across reconnects.

#![allow(clippy::unwrap_used)]

use std::time::{Duration, Instant};

use parley_client::{ClientAction, ClientConfig, ClientError, ClientEvent, MessageId, SyncClient};
use parley_core::env::test_utils::MockEnv;
use parley_core::error::ConnectionError;
use parley_proto::{
    Frame, FrameHeader, Opcode, Payload,
    payloads::{ErrorPayload, HelloReply, MessageBroadcast, SendAck, SenderType, Typing},
};

const CONV_A: u128 = 0xA;
const CONV_B: u128 = 0xB;
const SELF_ID: u64 = 42;
const PEER_ID: u64 = 99;

fn hello_reply() -> Frame {
    Payload::HelloReply(HelloReply { session_id: 7, user_id: SELF_ID })
        .into_frame(FrameHeader::new(Opcode::HelloReply))
        .unwrap()
}

fn ack_frame(correlation_id: u64, message_id: u64) -> Frame {
    let mut header = FrameHeader::new(Opcode::SendAck);
    header.set_correlation_id(correlation_id);
    Payload::SendAck(SendAck {
        success: true,
        message_id: Some(message_id),
        created_at: Some(1_000),
        error: None,
    })
    .into_frame(header)
    .unwrap()
}

fn nack_frame(correlation_id: u64, error: &str) -> Frame {
    let mut header = FrameHeader::new(Opcode::SendAck);
    header.set_correlation_id(correlation_id);
    Payload::SendAck(SendAck {
        success: false,
        message_id: None,
        created_at: None,
        error: Some(error.to_string()),
    })
    .into_frame(header)
    .unwrap()
}

fn broadcast_frame(
    message_id: u64,
    sender_id: u64,
    content: &str,
    correlation_id: Option<u64>,
) -> Frame {
    Payload::MessageReceived(MessageBroadcast {
        message_id,
        conversation_id: CONV_A,
        sender_id,
        sender_type: SenderType::Recruiter,
        content: content.to_string(),
        created_at: 2_000,
        correlation_id,
    })
    .into_frame(FrameHeader::new(Opcode::MessageReceived))
    .unwrap()
}

fn connected_client() -> SyncClient<MockEnv> {
    let mut client = SyncClient::new(MockEnv::new(), ClientConfig::default());
    client.handle(ClientEvent::Connect { token: "token-1".to_string() }).unwrap();
    client.handle(ClientEvent::TransportOpened).unwrap();
    client.handle(ClientEvent::FrameReceived(hello_reply())).unwrap();
    assert!(client.is_connected());
    client
}

fn sent_frames(actions: &[ClientAction]) -> Vec<Frame> {
    actions
        .iter()
        .filter_map(|a| match a {
            ClientAction::Send(frame) => Some(frame.clone()),
            _ => None,
        })
        .collect()
}

fn sent_opcodes(actions: &[ClientAction]) -> Vec<Opcode> {
    sent_frames(actions).iter().filter_map(|f| f.header.opcode_enum()).collect()
}

#[test]
fn optimistic_send_appears_pending_then_promotes_in_place() {
    let mut client = connected_client();

    let actions = client
        .handle(ClientEvent::SendMessage { conversation_id: CONV_A, content: "hello".to_string() })
        .unwrap();

    // Pending record first (render before any network round trip), then
    // the wire frame. MockEnv ids are sequential, so the first send gets
    // correlation id 1.
    let pending = actions
        .iter()
        .find_map(|a| match a {
            ClientAction::MessagePending(record) => Some(record.clone()),
            _ => None,
        })
        .expect("pending record");
    assert_eq!(pending.id, MessageId::Local(1));
    assert_eq!(pending.content, "hello");
    assert!(pending.pending);
    assert_eq!(pending.created_at, None);
    assert_eq!(pending.sender_id, SELF_ID);

    let frames = sent_frames(&actions);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].header.opcode_enum(), Some(Opcode::SendMessage));
    assert_eq!(frames[0].header.correlation_id(), 1);
    assert_eq!(frames[0].header.conversation_id(), CONV_A);
    assert_eq!(client.pending_count(), 1);

    // The ack promotes the entry in place: same correlation id, server id
    // and timestamp attached, pending flag cleared.
    let actions = client.handle(ClientEvent::FrameReceived(ack_frame(1, 123))).unwrap();
    match &actions[..] {
        [ClientAction::MessageConfirmed { correlation_id: 1, record }] => {
            assert_eq!(record.id, MessageId::Server(123));
            assert_eq!(record.content, "hello");
            assert_eq!(record.created_at, Some(1_000));
            assert!(!record.pending);
        },
        other => panic!("expected single MessageConfirmed, got {other:?}"),
    }
    assert_eq!(client.pending_count(), 0);
}

#[test]
fn acks_reconcile_by_correlation_id_not_arrival_order() {
    let mut client = connected_client();

    client
        .handle(ClientEvent::SendMessage { conversation_id: CONV_A, content: "first".to_string() })
        .unwrap();
    client
        .handle(ClientEvent::SendMessage { conversation_id: CONV_A, content: "second".to_string() })
        .unwrap();

    // Acks arrive out of order; each must land on its own entry.
    let actions = client.handle(ClientEvent::FrameReceived(ack_frame(2, 200))).unwrap();
    match &actions[..] {
        [ClientAction::MessageConfirmed { correlation_id: 2, record }] => {
            assert_eq!(record.content, "second");
            assert_eq!(record.id, MessageId::Server(200));
        },
        other => panic!("expected MessageConfirmed for second send, got {other:?}"),
    }

    let actions = client.handle(ClientEvent::FrameReceived(ack_frame(1, 100))).unwrap();
    match &actions[..] {
        [ClientAction::MessageConfirmed { correlation_id: 1, record }] => {
            assert_eq!(record.content, "first");
            assert_eq!(record.id, MessageId::Server(100));
        },
        other => panic!("expected MessageConfirmed for first send, got {other:?}"),
    }

    assert_eq!(client.pending_count(), 0);
}

#[test]
fn echo_beats_ack_and_late_ack_is_dropped() {
    let mut client = connected_client();

    client
        .handle(ClientEvent::SendMessage { conversation_id: CONV_A, content: "race".to_string() })
        .unwrap();

    // Broadcast echo (correlated to our send) arrives before the ack.
    let echo = broadcast_frame(500, SELF_ID, "race", Some(1));
    let actions = client.handle(ClientEvent::FrameReceived(echo)).unwrap();
    assert!(matches!(
        actions[..],
        [ClientAction::MessageConfirmed { correlation_id: 1, .. }]
    ));
    assert_eq!(client.pending_count(), 0);

    // The losing ack finds no pending entry and is logged away; it must
    // not produce a second confirmation or a new list entry.
    let actions = client.handle(ClientEvent::FrameReceived(ack_frame(1, 500))).unwrap();
    assert!(matches!(actions[..], [ClientAction::Log { .. }]));

    // A redelivery of the same message id is also dropped.
    let redelivery = broadcast_frame(500, SELF_ID, "race", None);
    let actions = client.handle(ClientEvent::FrameReceived(redelivery)).unwrap();
    assert!(matches!(actions[..], [ClientAction::Log { .. }]));
}

#[test]
fn rejected_send_restores_the_draft() {
    let mut client = connected_client();

    client
        .handle(ClientEvent::SendMessage { conversation_id: CONV_A, content: "draft".to_string() })
        .unwrap();

    let actions = client
        .handle(ClientEvent::FrameReceived(nack_frame(1, "conversation not found")))
        .unwrap();
    match &actions[..] {
        [ClientAction::MessageFailed { correlation_id: 1, conversation_id, draft, reason }] => {
            assert_eq!(*conversation_id, CONV_A);
            assert_eq!(draft, "draft");
            assert_eq!(reason, "conversation not found");
        },
        other => panic!("expected MessageFailed, got {other:?}"),
    }
    assert_eq!(client.pending_count(), 0);
}

#[test]
fn unacked_send_times_out_with_draft_intact() {
    let mut client = connected_client();

    client
        .handle(ClientEvent::SendMessage { conversation_id: CONV_A, content: "slow".to_string() })
        .unwrap();

    // Within the deadline nothing happens.
    let actions = client.handle(ClientEvent::Tick { now: Instant::now() }).unwrap();
    assert!(!actions.iter().any(|a| matches!(a, ClientAction::MessageFailed { .. })));

    let actions =
        client.handle(ClientEvent::Tick { now: Instant::now() + Duration::from_secs(11) }).unwrap();
    let failed = actions
        .iter()
        .find_map(|a| match a {
            ClientAction::MessageFailed { draft, reason, .. } => {
                Some((draft.clone(), reason.clone()))
            },
            _ => None,
        })
        .expect("timed-out send fails");
    assert_eq!(failed.0, "slow");
    assert_eq!(failed.1, "ack timeout");
    assert_eq!(client.pending_count(), 0);
}

#[test]
fn send_while_disconnected_is_rejected_up_front() {
    let mut client = SyncClient::new(MockEnv::new(), ClientConfig::default());

    let result = client
        .handle(ClientEvent::SendMessage { conversation_id: CONV_A, content: "kept".to_string() });
    assert!(matches!(result, Err(ClientError::NotConnected)));

    // Nothing was queued; no phantom entry can ever resolve.
    assert_eq!(client.pending_count(), 0);
}

#[test]
fn connection_drop_rolls_back_every_inflight_send() {
    let mut client = connected_client();

    client
        .handle(ClientEvent::SendMessage { conversation_id: CONV_A, content: "one".to_string() })
        .unwrap();
    client
        .handle(ClientEvent::SendMessage { conversation_id: CONV_A, content: "two".to_string() })
        .unwrap();
    assert_eq!(client.pending_count(), 2);

    let actions = client
        .handle(ClientEvent::TransportLost { reason: "connection reset".to_string() })
        .unwrap();

    let drafts: Vec<String> = actions
        .iter()
        .filter_map(|a| match a {
            ClientAction::MessageFailed { draft, .. } => Some(draft.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(drafts, vec!["one", "two"]);
    assert_eq!(client.pending_count(), 0);
    assert!(!client.is_connected());
}

#[test]
fn open_conversation_joins_and_switch_leaves_old_first() {
    let mut client = connected_client();

    let actions = client.handle(ClientEvent::OpenConversation { conversation_id: CONV_A }).unwrap();
    let frames = sent_frames(&actions);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].header.opcode_enum(), Some(Opcode::JoinConversation));
    assert_eq!(frames[0].header.conversation_id(), CONV_A);

    let actions = client.handle(ClientEvent::OpenConversation { conversation_id: CONV_B }).unwrap();
    assert_eq!(
        sent_opcodes(&actions),
        vec![Opcode::LeaveConversation, Opcode::JoinConversation]
    );

    // Stale close from the abandoned view: no wire traffic.
    let actions = client.handle(ClientEvent::CloseConversation { conversation_id: CONV_A }).unwrap();
    assert!(sent_frames(&actions).is_empty());
    assert_eq!(client.active_conversation(), Some(CONV_B));

    let actions = client.handle(ClientEvent::CloseConversation { conversation_id: CONV_B }).unwrap();
    assert_eq!(sent_opcodes(&actions), vec![Opcode::LeaveConversation]);
    assert_eq!(client.active_conversation(), None);
}

#[test]
fn reopening_same_conversation_is_idempotent() {
    let mut client = connected_client();

    client.handle(ClientEvent::OpenConversation { conversation_id: CONV_A }).unwrap();
    let actions = client.handle(ClientEvent::OpenConversation { conversation_id: CONV_A }).unwrap();
    assert!(actions.is_empty());
}

#[test]
fn reconnect_rejoins_exactly_the_active_conversation() {
    let mut client = connected_client();
    client.handle(ClientEvent::OpenConversation { conversation_id: CONV_A }).unwrap();
    client.handle(ClientEvent::OpenConversation { conversation_id: CONV_B }).unwrap();

    client.handle(ClientEvent::TransportLost { reason: "reset".to_string() }).unwrap();
    assert!(!client.is_connected());

    // Backoff elapses, redial fires.
    let actions =
        client.handle(ClientEvent::Tick { now: Instant::now() + Duration::from_secs(1) }).unwrap();
    assert!(matches!(actions[..], [ClientAction::Dial]));

    client.handle(ClientEvent::TransportOpened).unwrap();
    let actions = client.handle(ClientEvent::FrameReceived(hello_reply())).unwrap();

    // Exactly one join, for the room that was active at drop time.
    let frames = sent_frames(&actions);
    let joins: Vec<_> = frames
        .iter()
        .filter(|f| f.header.opcode_enum() == Some(Opcode::JoinConversation))
        .collect();
    assert_eq!(joins.len(), 1);
    assert_eq!(joins[0].header.conversation_id(), CONV_B);
}

#[test]
fn exhausted_reconnects_surface_connection_failed() {
    let mut client = connected_client();

    let mut gave_up = false;
    for attempt in 1..=4u64 {
        let actions = client
            .handle(ClientEvent::TransportLost { reason: "reset".to_string() })
            .unwrap();

        if actions.iter().any(|a| matches!(a, ClientAction::ConnectionFailed { .. })) {
            gave_up = true;
            break;
        }

        // Wait out the backoff (1s, 2s, 4s with defaults) and redial.
        let actions = client
            .handle(ClientEvent::Tick {
                now: Instant::now() + Duration::from_secs(1 << (attempt - 1)),
            })
            .unwrap();
        assert!(matches!(actions[..], [ClientAction::Dial]));
        client.handle(ClientEvent::TransportOpened).unwrap();
    }

    assert!(gave_up, "fourth drop should exhaust the attempt cap");
    assert!(!client.is_connected());

    // Only an explicit reconnect leaves the failed state.
    let actions = client.handle(ClientEvent::Connect { token: "token-2".to_string() }).unwrap();
    assert!(matches!(actions[..], [ClientAction::Dial]));
}

#[test]
fn server_goodbye_rolls_back_sends_and_reconnect_rejoins() {
    let mut client = connected_client();
    client.handle(ClientEvent::OpenConversation { conversation_id: CONV_A }).unwrap();
    client
        .handle(ClientEvent::SendMessage {
            conversation_id: CONV_A,
            content: "in flight".to_string(),
        })
        .unwrap();

    let goodbye = Payload::Goodbye(parley_proto::payloads::Goodbye {
        reason: "maintenance".to_string(),
    })
    .into_frame(FrameHeader::new(Opcode::Goodbye))
    .unwrap();

    // Goodbye ends the session like a drop does: socket closed, every
    // in-flight send rolled back with its draft.
    let actions = client.handle(ClientEvent::FrameReceived(goodbye)).unwrap();
    assert!(actions.iter().any(|a| matches!(a, ClientAction::Close { .. })));
    let drafts: Vec<&str> = actions
        .iter()
        .filter_map(|a| match a {
            ClientAction::MessageFailed { draft, .. } => Some(draft.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(drafts, vec!["in flight"]);
    assert_eq!(client.pending_count(), 0);
    assert!(!client.is_connected());

    // An explicit reconnect restores the tracked room subscription.
    client.handle(ClientEvent::Connect { token: "token-2".to_string() }).unwrap();
    client.handle(ClientEvent::TransportOpened).unwrap();
    let actions = client.handle(ClientEvent::FrameReceived(hello_reply())).unwrap();

    let frames = sent_frames(&actions);
    let joins: Vec<_> = frames
        .iter()
        .filter(|f| f.header.opcode_enum() == Some(Opcode::JoinConversation))
        .collect();
    assert_eq!(joins.len(), 1);
    assert_eq!(joins[0].header.conversation_id(), CONV_A);
}

#[test]
fn auth_rejection_is_fatal_and_not_retried() {
    let mut client = SyncClient::new(MockEnv::new(), ClientConfig::default());
    client.handle(ClientEvent::Connect { token: "expired".to_string() }).unwrap();
    client.handle(ClientEvent::TransportOpened).unwrap();

    let error = Payload::Error(ErrorPayload::auth_failed("token expired"))
        .into_frame(FrameHeader::new(Opcode::Error))
        .unwrap();

    let result = client.handle(ClientEvent::FrameReceived(error));
    assert!(matches!(
        result,
        Err(ClientError::Connection(ConnectionError::AuthRejected { .. }))
    ));
    assert!(!client.is_connected());

    // No automatic redial, ever.
    let actions =
        client.handle(ClientEvent::Tick { now: Instant::now() + Duration::from_secs(3600) }).unwrap();
    assert!(actions.is_empty());
}

#[test]
fn typing_bursts_collapse_and_send_stops_the_indicator() {
    let mut client = connected_client();
    client.handle(ClientEvent::OpenConversation { conversation_id: CONV_A }).unwrap();

    let actions = client.handle(ClientEvent::InputActivity { conversation_id: CONV_A }).unwrap();
    assert_eq!(sent_opcodes(&actions), vec![Opcode::UserTyping]);

    // Subsequent keystrokes inside the throttle window are silent.
    let actions = client.handle(ClientEvent::InputActivity { conversation_id: CONV_A }).unwrap();
    assert!(actions.is_empty());

    // Sending the draft emits the stop before the message frame.
    let actions = client
        .handle(ClientEvent::SendMessage { conversation_id: CONV_A, content: "done".to_string() })
        .unwrap();
    assert_eq!(sent_opcodes(&actions), vec![Opcode::UserStopTyping, Opcode::SendMessage]);
}

#[test]
fn peer_typing_indicators_are_surfaced_but_own_echo_is_not() {
    let mut client = connected_client();

    let peer_typing = Payload::UserTyping(Typing { conversation_id: CONV_A, user_id: PEER_ID })
        .into_frame(FrameHeader::new(Opcode::UserTyping))
        .unwrap();
    let actions = client.handle(ClientEvent::FrameReceived(peer_typing)).unwrap();
    assert!(matches!(
        actions[..],
        [ClientAction::TypingChanged { user_id: PEER_ID, typing: true, .. }]
    ));

    let own_echo = Payload::UserTyping(Typing { conversation_id: CONV_A, user_id: SELF_ID })
        .into_frame(FrameHeader::new(Opcode::UserTyping))
        .unwrap();
    let actions = client.handle(ClientEvent::FrameReceived(own_echo)).unwrap();
    assert!(actions.is_empty());
}

#[test]
fn read_receipts_round_trip() {
    let mut client = connected_client();

    let actions = client
        .handle(ClientEvent::MarkRead { conversation_id: CONV_A, message_ids: vec![10, 11] })
        .unwrap();
    assert_eq!(sent_opcodes(&actions), vec![Opcode::MessageRead]);

    let receipt = Payload::MessagesMarkedRead(parley_proto::payloads::ReadReceipt {
        conversation_id: CONV_A,
        message_ids: vec![10, 11],
        marked_count: 2,
        read_by: PEER_ID,
        read_at: 3_000,
    })
    .into_frame(FrameHeader::new(Opcode::MessagesMarkedRead))
    .unwrap();

    let actions = client.handle(ClientEvent::FrameReceived(receipt)).unwrap();
    match &actions[..] {
        [ClientAction::MessagesRead { conversation_id, message_ids, read_by, read_at }] => {
            assert_eq!(*conversation_id, CONV_A);
            assert_eq!(message_ids, &vec![10, 11]);
            assert_eq!(*read_by, PEER_ID);
            assert_eq!(*read_at, 3_000);
        },
        other => panic!("expected MessagesRead, got {other:?}"),
    }
}

#[test]
fn incoming_message_from_peer_is_appended() {
    let mut client = connected_client();

    let frame = broadcast_frame(777, PEER_ID, "hi there", None);
    let actions = client.handle(ClientEvent::FrameReceived(frame)).unwrap();
    match &actions[..] {
        [ClientAction::MessageReceived(record)] => {
            assert_eq!(record.id, MessageId::Server(777));
            assert_eq!(record.sender_id, PEER_ID);
            assert_eq!(record.content, "hi there");
            assert!(!record.pending);
        },
        other => panic!("expected MessageReceived, got {other:?}"),
    }
}

#[test]
fn post_handshake_error_is_conversation_scoped() {
    let mut client = connected_client();

    let mut header = FrameHeader::new(Opcode::Error);
    header.set_conversation_id(CONV_A);
    let frame = Payload::Error(ErrorPayload::conversation_not_found(CONV_A))
        .into_frame(header)
        .unwrap();

    let actions = client.handle(ClientEvent::FrameReceived(frame)).unwrap();
    match &actions[..] {
        [ClientAction::MessageError { conversation_id, .. }] => {
            assert_eq!(*conversation_id, CONV_A);
        },
        other => panic!("expected MessageError, got {other:?}"),
    }
}
