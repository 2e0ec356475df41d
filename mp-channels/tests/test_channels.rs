//! Adapter integration tests.
//!
//! Each test mounts adapters from a registry backed by the in-memory
//! connector and plays the server side through `MemoryPeer`.

mod common;

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use mp_channels::{ChannelHook, MessageLog, Presence, TypingIndicator};
use mp_socket::{Attachment, Envelope, OutboundFrame};

// ---- Chat ----

#[tokio::test(start_paused = true)]
async fn chat_without_id_does_not_connect_or_send() {
    let (registry, connector) = common::create_test_registry();
    let chat = registry.chat(None).unwrap();
    common::settle().await;
    assert_eq!(connector.attempts(), 0);

    chat.send_message("hello", None);
    chat.mark_as_read(&[1, 2]);
    chat.start_typing();
    chat.stop_typing();
    assert!(!chat.is_connected());
    assert!(!chat.has_joined());
    drop(chat);
    assert_eq!(connector.attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn chat_joins_on_open_and_emits_typed_events() {
    let (registry, connector) = common::create_test_registry();
    let chat = registry.chat(Some(7)).unwrap();
    common::settle().await;

    let mut peer = connector.try_next_peer().expect("chat connected");
    assert_eq!(
        peer.url().as_str(),
        "ws://localhost:8080/ws/chats?token=test-token"
    );
    assert!(chat.has_joined());
    assert_eq!(
        peer.drain_envelopes(),
        vec![Envelope::new("join_chat", json!({"chat_id": 7}))]
    );

    chat.send_message("hi", None);
    chat.send_message(
        "plan",
        Some(vec![Attachment {
            file_name: "sofa.png".into(),
            url: "https://cdn.example/sofa.png".into(),
            content_type: None,
        }]),
    );
    chat.mark_as_read(&[10, 11]);
    chat.start_typing();
    chat.stop_typing();

    let sent = peer.drain_envelopes();
    assert_eq!(
        common::event_names(&sent),
        vec!["send_message", "send_message", "mark_read", "typing_start", "typing_stop"]
    );
    assert_eq!(sent[0].data, json!({"chat_id": 7, "content": "hi"}));
    assert_eq!(
        sent[1].data["attachments"][0]["file_name"],
        json!("sofa.png")
    );
    assert_eq!(sent[2].data, json!({"chat_id": 7, "message_ids": [10, 11]}));
    assert_eq!(sent[3].data, json!({"chat_id": 7}));
}

#[tokio::test(start_paused = true)]
async fn chat_leaves_before_disconnecting_on_drop() {
    let (registry, connector) = common::create_test_registry();
    let chat = registry.chat(Some(3)).unwrap();
    common::settle().await;
    let mut peer = connector.try_next_peer().unwrap();
    peer.drain();

    drop(chat);
    let frames = peer.drain();
    assert_eq!(frames.len(), 2);
    match &frames[0] {
        OutboundFrame::Text(text) => {
            let env = Envelope::decode(text).unwrap().unwrap();
            assert_eq!(env, Envelope::new("leave_chat", json!({"chat_id": 3})));
        }
        other => panic!("expected leave_chat, got {other:?}"),
    }
    assert_eq!(
        frames[1],
        OutboundFrame::Close {
            code: 1000,
            reason: "Client disconnect".into()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn chat_rejoins_after_reconnect() {
    let (registry, connector) = common::create_test_registry();
    let chat = registry.chat(Some(9)).unwrap();
    common::settle().await;
    let first = connector.try_next_peer().unwrap();

    drop(first);
    common::settle().await;
    assert!(!chat.has_joined());

    tokio::time::advance(common::RETRY_DELAY).await;
    common::settle().await;
    let mut second = connector.try_next_peer().expect("reconnected");
    assert!(chat.has_joined());
    assert_eq!(
        second.drain_envelopes(),
        vec![Envelope::new("join_chat", json!({"chat_id": 9}))]
    );
}

#[tokio::test(start_paused = true)]
async fn chat_joins_once_per_transport() {
    let (registry, connector) = common::create_test_registry();
    let connection = registry.get(mp_channels::Channel::Chats).unwrap();
    connection.connect();
    common::settle().await;
    let mut peer = connector.try_next_peer().unwrap();

    // Mounted over an already open transport: joins from mount.
    let chat = registry.chat(Some(5)).unwrap();
    assert!(chat.has_joined());

    // An open notification for the same transport must not join again.
    connection
        .dispatcher()
        .dispatch("connection", &json!({"connected": true}));
    common::settle().await;

    assert_eq!(
        peer.drain_envelopes(),
        vec![Envelope::new("join_chat", json!({"chat_id": 5}))]
    );
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn chat_receives_new_message_broadcast() {
    let (registry, connector) = common::create_test_registry();
    let chat = registry.chat(Some(7)).unwrap();
    common::settle().await;
    let peer = connector.try_next_peer().unwrap();

    let bodies = Arc::new(Mutex::new(Vec::new()));
    let sink = bodies.clone();
    let _sub = chat.on_new_message(move |payload| {
        sink.lock().push((
            payload.chat_id,
            payload.message.body().map(str::to_string),
            payload.message.sender.map(|s| s.id),
        ))
    });

    peer.send_envelope(&Envelope::new(
        "new_message",
        json!({
            "chatId": 7,
            "message": {"id": 1, "content": "Is the wardrobe available?", "sender": {"id": 42, "name": "Aigerim"}}
        }),
    ));
    // Wrong shape: logged and skipped.
    peer.send_envelope(&Envelope::new("new_message", json!({"chatId": "x"})));
    common::settle().await;

    assert_eq!(
        *bodies.lock(),
        vec![(7, Some("Is the wardrobe available?".to_string()), Some(42))]
    );
}

// ---- Requests & notifications ----

#[tokio::test(start_paused = true)]
async fn requests_subscribe_and_unsubscribe() {
    let (registry, connector) = common::create_test_registry();
    let requests = registry.requests().unwrap();
    common::settle().await;
    let mut peer = connector.try_next_peer().unwrap();
    assert!(peer.url().path().ends_with("/ws/requests"));

    let updates = Arc::new(Mutex::new(Vec::new()));
    let sink = updates.clone();
    let _sub = requests.on_request_update(move |u| sink.lock().push((u.request_id, u.status)));

    requests.subscribe_to_request(55);
    peer.send_envelope(&Envelope::new(
        "request_update",
        json!({"requestId": 55, "status": "responded"}),
    ));
    requests.unsubscribe_from_request(55);
    common::settle().await;

    assert_eq!(
        peer.drain_envelopes(),
        vec![
            Envelope::new("subscribe_request", json!({"request_id": 55})),
            Envelope::new("unsubscribe_request", json!({"request_id": 55})),
        ]
    );
    assert_eq!(*updates.lock(), vec![(55, Some("responded".to_string()))]);
}

#[tokio::test(start_paused = true)]
async fn notifications_deliver_and_disconnect_on_drop() {
    let (registry, connector) = common::create_test_registry();
    let notifications = registry.notifications().unwrap();
    common::settle().await;
    let peer = connector.try_next_peer().unwrap();

    let titles = Arc::new(Mutex::new(Vec::new()));
    let sink = titles.clone();
    let sub = notifications.on_notification(move |n| sink.lock().push(n.title));

    peer.send_envelope(&Envelope::new(
        "notification",
        json!({"id": 1, "type": "new_response", "title": "New offer"}),
    ));
    common::settle().await;
    assert_eq!(*titles.lock(), vec![Some("New offer".to_string())]);

    drop(sub);
    drop(notifications);
    assert!(!registry.is_connected(mp_channels::Channel::Notifications));
}

// ---- Hook ----

#[tokio::test(start_paused = true)]
async fn hook_connected_watch_follows_server_close() {
    let (registry, connector) = common::create_test_registry();
    let connection = registry.get(mp_channels::Channel::Notifications).unwrap();
    let hook = ChannelHook::mount(connection.clone(), true);
    let connected = hook.connected();
    common::settle().await;
    assert!(*connected.borrow());

    let peer = connector.try_next_peer().unwrap();
    peer.close(1000, "bye");
    common::settle().await;
    assert!(!*connected.borrow());
    assert!(!hook.is_connected());
}

// ---- Local state bound to events ----

#[tokio::test(start_paused = true)]
async fn typing_indicator_bound_to_chat_events() {
    let (registry, connector) = common::create_test_registry();
    let chat = registry.chat(Some(1)).unwrap();
    common::settle().await;
    let peer = connector.try_next_peer().unwrap();

    let typing = TypingIndicator::new();
    let guards = typing.bind(chat.hook().connection());

    peer.send_envelope(&Envelope::new("typing_start", json!({"userId": 4, "userName": "Dana"})));
    peer.send_envelope(&Envelope::new("typing_start", json!({"userId": 5, "userName": "Erlan"})));
    peer.send_envelope(&Envelope::new("typing_stop", json!({"userId": 4, "userName": "Dana"})));
    common::settle().await;
    assert_eq!(typing.typing_users(), vec![5]);
    assert!(typing.is_typing());

    drop(guards);
    peer.send_envelope(&Envelope::new("typing_start", json!({"userId": 6})));
    common::settle().await;
    assert_eq!(typing.typing_users(), vec![5]);
}

#[tokio::test(start_paused = true)]
async fn presence_bound_to_status_events() {
    let (registry, connector) = common::create_test_registry();
    let chat = registry.chat(Some(1)).unwrap();
    common::settle().await;
    let peer = connector.try_next_peer().unwrap();

    let presence = Presence::new();
    let _guards = presence.bind(chat.hook().connection());

    peer.send_envelope(&Envelope::new("user_online", json!({"userId": 1})));
    peer.send_envelope(&Envelope::new("user_status_changed", json!({"userId": 2, "isActive": true})));
    peer.send_envelope(&Envelope::new("user_status_changed", json!({"userId": 1, "isActive": false})));
    peer.send_envelope(&Envelope::new("user_online", json!({"userId": 3})));
    peer.send_envelope(&Envelope::new("user_offline", json!({"userId": 3})));
    common::settle().await;

    assert_eq!(presence.online_users(), vec![2]);
}

#[tokio::test(start_paused = true)]
async fn message_log_listens_with_filter() {
    let (registry, connector) = common::create_test_registry();
    let notifications = registry.notifications().unwrap();
    common::settle().await;
    let peer = connector.try_next_peer().unwrap();

    let log = MessageLog::new(Some("notification".into()));
    let task = log.listen(notifications.hook().connection());

    peer.send_envelope(&Envelope::new("notification", json!({"id": 1})));
    peer.send_envelope(&Envelope::new("chat_message", json!({"text": "hi"})));
    peer.send_envelope(&Envelope::new("notification", json!({"id": 2})));
    common::settle().await;

    let ids: Vec<_> = log
        .messages()
        .into_iter()
        .map(|m| m.envelope.data["id"].clone())
        .collect();
    assert_eq!(ids, vec![json!(1), json!(2)]);
    task.abort();
}
