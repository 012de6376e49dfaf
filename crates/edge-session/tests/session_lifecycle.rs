//! Integration tests for the listening session.
//!
//! These drive a full listener against an in-memory edge and check the
//! handshake, cursor handling, reconnection and termination behaviour.

mod common;

use common::*;
use delta_decoder::MessageEvent;
use edge_session::{start_listening, ConnectionState, HandshakeError, ListenError};
use listener_config_and_utils::{UserAgentOptions, UserAgentPool};
use mqtt_wire_protocol::{ConnAck, Packet, Publish, QoS};
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::test]
async fn test_handshake_subscribes_every_topic_and_requests_sync_once() {
    let (connector, mut servers) = memory_connector();
    let settings = test_settings(true).with_resume_from(Some(42));
    let topics = settings.protocol.topics.clone();
    let handle = start_listening(connector, settings, None);

    let (request, mut server) = next_server(&mut servers).await;
    assert!(request
        .url
        .starts_with("wss://edge-chat.facebook.com/chat?sid="));
    assert!(request
        .headers
        .contains(&("Cookie".to_string(), "c_user=1000".to_string())));

    let handshake = server.accept_handshake(topics.len()).await;
    assert_eq!(handshake.client_id, "mqttwsclient");
    assert_eq!(handshake.identity["u"], OWNER_ID);
    assert_eq!(handshake.identity["chat_on"], true);

    let mut subscribed: Vec<String> = handshake
        .subscriptions
        .iter()
        .map(|subscribe| {
            assert_eq!(subscribe.filters.len(), 1);
            subscribe.filters[0].0.clone()
        })
        .collect();
    let mut expected = topics.clone();
    subscribed.sort();
    expected.sort();
    assert_eq!(subscribed, expected);

    assert_eq!(handshake.sync.topic, "/messenger_sync_create_queue");
    assert_eq!(handshake.sync.qos, QoS::AtLeastOnce);
    assert_eq!(handshake.sync_body["initial_titan_sequence_id"], 42);
    assert_eq!(handshake.sync_body["entity_fbid"], OWNER_ID);
    assert_eq!(handshake.sync_body["sync_api_version"], 11);
    assert_eq!(handshake.sync_body["encoding"], "JSON");
    assert!(handshake.sync_body["device_params"].is_null());

    wait_for_state(&handle, ConnectionState::Open).await;
    assert_eq!(handle.handshake_count(), 1);

    handle.close().await;
    assert_eq!(server.expect_packet().await, Packet::Disconnect);
    assert!(within(server.next_packet()).await.is_none());
}

#[tokio::test]
async fn test_events_are_delivered_and_qos1_acknowledged() {
    let (connector, mut servers) = memory_connector();
    let settings = test_settings(true);
    let topic_count = settings.protocol.topics.len();
    let handle = start_listening(connector, settings, None);
    let mut messages = handle.take_message_receiver().unwrap();
    assert!(handle.take_message_receiver().is_none());

    let (_, mut server) = next_server(&mut servers).await;
    let handshake = server.accept_handshake(topic_count).await;
    assert!(handshake.sync_body["initial_titan_sequence_id"].is_null());

    server.send(Packet::Publish(Publish::new("/orca_presence", b"{}".to_vec())));

    let mut mention = reply("mid.1", PEER_ID, "hello world");
    mention["deltaMessageReply"]["message"]["data"] =
        json!({"prng": json!([{"i": OWNER_ID, "o": 0, "l": 5}]).to_string()});
    server.send(delta_publish(100, vec![mention], Some(7)));

    let event = within(messages.recv()).await.unwrap();
    assert_eq!(event.message_id, "mid.1");
    assert_eq!(event.mentions[OWNER_ID], "hello");
    assert_eq!(event.args, vec!["hello", "world"]);
    assert_eq!(event.participant_ids, vec![OWNER_ID, PEER_ID]);

    assert_eq!(server.expect_packet().await, Packet::PubAck { packet_id: 7 });
    assert_eq!(handle.resume_cursor(), Some(100));

    handle.close().await;
}

#[tokio::test]
async fn test_callback_sees_batch_in_order_and_own_messages_filtered() {
    let (connector, mut servers) = memory_connector();
    let settings = test_settings(true);
    let topic_count = settings.protocol.topics.len();

    let (seen_tx, mut seen) = mpsc::unbounded_channel::<Result<MessageEvent, ListenError>>();
    let handle = start_listening(
        connector,
        settings,
        Some(Box::new(move |result| {
            let _ = seen_tx.send(result);
        })),
    );
    assert!(handle.take_message_receiver().is_none());
    assert!(handle.take_error_receiver().is_none());

    let (_, mut server) = next_server(&mut servers).await;
    server.accept_handshake(topic_count).await;
    server.send(delta_publish(
        3,
        vec![
            reply("mid.a", PEER_ID, "first"),
            reply("mid.own", OWNER_ID, "mine"),
            json!({"deltaMessageReply": {"message": {"body": "broken"}}}),
            reply("mid.b", PEER_ID, "second"),
        ],
        None,
    ));

    let first = within(seen.recv()).await.unwrap().unwrap();
    let second = within(seen.recv()).await.unwrap().unwrap();
    assert_eq!(first.message_id, "mid.a");
    assert_eq!(second.message_id, "mid.b");

    handle.close().await;
    assert!(seen.try_recv().is_err());
}

#[tokio::test]
async fn test_reconnect_resumes_from_cursor_at_failure() {
    let (connector, mut servers) = memory_connector();
    let settings = test_settings(true).with_resume_from(Some(5));
    let topic_count = settings.protocol.topics.len();
    let handle = start_listening(connector, settings, None);
    let mut messages = handle.take_message_receiver().unwrap();
    let mut errors = handle.take_error_receiver().unwrap();

    let (_, mut first) = next_server(&mut servers).await;
    let handshake = first.accept_handshake(topic_count).await;
    assert_eq!(handshake.sync_body["initial_titan_sequence_id"], 5);

    first.send(delta_publish(100, vec![reply("mid.1", PEER_ID, "before")], None));
    within(messages.recv()).await.unwrap();
    assert_eq!(handle.resume_cursor(), Some(100));

    first.fail();

    let (_, mut second) = next_server(&mut servers).await;
    let handshake = second.accept_handshake(topic_count).await;
    assert_eq!(handshake.sync_body["initial_titan_sequence_id"], 100);
    assert_ne!(handshake.identity["s"], serde_json::Value::Null);
    assert_eq!(handle.handshake_count(), 2);

    second.send(delta_publish(50, vec![reply("mid.2", PEER_ID, "after")], None));
    let event = within(messages.recv()).await.unwrap();
    assert_eq!(event.body, "after");
    assert_eq!(handle.resume_cursor(), Some(100));

    wait_for_state(&handle, ConnectionState::Open).await;
    handle.close().await;
    assert!(errors.try_recv().is_err());
}

#[tokio::test]
async fn test_open_failures_are_retried() {
    let (connector, mut servers) = memory_connector();
    let connector = connector.failing_first(2);
    let settings = test_settings(true);
    let topic_count = settings.protocol.topics.len();
    let handle = start_listening(connector, settings, None);

    let (_, mut server) = next_server(&mut servers).await;
    server.accept_handshake(topic_count).await;
    wait_for_state(&handle, ConnectionState::Open).await;
    assert_eq!(handle.handshake_count(), 3);

    handle.close().await;
}

#[tokio::test]
async fn test_without_auto_reconnect_one_terminal_error() {
    let (connector, mut servers) = memory_connector();
    let settings = test_settings(false);
    let topic_count = settings.protocol.topics.len();
    let handle = start_listening(connector, settings, None);
    let mut errors = handle.take_error_receiver().unwrap();

    let (_, mut server) = next_server(&mut servers).await;
    server.accept_handshake(topic_count).await;
    server.fail();

    let error = within(errors.recv()).await.unwrap();
    assert_eq!(error, ListenError::server_down());
    assert_eq!(
        serde_json::to_value(&error).unwrap(),
        json!({"type": "stop_listen", "error": "Server Down"})
    );

    within(handle.terminated()).await;
    assert_eq!(handle.state(), ConnectionState::Terminated);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(servers.try_recv().is_err());
    assert_eq!(handle.handshake_count(), 1);
    assert!(within(errors.recv()).await.is_none());
}

#[tokio::test]
async fn test_handshake_rejection_is_terminal() {
    let (connector, mut servers) = memory_connector();
    let handle = start_listening(connector, test_settings(true), None);
    let mut errors = handle.take_error_receiver().unwrap();

    let (_, mut server) = next_server(&mut servers).await;
    assert!(matches!(server.expect_packet().await, Packet::Connect(_)));
    server.send(Packet::ConnAck(ConnAck {
        session_present: false,
        return_code: 5,
    }));

    let error = within(errors.recv()).await.unwrap();
    assert!(matches!(
        error,
        ListenError::Handshake(HandshakeError::Rejected { code: 5, .. })
    ));

    within(handle.terminated()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(servers.try_recv().is_err());
    assert_eq!(handle.handshake_count(), 1);
}

#[tokio::test]
async fn test_close_is_idempotent_and_silent() {
    let (connector, mut servers) = memory_connector();
    let settings = test_settings(true);
    let topic_count = settings.protocol.topics.len();
    let handle = start_listening(connector, settings, None);
    let mut messages = handle.take_message_receiver().unwrap();
    let mut errors = handle.take_error_receiver().unwrap();

    let (_, mut server) = next_server(&mut servers).await;
    server.accept_handshake(topic_count).await;
    wait_for_state(&handle, ConnectionState::Open).await;

    handle.close().await;
    handle.close().await;

    assert_eq!(handle.state(), ConnectionState::Terminated);
    assert_eq!(server.expect_packet().await, Packet::Disconnect);
    assert!(within(errors.recv()).await.is_none());
    assert!(within(messages.recv()).await.is_none());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(servers.try_recv().is_err());
}

#[tokio::test]
async fn test_close_during_backoff_stops_reconnecting() {
    let (connector, mut servers) = memory_connector();
    let mut settings = test_settings(true);
    settings.connection.reconnect_base_delay_ms = 60_000;
    settings.connection.reconnect_max_delay_ms = 60_000;
    let topic_count = settings.protocol.topics.len();
    let handle = start_listening(connector, settings, None);

    let (_, mut server) = next_server(&mut servers).await;
    server.accept_handshake(topic_count).await;
    server.close();

    wait_for_state(&handle, ConnectionState::Reconnecting).await;
    within(handle.close()).await;

    assert_eq!(handle.state(), ConnectionState::Terminated);
    assert!(servers.try_recv().is_err());
    assert_eq!(handle.handshake_count(), 1);
}

#[tokio::test]
async fn test_zero_keepalive_runs_without_pings() {
    let (connector, mut servers) = memory_connector();
    let mut settings = test_settings(false);
    settings.connection.keepalive_secs = 0;
    let topic_count = settings.protocol.topics.len();
    let handle = start_listening(connector, settings, None);
    let mut messages = handle.take_message_receiver().unwrap();
    let mut errors = handle.take_error_receiver().unwrap();

    let (_, mut server) = next_server(&mut servers).await;
    server.accept_handshake(topic_count).await;
    wait_for_state(&handle, ConnectionState::Open).await;

    server.send(delta_publish(9, vec![reply("mid.1", PEER_ID, "still here")], None));
    assert_eq!(within(messages.recv()).await.unwrap().body, "still here");
    assert_eq!(handle.resume_cursor(), Some(9));

    server.fail();
    assert_eq!(within(errors.recv()).await, Some(ListenError::server_down()));
    within(handle.terminated()).await;
    assert_eq!(handle.state(), ConnectionState::Terminated);
}

#[tokio::test]
async fn test_every_attempt_asks_the_user_agent_pool() {
    let (connector, mut servers) = memory_connector();
    let pool = UserAgentPool::new(&UserAgentOptions {
        custom: Some("pooled-agent/3.0".to_string()),
        ..Default::default()
    });
    let settings = test_settings(true).with_user_agent_pool(pool);
    let topic_count = settings.protocol.topics.len();
    let handle = start_listening(connector, settings, None);

    let user_agent = |request: &edge_transport::OpenRequest| {
        request
            .headers
            .iter()
            .find(|(name, _)| name == "User-Agent")
            .map(|(_, value)| value.clone())
    };

    let (first_request, mut first) = next_server(&mut servers).await;
    first.accept_handshake(topic_count).await;
    first.fail();

    let (second_request, mut second) = next_server(&mut servers).await;
    second.accept_handshake(topic_count).await;

    assert_eq!(user_agent(&first_request).as_deref(), Some("pooled-agent/3.0"));
    assert_eq!(user_agent(&second_request).as_deref(), Some("pooled-agent/3.0"));
    handle.close().await;
}
