//! In-memory edge used by the session integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use edge_session::{ConnectionState, ListenerHandle, ListenerSettings};
use edge_transport::{Connector, DuplexStream, OpenRequest, TransportError, TransportResult};
use listener_config_and_utils::{AppState, Config, CookieEntry};
use mqtt_wire_protocol::{ConnAck, Packet, Publish, Subscribe};
use serde_json::{json, Value};
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const OWNER_ID: &str = "1000";
pub const PEER_ID: &str = "2000";

const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Await `future`, failing the test if it takes too long.
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(STEP_TIMEOUT, future)
        .await
        .expect("step timed out")
}

fn io_error(kind: io::ErrorKind, message: &str) -> TransportError {
    TransportError::Io(io::Error::new(kind, message.to_string()))
}

pub fn test_settings(auto_reconnect: bool) -> ListenerSettings {
    let appstate = AppState::from_cookies(vec![CookieEntry {
        key: "c_user".to_string(),
        value: OWNER_ID.to_string(),
        domain: Some(".facebook.com".to_string()),
        path: Some("/".to_string()),
    }])
    .unwrap();

    let mut config = Config::default();
    config.listen.auto_reconnect = auto_reconnect;
    config.connection.connect_timeout_secs = 5;
    config.connection.reconnect_base_delay_ms = 10;
    config.connection.reconnect_max_delay_ms = 40;

    ListenerSettings::from_config(&config, &appstate, "test-agent/1.0")
}

/// Connector whose every `open` hands the server side to the test.
pub struct MemoryConnector {
    servers: mpsc::UnboundedSender<(OpenRequest, ServerEnd)>,
    failing_opens: Arc<AtomicUsize>,
}

pub fn memory_connector() -> (MemoryConnector, mpsc::UnboundedReceiver<(OpenRequest, ServerEnd)>) {
    let (servers, server_rx) = mpsc::unbounded_channel();
    let connector = MemoryConnector {
        servers,
        failing_opens: Arc::new(AtomicUsize::new(0)),
    };
    (connector, server_rx)
}

impl MemoryConnector {
    /// Refuse the next `count` opens.
    pub fn failing_first(self, count: usize) -> Self {
        self.failing_opens.store(count, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Stream = MemoryStream;

    async fn open(&self, request: &OpenRequest) -> TransportResult<MemoryStream> {
        let refused = self
            .failing_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if refused {
            return Err(io_error(io::ErrorKind::ConnectionRefused, "connection refused"));
        }

        let (to_server, from_client) = mpsc::unbounded_channel();
        let (to_client, from_server) = mpsc::unbounded_channel();
        let server = ServerEnd {
            inbound: from_client,
            outbound: Some(to_client),
            buffer: BytesMut::new(),
        };
        self.servers
            .send((request.clone(), server))
            .map_err(|_| io_error(io::ErrorKind::NotConnected, "test server gone"))?;

        Ok(MemoryStream {
            inbound: from_server,
            outbound: Some(to_server),
            open: true,
        })
    }
}

pub struct MemoryStream {
    inbound: mpsc::UnboundedReceiver<TransportResult<Bytes>>,
    outbound: Option<mpsc::UnboundedSender<Bytes>>,
    open: bool,
}

#[async_trait]
impl DuplexStream for MemoryStream {
    async fn read(&mut self) -> Option<TransportResult<Bytes>> {
        let item = self.inbound.recv().await;
        if !matches!(item, Some(Ok(_))) {
            self.open = false;
        }
        item
    }

    async fn write(&mut self, data: Bytes) -> TransportResult<()> {
        if let (true, Some(outbound)) = (self.open, &self.outbound) {
            let _ = outbound.send(data);
        }
        Ok(())
    }

    async fn end(&mut self) -> TransportResult<()> {
        self.open = false;
        self.outbound = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// The scripted server half of one connection.
pub struct ServerEnd {
    inbound: mpsc::UnboundedReceiver<Bytes>,
    outbound: Option<mpsc::UnboundedSender<TransportResult<Bytes>>>,
    buffer: BytesMut,
}

impl ServerEnd {
    /// Next packet from the client, or `None` once it has closed the stream.
    pub async fn next_packet(&mut self) -> Option<Packet> {
        loop {
            if let Some(packet) = Packet::decode(&mut self.buffer).unwrap() {
                return Some(packet);
            }
            let chunk = self.inbound.recv().await?;
            self.buffer.extend_from_slice(&chunk);
        }
    }

    pub async fn expect_packet(&mut self) -> Packet {
        within(self.next_packet())
            .await
            .expect("client closed the stream")
    }

    pub fn send(&self, packet: Packet) {
        let bytes = packet.to_bytes().unwrap();
        if let Some(outbound) = &self.outbound {
            let _ = outbound.send(Ok(bytes));
        }
    }

    /// Fail the socket with a transport error.
    pub fn fail(&mut self) {
        if let Some(outbound) = self.outbound.take() {
            let _ = outbound.send(Err(io_error(io::ErrorKind::ConnectionReset, "connection reset")));
        }
    }

    /// Close the socket cleanly.
    pub fn close(&mut self) {
        self.outbound = None;
    }

    /// Accept CONNECT and collect the subscriptions and the sync request.
    pub async fn accept_handshake(&mut self, topic_count: usize) -> Handshake {
        let Packet::Connect(connect) = self.expect_packet().await else {
            panic!("expected CONNECT first");
        };
        self.send(Packet::ConnAck(ConnAck::accepted()));

        let mut subscriptions = Vec::new();
        for _ in 0..topic_count {
            match self.expect_packet().await {
                Packet::Subscribe(subscribe) => subscriptions.push(subscribe),
                other => panic!("expected SUBSCRIBE, got {other:?}"),
            }
        }

        let Packet::Publish(sync) = self.expect_packet().await else {
            panic!("expected sync queue PUBLISH");
        };

        Handshake {
            identity: serde_json::from_str(connect.username.as_deref().unwrap()).unwrap(),
            client_id: connect.client_id,
            subscriptions,
            sync_body: serde_json::from_slice(&sync.payload).unwrap(),
            sync,
        }
    }
}

pub struct Handshake {
    pub identity: Value,
    pub client_id: String,
    pub subscriptions: Vec<Subscribe>,
    pub sync: Publish,
    pub sync_body: Value,
}

pub async fn next_server(
    servers: &mut mpsc::UnboundedReceiver<(OpenRequest, ServerEnd)>,
) -> (OpenRequest, ServerEnd) {
    within(servers.recv()).await.expect("connector dropped")
}

pub async fn wait_for_state(handle: &ListenerHandle, state: ConnectionState) {
    let mut states = handle.watch_state();
    within(states.wait_for(|current| *current == state))
        .await
        .expect("listener dropped");
}

/// Inner message reply record.
pub fn reply(message_id: &str, sender: &str, body: &str) -> Value {
    json!({"deltaMessageReply": {"message": {
        "messageMetadata": {
            "threadKey": {"otherUserFbId": PEER_ID},
            "messageId": message_id,
            "actorFbId": sender,
            "timestamp": "1700000000000"
        },
        "body": body,
        "participants": [OWNER_ID, PEER_ID]
    }}})
}

/// A delta-topic PUBLISH carrying `records` under `seq`.
pub fn delta_publish(seq: i64, records: Vec<Value>, packet_id: Option<u16>) -> Packet {
    let inner = json!({"deltas": records}).to_string();
    let bytes: Vec<Value> = inner.bytes().map(Value::from).collect();
    let payload = json!({
        "lastIssuedSeqId": seq,
        "deltas": [{"class": "ClientPayload", "payload": bytes}]
    })
    .to_string();

    let publish = match packet_id {
        Some(id) => Publish::at_least_once("/t_ms", payload.into_bytes(), id),
        None => Publish::new("/t_ms", payload.into_bytes()),
    };
    Packet::Publish(publish)
}
