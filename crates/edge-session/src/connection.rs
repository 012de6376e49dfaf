//! One MQTT session over one duplex stream.

use crate::identity::{endpoint_url, new_session_nonce};
use crate::{
    EventSink, HandshakeError, ListenerSettings, ResumeCursor, SessionError, SessionIdentity,
    SessionResult,
};
use bytes::{Bytes, BytesMut};
use delta_decoder::{DeltaBatch, DeltaDecoder};
use edge_transport::{Connector, DuplexStream, OpenRequest};
use mqtt_wire_protocol::{Connect, Packet, Publish, QoS, Subscribe};
use serde_json::json;
use tokio::sync::watch;
use tokio::time::{interval_at, timeout, Duration, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};
use url::Url;

/// How a connection that did not fail came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEnd {
    /// The listener was closed by its owner.
    Closed,
}

/// A handshaken session on a live stream.
pub struct Connection<S: DuplexStream> {
    stream: S,
    buffer: BytesMut,
    next_packet_id: u16,
    keepalive: Duration,
}

impl<S: DuplexStream> Connection<S> {
    /// Open the stream, perform the handshake, subscribe to every topic and
    /// request the sync queue at the cursor's current position.
    pub async fn establish<C>(
        connector: &C,
        settings: &ListenerSettings,
        cursor: &ResumeCursor,
    ) -> SessionResult<Self>
    where
        C: Connector<Stream = S>,
    {
        let nonce = new_session_nonce();
        let client_instance_id = uuid::Uuid::new_v4().to_string();
        let identity = SessionIdentity::new(
            &settings.user_id,
            nonce,
            &client_instance_id,
            settings.listen.online,
            settings.listen.foreground,
            &settings.protocol,
        );
        let url = endpoint_url(
            &settings.connection,
            &settings.protocol,
            nonce,
            &client_instance_id,
        );
        let request = open_request(settings, url);
        info!(url = %request.url, "Connecting to edge");

        let deadline = Duration::from_secs(settings.connection.connect_timeout_secs);
        let mut connection = timeout(deadline, async {
            let stream = connector.open(&request).await?;
            let mut connection =
                Connection::new(stream, Duration::from_secs(u64::from(settings.connection.keepalive_secs)));
            connection.handshake(&identity, settings).await?;
            Ok::<_, SessionError>(connection)
        })
        .await
        .map_err(|_| SessionError::Timeout("handshake"))??;

        connection.subscribe_all(&settings.protocol.topics).await?;
        connection.request_sync(settings, cursor.get()).await?;
        Ok(connection)
    }

    pub fn new(stream: S, keepalive: Duration) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(8 * 1024),
            next_packet_id: 1,
            keepalive,
        }
    }

    async fn handshake(
        &mut self,
        identity: &SessionIdentity,
        settings: &ListenerSettings,
    ) -> SessionResult<()> {
        let connect = Connect {
            protocol_name: settings.protocol.protocol_name.clone(),
            protocol_level: settings.protocol.protocol_level,
            client_id: settings.protocol.client_id.clone(),
            clean_session: settings.connection.clean_session,
            keep_alive: settings.connection.keepalive_secs,
            username: Some(identity.to_username()?),
            password: None,
        };
        self.send(Packet::Connect(connect)).await?;
        debug!(session = identity.s, "Sent CONNECT");

        match self.next_packet().await? {
            Some(Packet::ConnAck(ack)) if ack.is_accepted() => {
                info!("Edge accepted session");
                Ok(())
            }
            Some(Packet::ConnAck(ack)) => Err(HandshakeError::Rejected {
                code: ack.return_code,
                reason: ack.reason().to_string(),
            }
            .into()),
            Some(other) => Err(SessionError::UnexpectedPacket(format!(
                "{:?}",
                other.packet_type()
            ))),
            None => Err(SessionError::ClosedByPeer),
        }
    }

    async fn subscribe_all(&mut self, topics: &[String]) -> SessionResult<()> {
        for topic in topics {
            let packet_id = self.packet_id();
            self.send(Packet::Subscribe(Subscribe {
                packet_id,
                filters: vec![(topic.clone(), QoS::AtMostOnce)],
            }))
            .await?;
        }
        debug!(count = topics.len(), "Subscribed to topics");
        Ok(())
    }

    async fn request_sync(
        &mut self,
        settings: &ListenerSettings,
        cursor: Option<i64>,
    ) -> SessionResult<()> {
        let protocol = &settings.protocol;
        let queue = json!({
            "sync_api_version": protocol.sync_api_version,
            "max_deltas_able_to_process": protocol.max_deltas_able_to_process,
            "delta_batch_size": protocol.delta_batch_size,
            "encoding": protocol.encoding,
            "entity_fbid": settings.user_id,
            "initial_titan_sequence_id": cursor,
            "device_params": null,
        });
        let packet_id = self.packet_id();
        let publish = Publish::at_least_once(
            protocol.sync_queue_topic.clone(),
            Bytes::from(serde_json::to_vec(&queue)?),
            packet_id,
        );
        self.send(Packet::Publish(publish)).await?;
        info!(cursor = ?cursor, "Requested sync queue");
        Ok(())
    }

    /// Process inbound traffic until the stream fails or `shutdown` flips.
    ///
    /// The stream is closed before this returns.
    pub async fn run(
        &mut self,
        decoder: &DeltaDecoder,
        cursor: &ResumeCursor,
        sink: &mut EventSink,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionResult<ConnectionEnd> {
        let result = self.pump(decoder, cursor, sink, shutdown).await;
        match &result {
            Ok(ConnectionEnd::Closed) => {
                let _ = self.send(Packet::Disconnect).await;
                info!("Session closed");
            }
            Err(e) => warn!(error = %e, "Session ended"),
        }
        if let Err(e) = self.stream.end().await {
            debug!(error = %e, "Error while closing stream");
        }
        result
    }

    async fn pump(
        &mut self,
        decoder: &DeltaDecoder,
        cursor: &ResumeCursor,
        sink: &mut EventSink,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionResult<ConnectionEnd> {
        // A zero keepalive turns pings and the idle check off.
        let mut ping = (!self.keepalive.is_zero()).then(|| {
            let mut ping = interval_at(Instant::now() + self.keepalive, self.keepalive);
            ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ping
        });
        let idle_limit = self.keepalive * 3 / 2;
        let mut last_inbound = Instant::now();

        loop {
            if *shutdown.borrow() {
                return Ok(ConnectionEnd::Closed);
            }

            tokio::select! {
                Ok(()) = shutdown.changed() => {}
                _ = next_ping(&mut ping) => {
                    if last_inbound.elapsed() > idle_limit {
                        return Err(SessionError::Timeout("keepalive"));
                    }
                    self.send(Packet::PingReq).await?;
                    trace!("Sent PINGREQ");
                }
                packet = self.next_packet() => {
                    let Some(packet) = packet? else {
                        return Err(SessionError::ClosedByPeer);
                    };
                    last_inbound = Instant::now();
                    self.handle_packet(packet, decoder, cursor, sink).await?;
                }
            }
        }
    }

    async fn handle_packet(
        &mut self,
        packet: Packet,
        decoder: &DeltaDecoder,
        cursor: &ResumeCursor,
        sink: &mut EventSink,
    ) -> SessionResult<()> {
        match packet {
            Packet::Publish(publish) => {
                if let (QoS::AtLeastOnce, Some(packet_id)) = (publish.qos, publish.packet_id) {
                    self.send(Packet::PubAck { packet_id }).await?;
                }
                if publish.topic == decoder.delta_topic() {
                    route_delta(&publish.payload, decoder, cursor, sink);
                } else {
                    trace!(topic = %publish.topic, "Ignoring unrouted topic");
                }
            }
            Packet::PingResp => trace!("Received PINGRESP"),
            Packet::SubAck(ack) => debug!(packet_id = ack.packet_id, "Subscription acknowledged"),
            Packet::PubAck { packet_id } => debug!(packet_id, "Publish acknowledged"),
            other => debug!(packet = ?other.packet_type(), "Ignoring packet"),
        }
        Ok(())
    }

    /// Next complete packet, or `None` once the stream has ended. Cancel-safe.
    async fn next_packet(&mut self) -> SessionResult<Option<Packet>> {
        loop {
            if let Some(packet) = Packet::decode(&mut self.buffer)? {
                return Ok(Some(packet));
            }
            match self.stream.read().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(None),
            }
        }
    }

    async fn send(&mut self, packet: Packet) -> SessionResult<()> {
        let bytes = packet.to_bytes()?;
        self.stream.write(bytes).await?;
        Ok(())
    }

    fn packet_id(&mut self) -> u16 {
        let id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.checked_add(1).unwrap_or(1);
        id
    }
}

async fn next_ping(ping: &mut Option<Interval>) {
    match ping {
        Some(ping) => {
            ping.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn open_request(settings: &ListenerSettings, url: String) -> OpenRequest {
    let host = Url::parse(&url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string));

    let mut request = OpenRequest::new(url)
        .header("Cookie", settings.cookie_header.clone())
        .header("Origin", settings.connection.origin.clone())
        .header("User-Agent", settings.current_user_agent())
        .header("Referer", settings.referer());
    if let Some(host) = host {
        request = request.header("Host", host);
    }
    request.proxy = settings.connection.proxy.clone();
    request
}

/// Advance the cursor past a delta batch, then dispatch its events.
fn route_delta(payload: &[u8], decoder: &DeltaDecoder, cursor: &ResumeCursor, sink: &mut EventSink) {
    let batch = match DeltaBatch::parse(payload) {
        Ok(batch) => batch,
        Err(e) => {
            debug!(error = %e, "Dropping unparseable delta batch");
            return;
        }
    };

    if let Some(seq) = batch.last_issued_seq_id() {
        if cursor.advance(seq) {
            debug!(cursor = seq, "Advanced resume cursor");
        }
    }

    for event in decoder.decode_batch(&batch) {
        sink.deliver_event(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listener_config_and_utils::{AppState, Config, CookieEntry};
    use serde_json::Value;

    fn settings() -> ListenerSettings {
        let appstate = AppState::from_cookies(vec![CookieEntry {
            key: "c_user".to_string(),
            value: "1000".to_string(),
            domain: Some(".facebook.com".to_string()),
            path: None,
        }])
        .unwrap();
        ListenerSettings::from_config(&Config::default(), &appstate, "agent/1.0")
    }

    fn batch(seq: Value, body: &str) -> Vec<u8> {
        let inner = json!({"deltas": [{"deltaMessageReply": {"message": {
            "messageMetadata": {
                "threadKey": {"otherUserFbId": 2000},
                "messageId": "mid.1",
                "actorFbId": 2000,
                "timestamp": 1
            },
            "body": body
        }}}]})
        .to_string();
        let bytes: Vec<Value> = inner.bytes().map(Value::from).collect();
        json!({"lastIssuedSeqId": seq, "deltas": [{"class": "ClientPayload", "payload": bytes}]})
            .to_string()
            .into_bytes()
    }

    #[test]
    fn test_open_request_headers() {
        let mut settings = settings();
        settings.connection.proxy = Some("http://proxy.local:3128".to_string());
        let request = open_request(&settings, "wss://edge-chat.facebook.com/chat?sid=1&cid=x".to_string());

        let header = |name: &str| {
            request
                .headers
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        };
        assert_eq!(header("Cookie"), Some("c_user=1000"));
        assert_eq!(header("Origin"), Some("https://www.facebook.com"));
        assert_eq!(header("User-Agent"), Some("agent/1.0"));
        assert_eq!(header("Referer"), Some("https://www.facebook.com/"));
        assert_eq!(header("Host"), Some("edge-chat.facebook.com"));
        assert_eq!(request.proxy.as_deref(), Some("http://proxy.local:3128"));
    }

    #[tokio::test]
    async fn test_route_delta_advances_cursor_before_dispatch() {
        let decoder = DeltaDecoder::new("/t_ms", "1000", false);
        let cursor = ResumeCursor::new(Some(10));
        let observed = cursor.clone();
        let (mut sink, mut messages, _errors) = EventSink::channels();

        route_delta(&batch(json!("25"), "first"), &decoder, &cursor, &mut sink);
        let event = messages.recv().await.unwrap();
        assert_eq!(event.body, "first");
        assert_eq!(observed.get(), Some(25));

        route_delta(&batch(json!(20), "stale marker"), &decoder, &cursor, &mut sink);
        assert_eq!(messages.recv().await.unwrap().body, "stale marker");
        assert_eq!(observed.get(), Some(25));
    }

    #[tokio::test]
    async fn test_route_delta_keeps_cursor_when_records_fail() {
        let decoder = DeltaDecoder::new("/t_ms", "1000", false);
        let cursor = ResumeCursor::new(None);
        let (mut sink, mut messages, _errors) = EventSink::channels();

        let payload = json!({
            "lastIssuedSeqId": 99,
            "deltas": [{"class": "ClientPayload", "payload": "not bytes"}]
        })
        .to_string();
        route_delta(payload.as_bytes(), &decoder, &cursor, &mut sink);

        assert_eq!(cursor.get(), Some(99));
        assert!(messages.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_route_delta_advances_cursor_for_null_deltas() {
        let decoder = DeltaDecoder::new("/t_ms", "1000", false);
        let cursor = ResumeCursor::new(Some(10));
        let (mut sink, mut messages, _errors) = EventSink::channels();

        route_delta(br#"{"lastIssuedSeqId": 50, "deltas": null}"#, &decoder, &cursor, &mut sink);

        assert_eq!(cursor.get(), Some(50));
        assert!(messages.try_recv().is_err());
    }

    #[test]
    fn test_packet_ids_wrap_past_zero() {
        struct Idle;
        #[async_trait::async_trait]
        impl DuplexStream for Idle {
            async fn read(&mut self) -> Option<edge_transport::TransportResult<Bytes>> {
                None
            }
            async fn write(&mut self, _data: Bytes) -> edge_transport::TransportResult<()> {
                Ok(())
            }
            async fn end(&mut self) -> edge_transport::TransportResult<()> {
                Ok(())
            }
            fn is_open(&self) -> bool {
                false
            }
        }

        let mut connection = Connection::new(Idle, Duration::from_secs(60));
        connection.next_packet_id = u16::MAX;
        assert_eq!(connection.packet_id(), u16::MAX);
        assert_eq!(connection.packet_id(), 1);
    }
}
