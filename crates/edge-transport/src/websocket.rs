//! WebSocket implementation of the duplex stream.

use crate::proxy::connect_via_proxy;
use crate::{Connector, DuplexStream, OpenRequest, TransportError, TransportResult};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens [`WsDuplex`] streams, directly or through an HTTP proxy.
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    type Stream = WsDuplex;

    async fn open(&self, request: &OpenRequest) -> TransportResult<WsDuplex> {
        let client_request = build_request(request)?;
        info!(url = %request.url, proxied = request.proxy.is_some(), "Opening WebSocket");

        let ws_stream = match &request.proxy {
            Some(proxy) => {
                let uri = client_request.uri().clone();
                let host = uri
                    .host()
                    .ok_or_else(|| TransportError::InvalidRequest("URL has no host".to_string()))?;
                let port = uri.port_u16().unwrap_or(match uri.scheme_str() {
                    Some("ws") => 80,
                    _ => 443,
                });
                let tunnel = connect_via_proxy(proxy, host, port).await?;
                let (ws_stream, _response) =
                    tokio_tungstenite::client_async_tls_with_config(client_request, tunnel, None, None)
                        .await?;
                ws_stream
            }
            None => {
                let (ws_stream, _response) = tokio_tungstenite::connect_async(client_request).await?;
                ws_stream
            }
        };

        Ok(WsDuplex::from_stream(ws_stream))
    }
}

fn build_request(request: &OpenRequest) -> TransportResult<Request> {
    let mut client_request = request
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| TransportError::InvalidRequest(format!("invalid URL {}: {}", request.url, e)))?;

    for (name, value) in &request.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| TransportError::InvalidRequest(format!("invalid header name: {name}")))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| TransportError::InvalidRequest(format!("invalid header value for {name}")))?;
        client_request.headers_mut().insert(header_name, header_value);
    }

    Ok(client_request)
}

/// A live WebSocket seen as a duplex byte stream.
///
/// A background pump forwards inbound frames into a channel so that
/// [`DuplexStream::read`] stays cancel-safe inside `tokio::select!`.
pub struct WsDuplex {
    sink: SplitSink<WsStream, Message>,
    inbound: mpsc::UnboundedReceiver<TransportResult<Bytes>>,
    open: Arc<AtomicBool>,
    pump: JoinHandle<()>,
}

impl std::fmt::Debug for WsDuplex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsDuplex")
            .field("open", &self.open.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl WsDuplex {
    /// Wrap an already-connected WebSocket.
    pub fn from_stream(ws_stream: WsStream) -> Self {
        let (sink, stream) = ws_stream.split();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));

        let pump = tokio::spawn(pump_inbound(stream, inbound_tx, open.clone()));
        debug!("WebSocket open, stream ready");

        Self {
            sink,
            inbound,
            open,
            pump,
        }
    }
}

/// Forward inbound frames until the socket closes or fails.
///
/// Exits after the first terminal event, so termination is reported once.
async fn pump_inbound(
    mut stream: SplitStream<WsStream>,
    inbound_tx: mpsc::UnboundedSender<TransportResult<Bytes>>,
    open: Arc<AtomicBool>,
) {
    while let Some(frame) = stream.next().await {
        let chunk = match frame {
            Ok(Message::Binary(data)) => Bytes::from(data),
            Ok(Message::Text(text)) => Bytes::from(text.into_bytes()),
            Ok(Message::Close(frame)) => {
                debug!(frame = ?frame, "WebSocket closed by peer");
                break;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
            Err(e) => {
                warn!(error = %e, "WebSocket read error");
                open.store(false, Ordering::SeqCst);
                let _ = inbound_tx.send(Err(TransportError::WebSocket(e)));
                return;
            }
        };

        if inbound_tx.send(Ok(chunk)).is_err() {
            break;
        }
    }

    open.store(false, Ordering::SeqCst);
}

#[async_trait]
impl DuplexStream for WsDuplex {
    async fn read(&mut self) -> Option<TransportResult<Bytes>> {
        self.inbound.recv().await
    }

    async fn write(&mut self, data: Bytes) -> TransportResult<()> {
        if !self.is_open() {
            debug!(len = data.len(), "Dropping write on closed socket");
            return Ok(());
        }

        if let Err(e) = self.sink.send(Message::Binary(data.to_vec())).await {
            self.open.store(false, Ordering::SeqCst);
            return Err(TransportError::WebSocket(e));
        }
        Ok(())
    }

    async fn end(&mut self) -> TransportResult<()> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        debug!("Closing WebSocket");
        match self.sink.close().await {
            Ok(()) => Ok(()),
            Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed)
            | Err(tokio_tungstenite::tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::WebSocket(e)),
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

impl Drop for WsDuplex {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
