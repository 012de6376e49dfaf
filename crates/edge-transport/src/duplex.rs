//! Duplex stream abstraction.

use crate::TransportResult;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

/// Everything needed to open one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    /// `ws://` or `wss://` endpoint.
    pub url: String,
    /// Extra handshake headers, applied in order.
    pub headers: Vec<(String, String)>,
    /// HTTP proxy to tunnel through.
    pub proxy: Option<String>,
}

impl OpenRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            proxy: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A connected, bidirectional byte stream.
#[async_trait]
pub trait DuplexStream: Send {
    /// Next inbound chunk.
    ///
    /// Yields `Some(Err(_))` at most once when the socket fails, then `None`
    /// forever. A clean close yields `None` directly. Cancel-safe.
    async fn read(&mut self) -> Option<TransportResult<Bytes>>;

    /// Send one outbound frame. Completes as a no-op when the socket is not open.
    async fn write(&mut self, data: Bytes) -> TransportResult<()>;

    /// Send several chunks as a single frame.
    async fn write_vectored(&mut self, chunks: Vec<Bytes>) -> TransportResult<()> {
        let total = chunks.iter().map(Bytes::len).sum();
        let mut frame = BytesMut::with_capacity(total);
        for chunk in &chunks {
            frame.extend_from_slice(chunk);
        }
        self.write(frame.freeze()).await
    }

    /// Close the socket. Safe to call more than once.
    async fn end(&mut self) -> TransportResult<()>;

    /// Whether the socket is still in the open state.
    fn is_open(&self) -> bool;
}

/// Opens duplex streams.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Stream: DuplexStream + 'static;

    /// Suspend until the socket is ready or has failed.
    async fn open(&self, request: &OpenRequest) -> TransportResult<Self::Stream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingStream {
        frames: Vec<Bytes>,
    }

    #[async_trait]
    impl DuplexStream for RecordingStream {
        async fn read(&mut self) -> Option<TransportResult<Bytes>> {
            None
        }

        async fn write(&mut self, data: Bytes) -> TransportResult<()> {
            self.frames.push(data);
            Ok(())
        }

        async fn end(&mut self) -> TransportResult<()> {
            Ok(())
        }

        fn is_open(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_write_vectored_sends_one_frame() {
        let mut stream = RecordingStream::default();
        stream
            .write_vectored(vec![
                Bytes::from_static(b"\x30"),
                Bytes::from_static(b"\x03"),
                Bytes::from_static(b"abc"),
            ])
            .await
            .unwrap();

        assert_eq!(stream.frames, vec![Bytes::from_static(b"\x30\x03abc")]);
    }

    #[test]
    fn test_open_request_builder() {
        let request = OpenRequest::new("wss://edge.example/chat")
            .header("Origin", "https://www.example.com")
            .header("Cookie", "a=b");
        assert_eq!(request.headers.len(), 2);
        assert_eq!(request.headers[1], ("Cookie".to_string(), "a=b".to_string()));
        assert!(request.proxy.is_none());
    }
}
