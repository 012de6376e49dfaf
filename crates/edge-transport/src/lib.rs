//! Frame transport for the edge listener.
//!
//! Adapts a WebSocket connection into a duplex byte stream that the pub/sub
//! session can drive without knowing about WebSocket framing:
//!
//! - inbound binary and text frames surface as raw byte chunks, in order
//! - writes become single binary frames; vectored writes are concatenated first
//! - writes after the socket left the open state complete as no-ops
//! - close and error terminate the readable side exactly once
//!
//! The [`Connector`] and [`DuplexStream`] traits are the seam the session is
//! generic over, so tests can substitute an in-memory transport.

mod duplex;
mod error;
mod proxy;
mod websocket;

pub use duplex::{Connector, DuplexStream, OpenRequest};
pub use error::{TransportError, TransportResult};
pub use websocket::{WsConnector, WsDuplex};
