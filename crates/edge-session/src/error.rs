//! Error types for the listening session.

use edge_transport::TransportError;
use mqtt_wire_protocol::PacketError;
use serde::ser::{Serialize, SerializeMap, Serializer};
use thiserror::Error;

/// Reason carried by the terminal error when reconnection is disabled.
pub const SERVER_DOWN: &str = "Server Down";

/// The edge refused the session at connect time.
///
/// Never retried with the same credentials.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("connection refused by edge (code {code}): {reason}")]
    Rejected { code: u8, reason: String },
}

impl HandshakeError {
    pub fn code(&self) -> u8 {
        match self {
            HandshakeError::Rejected { code, .. } => *code,
        }
    }
}

/// Why one connection ended.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol error: {0}")]
    Packet(#[from] PacketError),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error("timed out: {0}")]
    Timeout(&'static str),

    #[error("connection closed by edge")]
    ClosedByPeer,

    #[error("unexpected {0} before CONNACK")]
    UnexpectedPacket(String),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// The single terminal error delivered to the consumer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListenError {
    #[error("listening stopped: {reason}")]
    StopListen { reason: String },

    #[error(transparent)]
    Handshake(HandshakeError),
}

impl ListenError {
    pub fn server_down() -> Self {
        ListenError::StopListen {
            reason: SERVER_DOWN.to_string(),
        }
    }

    /// Wire tag used in the serialized form.
    pub fn kind(&self) -> &'static str {
        match self {
            ListenError::StopListen { .. } => "stop_listen",
            ListenError::Handshake(_) => "handshake_rejected",
        }
    }
}

impl Serialize for ListenError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("type", self.kind())?;
        match self {
            ListenError::StopListen { reason } => {
                map.serialize_entry("error", reason)?;
            }
            ListenError::Handshake(e) => {
                map.serialize_entry("error", &e.to_string())?;
                map.serialize_entry("code", &e.code())?;
            }
        }
        map.end()
    }
}
