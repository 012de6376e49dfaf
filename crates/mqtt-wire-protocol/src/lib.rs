//! MQTT 3.1 wire protocol for the edge listener.
//!
//! The chat edge speaks a small subset of MQTT 3.1 (`MQIsdp`, level 3)
//! tunnelled through WebSocket binary frames. This crate holds the packet
//! types and their byte-level encoding. It performs no I/O and has no async
//! runtime dependency: callers feed inbound bytes into a [`BytesMut`] buffer
//! and pull complete packets out with [`Packet::decode`].
//!
//! Supported packets:
//!
//! | Packet | Direction |
//! |--------|-----------|
//! | CONNECT / CONNACK | client → server / server → client |
//! | PUBLISH / PUBACK | both |
//! | SUBSCRIBE / SUBACK | client → server / server → client |
//! | PINGREQ / PINGRESP | client → server / server → client |
//! | DISCONNECT | client → server |
//!
//! [`BytesMut`]: bytes::BytesMut

mod encoding;
mod error;
mod packet;

pub use error::{PacketError, PacketResult};
pub use packet::{
    ConnAck, Connect, Packet, PacketType, Publish, QoS, SubAck, Subscribe, MAX_PACKET_SIZE,
};
