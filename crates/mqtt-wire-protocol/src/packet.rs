//! Packet types and their encode/decode routines.

use crate::encoding::{
    read_binary, read_remaining_length, read_string, read_u16, read_u8, write_binary,
    write_remaining_length, write_string, MAX_REMAINING_LENGTH,
};
use crate::{PacketError, PacketResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Maximum remaining length of a single packet.
pub const MAX_PACKET_SIZE: usize = MAX_REMAINING_LENGTH;

const CONNECT_FLAG_USERNAME: u8 = 0x80;
const CONNECT_FLAG_PASSWORD: u8 = 0x40;
const CONNECT_FLAG_CLEAN_SESSION: u8 = 0x02;

const PUBLISH_FLAG_DUP: u8 = 0x08;
const PUBLISH_FLAG_RETAIN: u8 = 0x01;

/// Fixed-header packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    Subscribe = 8,
    SubAck = 9,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
}

impl PacketType {
    fn from_header(byte: u8) -> PacketResult<Self> {
        match byte >> 4 {
            1 => Ok(Self::Connect),
            2 => Ok(Self::ConnAck),
            3 => Ok(Self::Publish),
            4 => Ok(Self::PubAck),
            8 => Ok(Self::Subscribe),
            9 => Ok(Self::SubAck),
            12 => Ok(Self::PingReq),
            13 => Ok(Self::PingResp),
            14 => Ok(Self::Disconnect),
            other => Err(PacketError::UnsupportedPacketType(other)),
        }
    }
}

/// Delivery guarantee requested for a publish or subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum QoS {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QoS {
    /// Parse a QoS level from its two-bit wire value.
    pub fn from_u8(value: u8) -> PacketResult<Self> {
        match value {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            other => Err(PacketError::InvalidQoS(other)),
        }
    }
}

/// CONNECT packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    /// Protocol name, `MQIsdp` for level 3.
    pub protocol_name: String,
    /// Protocol level byte.
    pub protocol_level: u8,
    pub client_id: String,
    pub clean_session: bool,
    /// Keepalive interval in seconds.
    pub keep_alive: u16,
    /// The edge carries the serialized session identity here.
    pub username: Option<String>,
    pub password: Option<Bytes>,
}

/// CONNACK packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAck {
    pub session_present: bool,
    pub return_code: u8,
}

impl ConnAck {
    /// An accepted connection.
    pub fn accepted() -> Self {
        Self {
            session_present: false,
            return_code: 0,
        }
    }

    /// Whether the server accepted the connection.
    pub fn is_accepted(&self) -> bool {
        self.return_code == 0
    }

    /// Human-readable meaning of the return code.
    pub fn reason(&self) -> &'static str {
        match self.return_code {
            0 => "connection accepted",
            1 => "unacceptable protocol version",
            2 => "identifier rejected",
            3 => "server unavailable",
            4 => "bad user name or password",
            5 => "not authorized",
            _ => "unknown return code",
        }
    }
}

/// PUBLISH packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    /// Present iff `qos` is above [`QoS::AtMostOnce`].
    pub packet_id: Option<u16>,
    pub retain: bool,
    pub dup: bool,
}

impl Publish {
    /// A QoS 0 publish.
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtMostOnce,
            packet_id: None,
            retain: false,
            dup: false,
        }
    }

    /// A QoS 1 publish with the given packet identifier.
    pub fn at_least_once(topic: impl Into<String>, payload: impl Into<Bytes>, packet_id: u16) -> Self {
        Self {
            qos: QoS::AtLeastOnce,
            packet_id: Some(packet_id),
            ..Self::new(topic, payload)
        }
    }
}

/// SUBSCRIBE packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    pub packet_id: u16,
    pub filters: Vec<(String, QoS)>,
}

/// SUBACK packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAck {
    pub packet_id: u16,
    pub return_codes: Vec<u8>,
}

/// A complete MQTT packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(Connect),
    ConnAck(ConnAck),
    Publish(Publish),
    PubAck { packet_id: u16 },
    Subscribe(Subscribe),
    SubAck(SubAck),
    PingReq,
    PingResp,
    Disconnect,
}

impl Packet {
    /// The fixed-header type of this packet.
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::ConnAck(_) => PacketType::ConnAck,
            Packet::Publish(_) => PacketType::Publish,
            Packet::PubAck { .. } => PacketType::PubAck,
            Packet::Subscribe(_) => PacketType::Subscribe,
            Packet::SubAck(_) => PacketType::SubAck,
            Packet::PingReq => PacketType::PingReq,
            Packet::PingResp => PacketType::PingResp,
            Packet::Disconnect => PacketType::Disconnect,
        }
    }

    /// Encode this packet into a standalone buffer.
    pub fn to_bytes(&self) -> PacketResult<Bytes> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Append the encoded packet to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) -> PacketResult<()> {
        let mut body = BytesMut::new();
        let mut flags = 0u8;

        match self {
            Packet::Connect(connect) => {
                write_string(&mut body, &connect.protocol_name)?;
                body.put_u8(connect.protocol_level);

                let mut connect_flags = 0u8;
                if connect.clean_session {
                    connect_flags |= CONNECT_FLAG_CLEAN_SESSION;
                }
                if connect.username.is_some() {
                    connect_flags |= CONNECT_FLAG_USERNAME;
                }
                if connect.password.is_some() {
                    connect_flags |= CONNECT_FLAG_PASSWORD;
                }
                body.put_u8(connect_flags);
                body.put_u16(connect.keep_alive);

                write_string(&mut body, &connect.client_id)?;
                if let Some(username) = &connect.username {
                    write_string(&mut body, username)?;
                }
                if let Some(password) = &connect.password {
                    write_binary(&mut body, password)?;
                }
            }
            Packet::ConnAck(ack) => {
                body.put_u8(u8::from(ack.session_present));
                body.put_u8(ack.return_code);
            }
            Packet::Publish(publish) => {
                flags |= (publish.qos as u8) << 1;
                if publish.dup {
                    flags |= PUBLISH_FLAG_DUP;
                }
                if publish.retain {
                    flags |= PUBLISH_FLAG_RETAIN;
                }

                write_string(&mut body, &publish.topic)?;
                if publish.qos != QoS::AtMostOnce {
                    body.put_u16(publish.packet_id.unwrap_or_default());
                }
                body.put_slice(&publish.payload);
            }
            Packet::PubAck { packet_id } => {
                body.put_u16(*packet_id);
            }
            Packet::Subscribe(subscribe) => {
                flags = 0x02;
                body.put_u16(subscribe.packet_id);
                for (filter, qos) in &subscribe.filters {
                    write_string(&mut body, filter)?;
                    body.put_u8(*qos as u8);
                }
            }
            Packet::SubAck(ack) => {
                body.put_u16(ack.packet_id);
                body.put_slice(&ack.return_codes);
            }
            Packet::PingReq | Packet::PingResp | Packet::Disconnect => {}
        }

        buf.put_u8(((self.packet_type() as u8) << 4) | flags);
        write_remaining_length(buf, body.len())?;
        buf.put_slice(&body);
        Ok(())
    }

    /// Try to decode one packet from the front of `buf`.
    ///
    /// Returns `Ok(None)` and leaves `buf` untouched when the buffer does not
    /// yet hold a complete packet. On success the packet's bytes are consumed.
    pub fn decode(buf: &mut BytesMut) -> PacketResult<Option<Packet>> {
        if buf.is_empty() {
            return Ok(None);
        }

        let Some((remaining, length_bytes)) = read_remaining_length(&buf[1..])? else {
            return Ok(None);
        };
        let header_len = 1 + length_bytes;
        if buf.len() < header_len + remaining {
            return Ok(None);
        }

        let header = buf[0];
        buf.advance(header_len);
        let body = buf.split_to(remaining).freeze();

        Self::decode_body(header, body).map(Some)
    }

    fn decode_body(header: u8, mut body: Bytes) -> PacketResult<Packet> {
        let packet_type = PacketType::from_header(header)?;
        let flags = header & 0x0F;

        let packet = match packet_type {
            PacketType::Connect => {
                let protocol_name = read_string(&mut body, "protocol name")?;
                let protocol_level = read_u8(&mut body, "protocol level")?;
                let connect_flags = read_u8(&mut body, "connect flags")?;
                let keep_alive = read_u16(&mut body, "keep alive")?;
                let client_id = read_string(&mut body, "client id")?;
                let username = if connect_flags & CONNECT_FLAG_USERNAME != 0 {
                    Some(read_string(&mut body, "username")?)
                } else {
                    None
                };
                let password = if connect_flags & CONNECT_FLAG_PASSWORD != 0 {
                    Some(read_binary(&mut body, "password")?)
                } else {
                    None
                };
                Packet::Connect(Connect {
                    protocol_name,
                    protocol_level,
                    client_id,
                    clean_session: connect_flags & CONNECT_FLAG_CLEAN_SESSION != 0,
                    keep_alive,
                    username,
                    password,
                })
            }
            PacketType::ConnAck => {
                let ack_flags = read_u8(&mut body, "connack flags")?;
                let return_code = read_u8(&mut body, "connack return code")?;
                Packet::ConnAck(ConnAck {
                    session_present: ack_flags & 0x01 != 0,
                    return_code,
                })
            }
            PacketType::Publish => {
                let qos = QoS::from_u8((flags >> 1) & 0x03)?;
                let topic = read_string(&mut body, "topic")?;
                let packet_id = if qos == QoS::AtMostOnce {
                    None
                } else {
                    Some(read_u16(&mut body, "packet id")?)
                };
                Packet::Publish(Publish {
                    topic,
                    payload: body,
                    qos,
                    packet_id,
                    retain: flags & PUBLISH_FLAG_RETAIN != 0,
                    dup: flags & PUBLISH_FLAG_DUP != 0,
                })
            }
            PacketType::PubAck => Packet::PubAck {
                packet_id: read_u16(&mut body, "packet id")?,
            },
            PacketType::Subscribe => {
                let packet_id = read_u16(&mut body, "packet id")?;
                let mut filters = Vec::new();
                while body.has_remaining() {
                    let filter = read_string(&mut body, "topic filter")?;
                    let qos = QoS::from_u8(read_u8(&mut body, "requested qos")? & 0x03)?;
                    filters.push((filter, qos));
                }
                Packet::Subscribe(Subscribe { packet_id, filters })
            }
            PacketType::SubAck => {
                let packet_id = read_u16(&mut body, "packet id")?;
                Packet::SubAck(SubAck {
                    packet_id,
                    return_codes: body.to_vec(),
                })
            }
            PacketType::PingReq => Packet::PingReq,
            PacketType::PingResp => Packet::PingResp,
            PacketType::Disconnect => Packet::Disconnect,
        };

        Ok(packet)
    }
}
