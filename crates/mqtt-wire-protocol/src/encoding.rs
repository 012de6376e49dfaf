//! Primitive field encodings shared by all packets.

use crate::{PacketError, PacketResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Largest value the four-byte remaining-length varint can carry.
pub(crate) const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Append a remaining-length varint.
pub(crate) fn write_remaining_length(buf: &mut BytesMut, mut len: usize) -> PacketResult<()> {
    if len > MAX_REMAINING_LENGTH {
        return Err(PacketError::PacketTooLarge {
            size: len,
            max: MAX_REMAINING_LENGTH,
        });
    }

    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if len == 0 {
            return Ok(());
        }
    }
}

/// Read a remaining-length varint from the start of `bytes`.
///
/// Returns `(value, bytes_used)`, or `None` when more input is needed.
pub(crate) fn read_remaining_length(bytes: &[u8]) -> PacketResult<Option<(usize, usize)>> {
    let mut multiplier = 1usize;
    let mut value = 0usize;

    for (index, byte) in bytes.iter().enumerate() {
        if index >= 4 {
            return Err(PacketError::MalformedRemainingLength);
        }
        value += usize::from(byte & 0x7F) * multiplier;
        if byte & 0x80 == 0 {
            return Ok(Some((value, index + 1)));
        }
        multiplier *= 128;
    }

    if bytes.len() >= 4 {
        Err(PacketError::MalformedRemainingLength)
    } else {
        Ok(None)
    }
}

/// Append a u16 length-prefixed UTF-8 string.
pub(crate) fn write_string(buf: &mut BytesMut, value: &str) -> PacketResult<()> {
    write_binary(buf, value.as_bytes())
}

/// Append u16 length-prefixed bytes.
pub(crate) fn write_binary(buf: &mut BytesMut, value: &[u8]) -> PacketResult<()> {
    let len = u16::try_from(value.len()).map_err(|_| PacketError::StringTooLong(value.len()))?;
    buf.put_u16(len);
    buf.put_slice(value);
    Ok(())
}

pub(crate) fn read_u8(buf: &mut Bytes, field: &'static str) -> PacketResult<u8> {
    if buf.remaining() < 1 {
        return Err(PacketError::Truncated(field));
    }
    Ok(buf.get_u8())
}

pub(crate) fn read_u16(buf: &mut Bytes, field: &'static str) -> PacketResult<u16> {
    if buf.remaining() < 2 {
        return Err(PacketError::Truncated(field));
    }
    Ok(buf.get_u16())
}

pub(crate) fn read_binary(buf: &mut Bytes, field: &'static str) -> PacketResult<Bytes> {
    let len = usize::from(read_u16(buf, field)?);
    if buf.remaining() < len {
        return Err(PacketError::Truncated(field));
    }
    Ok(buf.split_to(len))
}

pub(crate) fn read_string(buf: &mut Bytes, field: &'static str) -> PacketResult<String> {
    let raw = read_binary(buf, field)?;
    String::from_utf8(raw.to_vec()).map_err(|_| PacketError::InvalidUtf8(field))
}
