//! Outer batch envelope and the injectable inner payload decoder.

use crate::{DecodeError, DecodeResult};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Record class whose payload nests further deltas.
pub const CLIENT_PAYLOAD_CLASS: &str = "ClientPayload";

/// One batch as pushed on the delta topic.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeltaBatch {
    #[serde(rename = "lastIssuedSeqId", default)]
    last_issued_seq_id: Option<Value>,
    /// Null or non-array `deltas` reads as empty so the marker still counts.
    #[serde(default, deserialize_with = "lenient_records")]
    pub deltas: Vec<Value>,
}

fn lenient_records<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(records) => records,
        _ => Vec::new(),
    })
}

impl DeltaBatch {
    /// Parse the outer JSON envelope.
    pub fn parse(payload: &[u8]) -> DecodeResult<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Upper-bound sequence marker carried by this batch, if any.
    ///
    /// Accepts integers and numeric strings with trailing garbage ignored.
    /// Zero and unparseable markers count as absent.
    pub fn last_issued_seq_id(&self) -> Option<i64> {
        let parsed = match self.last_issued_seq_id.as_ref()? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => leading_integer(s),
            _ => None,
        };
        parsed.filter(|seq| *seq != 0)
    }
}

/// Parse the leading decimal integer of `s`, skipping leading whitespace.
pub(crate) fn leading_integer(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

/// Inner payload of a `ClientPayload` record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientPayload {
    #[serde(default)]
    pub deltas: Vec<Value>,
}

/// Unpacks the nested payload of a `ClientPayload` record.
pub trait ClientPayloadDecoder: Send + Sync {
    fn decode(&self, payload: &Value) -> DecodeResult<ClientPayload>;
}

/// Default inner decoder: the payload is an array of bytes holding UTF-8 JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonByteArrayDecoder;

impl ClientPayloadDecoder for JsonByteArrayDecoder {
    fn decode(&self, payload: &Value) -> DecodeResult<ClientPayload> {
        let items = payload
            .as_array()
            .ok_or_else(|| DecodeError::InvalidField {
                field: "payload",
                reason: "expected a byte array".to_string(),
            })?;

        let bytes = items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|b| u8::try_from(b).ok())
                    .ok_or_else(|| DecodeError::InvalidField {
                        field: "payload",
                        reason: format!("not a byte: {item}"),
                    })
            })
            .collect::<DecodeResult<Vec<u8>>>()?;

        let text = String::from_utf8(bytes)?;
        Ok(serde_json::from_str(&text)?)
    }
}
