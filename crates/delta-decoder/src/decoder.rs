//! Record dispatch and message reply decoding.

use crate::attachment::resolve;
use crate::envelope::{leading_integer, CLIENT_PAYLOAD_CLASS};
use crate::{
    AttachmentNormalizer, ClientPayloadDecoder, DecodeError, DecodeResult, DefaultAttachmentNormalizer,
    DeltaBatch, EventKind, JsonByteArrayDecoder, MessageEvent,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Turns delta-topic payloads into message events.
///
/// Stateless apart from its fixed settings, so one instance is shared by
/// every connection of a listener.
#[derive(Clone)]
pub struct DeltaDecoder {
    delta_topic: String,
    owner_id: String,
    self_listen: bool,
    payload_decoder: Arc<dyn ClientPayloadDecoder>,
    normalizer: Arc<dyn AttachmentNormalizer>,
}

impl std::fmt::Debug for DeltaDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaDecoder")
            .field("delta_topic", &self.delta_topic)
            .field("owner_id", &self.owner_id)
            .field("self_listen", &self.self_listen)
            .finish_non_exhaustive()
    }
}

impl DeltaDecoder {
    pub fn new(delta_topic: impl Into<String>, owner_id: impl Into<String>, self_listen: bool) -> Self {
        Self {
            delta_topic: delta_topic.into(),
            owner_id: owner_id.into(),
            self_listen,
            payload_decoder: Arc::new(JsonByteArrayDecoder),
            normalizer: Arc::new(DefaultAttachmentNormalizer),
        }
    }

    /// Replace the inner payload decoder.
    pub fn with_payload_decoder(mut self, decoder: Arc<dyn ClientPayloadDecoder>) -> Self {
        self.payload_decoder = decoder;
        self
    }

    /// Replace the attachment normalizer.
    pub fn with_attachment_normalizer(mut self, normalizer: Arc<dyn AttachmentNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn delta_topic(&self) -> &str {
        &self.delta_topic
    }

    /// Decode one inbound topic message.
    ///
    /// Returns nothing for other topics and for payloads that fail top-level
    /// parsing.
    pub fn decode(&self, topic: &str, payload: &[u8]) -> Vec<MessageEvent> {
        if topic != self.delta_topic {
            return Vec::new();
        }
        match DeltaBatch::parse(payload) {
            Ok(batch) => self.decode_batch(&batch),
            Err(e) => {
                debug!(topic = %topic, error = %e, "Dropping unparseable delta batch");
                Vec::new()
            }
        }
    }

    /// Decode every record of an already-parsed batch.
    pub fn decode_batch(&self, batch: &DeltaBatch) -> Vec<MessageEvent> {
        let mut events = Vec::new();

        for delta in &batch.deltas {
            let class = delta.get("class").and_then(Value::as_str).unwrap_or_default();
            if class != CLIENT_PAYLOAD_CLASS {
                trace!(class = %class, "Ignoring delta class");
                continue;
            }

            let Some(payload) = delta.get("payload") else {
                debug!("ClientPayload delta without payload");
                continue;
            };
            let inner = match self.payload_decoder.decode(payload) {
                Ok(inner) => inner,
                Err(e) => {
                    warn!(error = %e, "Failed to decode client payload");
                    continue;
                }
            };

            for record in &inner.deltas {
                let Some(reply) = record.get("deltaMessageReply") else {
                    trace!("Ignoring unsupported inner delta");
                    continue;
                };
                match self.decode_message_reply(reply) {
                    Ok(event) if self.is_suppressed(&event) => {
                        trace!(message_id = %event.message_id, "Suppressing own message");
                    }
                    Ok(event) => events.push(event),
                    Err(e) => {
                        warn!(error = %e, "Skipping malformed message reply");
                    }
                }
            }
        }

        events
    }

    fn is_suppressed(&self, event: &MessageEvent) -> bool {
        !self.self_listen && event.sender_id == self.owner_id
    }

    fn decode_message_reply(&self, reply: &Value) -> DecodeResult<MessageEvent> {
        let empty = Map::new();
        let message = reply
            .get("message")
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        let metadata = message
            .get("messageMetadata")
            .and_then(Value::as_object)
            .ok_or(DecodeError::MissingField("messageMetadata"))?;
        let thread_key = metadata
            .get("threadKey")
            .and_then(Value::as_object)
            .ok_or(DecodeError::MissingField("threadKey"))?;

        let group_id = id_string(thread_key.get("threadFbId"));
        let is_group = group_id.is_some();
        let thread_id = group_id
            .or_else(|| id_string(thread_key.get("otherUserFbId")))
            .ok_or(DecodeError::MissingField("threadKey.threadFbId"))?;

        let message_id = id_string(metadata.get("messageId")).unwrap_or_default();
        let sender_id =
            id_string(metadata.get("actorFbId")).ok_or(DecodeError::MissingField("actorFbId"))?;
        let timestamp = parse_timestamp(metadata.get("timestamp")).unwrap_or_else(|| {
            debug!(message_id = %message_id, "Message reply without a usable timestamp");
            0
        });

        let body = message
            .get("body")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let args = body.split_whitespace().map(str::to_string).collect();
        let mentions = extract_mentions(message, &body);

        let participant_ids = message
            .get("participants")
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(|id| id_string(Some(id))).collect())
            .unwrap_or_default();

        let attachments = message
            .get("attachments")
            .and_then(Value::as_array)
            .map(|raw| raw.iter().map(|att| resolve(att, self.normalizer.as_ref())).collect())
            .unwrap_or_default();

        Ok(MessageEvent {
            kind: EventKind::MessageReply,
            thread_id,
            message_id,
            sender_id,
            body,
            args,
            mentions,
            timestamp,
            participant_ids,
            attachments,
            is_group,
        })
    }
}

/// Identifier as a string; absent, null, empty and zero ids count as missing.
fn id_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_timestamp(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => leading_integer(s),
        _ => None,
    }
}

/// Decode the `data.prng` range list into mention text keyed by user id.
///
/// Any failure yields an empty map.
fn extract_mentions(message: &Map<String, Value>, body: &str) -> HashMap<String, String> {
    let Some(prng) = message
        .get("data")
        .and_then(|data| data.get("prng"))
        .and_then(Value::as_str)
        .filter(|prng| !prng.is_empty())
    else {
        return HashMap::new();
    };

    let ranges: Vec<Value> = match serde_json::from_str(prng) {
        Ok(ranges) => ranges,
        Err(e) => {
            debug!(error = %e, "Ignoring malformed mention ranges");
            return HashMap::new();
        }
    };

    // Offsets and lengths count UTF-16 code units.
    let units: Vec<u16> = body.encode_utf16().collect();
    let mut mentions = HashMap::new();

    for range in &ranges {
        let Some(id) = id_string(range.get("i")) else {
            continue;
        };
        let (Some(offset), Some(length)) = (
            range.get("o").and_then(Value::as_f64),
            range.get("l").and_then(Value::as_f64),
        ) else {
            continue;
        };

        let (start, end) = substring_bounds(units.len(), offset, length);
        mentions.insert(id, String::from_utf16_lossy(&units[start..end]));
    }

    mentions
}

/// Bounds of `length` units from `offset`, clamped to `len`.
///
/// A negative offset counts back from the end; a negative length is empty.
fn substring_bounds(len: usize, offset: f64, length: f64) -> (usize, usize) {
    let len_f = len as f64;
    let offset = offset.trunc();
    let start = if offset < 0.0 {
        (len_f + offset).max(0.0)
    } else {
        offset.min(len_f)
    };
    let end = (start + length.trunc().max(0.0)).min(len_f);
    (start as usize, end as usize)
}
