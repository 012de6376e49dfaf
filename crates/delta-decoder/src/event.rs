//! Domain events handed to the consumer.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Event kind tag, serialized as the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MessageReply,
}

/// A decoded message reply.
///
/// Built once per accepted record and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(rename = "threadID")]
    pub thread_id: String,
    #[serde(rename = "messageID")]
    pub message_id: String,
    #[serde(rename = "senderID")]
    pub sender_id: String,
    pub body: String,
    /// Whitespace-separated tokens of the trimmed body.
    pub args: Vec<String>,
    /// Mentioned user id to the mentioned text.
    pub mentions: HashMap<String, String>,
    /// Milliseconds since the epoch as sent by the edge.
    pub timestamp: i64,
    #[serde(rename = "participantIDs")]
    pub participant_ids: Vec<String>,
    pub attachments: Vec<Attachment>,
    #[serde(rename = "isGroup")]
    pub is_group: bool,
}

/// An attachment after normalization, or the raw object when that failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Attachment {
    Normalized(NormalizedAttachment),
    Raw(serde_json::Value),
}

impl Attachment {
    pub fn is_normalized(&self) -> bool {
        matches!(self, Attachment::Normalized(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedAttachment {
    /// photo, animated_image, video, audio, file, sticker or share.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "ID")]
    pub id: Option<String>,
    pub filename: Option<String>,
    pub mime_type: Option<String>,
    pub url: Option<String>,
    pub preview_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_wire_field_names() {
        let event = MessageEvent {
            kind: EventKind::MessageReply,
            thread_id: "42".to_string(),
            message_id: "mid.1".to_string(),
            sender_id: "7".to_string(),
            body: "hi".to_string(),
            args: vec!["hi".to_string()],
            mentions: HashMap::new(),
            timestamp: 1_700_000_000_000,
            participant_ids: vec!["7".to_string(), "8".to_string()],
            attachments: vec![],
            is_group: false,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "message_reply");
        assert_eq!(json["threadID"], "42");
        assert_eq!(json["messageID"], "mid.1");
        assert_eq!(json["senderID"], "7");
        assert_eq!(json["participantIDs"][1], "8");
        assert_eq!(json["isGroup"], false);
    }

    #[test]
    fn test_raw_attachment_serializes_unchanged() {
        let raw = serde_json::json!({"mercuryJSON": "{broken", "id": 3});
        let json = serde_json::to_value(Attachment::Raw(raw.clone())).unwrap();
        assert_eq!(json, raw);
    }
}
