//! Attachment merging and normalization.

use crate::{Attachment, DecodeError, DecodeResult, NormalizedAttachment};
use serde_json::{Map, Value};

/// Field holding the secondary JSON blob merged into each raw attachment.
const MERCURY_FIELD: &str = "mercuryJSON";

/// Shapes a merged attachment object into its normalized form.
pub trait AttachmentNormalizer: Send + Sync {
    fn normalize(&self, merged: &Map<String, Value>) -> DecodeResult<NormalizedAttachment>;
}

/// Merge the embedded blob into `raw` and normalize it.
///
/// Any failure yields the raw attachment unchanged.
pub(crate) fn resolve(raw: &Value, normalizer: &dyn AttachmentNormalizer) -> Attachment {
    match merge_mercury(raw).and_then(|merged| normalizer.normalize(&merged)) {
        Ok(normalized) => Attachment::Normalized(normalized),
        Err(e) => {
            tracing::debug!(error = %e, "Passing attachment through unnormalized");
            Attachment::Raw(raw.clone())
        }
    }
}

fn merge_mercury(raw: &Value) -> DecodeResult<Map<String, Value>> {
    let mut merged = raw
        .as_object()
        .cloned()
        .ok_or_else(|| DecodeError::UnsupportedAttachment("not an object".to_string()))?;

    let blob = merged
        .get(MERCURY_FIELD)
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingField(MERCURY_FIELD))?;

    match serde_json::from_str::<Value>(blob)? {
        Value::Object(fields) => merged.extend(fields),
        Value::Null => {}
        _ => {
            return Err(DecodeError::InvalidField {
                field: MERCURY_FIELD,
                reason: "expected an object".to_string(),
            })
        }
    }
    Ok(merged)
}

/// Built-in normalizer for the blob shapes the edge sends.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAttachmentNormalizer;

impl AttachmentNormalizer for DefaultAttachmentNormalizer {
    fn normalize(&self, merged: &Map<String, Value>) -> DecodeResult<NormalizedAttachment> {
        if let Some(blob) = merged.get("blob_attachment").and_then(Value::as_object) {
            let typename = str_field(blob, "__typename").unwrap_or_default();
            let kind = match typename.as_str() {
                "MessageImage" => "photo",
                "MessageAnimatedImage" => "animated_image",
                "MessageVideo" => "video",
                "MessageAudio" => "audio",
                "MessageFile" => "file",
                other => return Err(DecodeError::UnsupportedAttachment(other.to_string())),
            };
            return Ok(NormalizedAttachment {
                kind: kind.to_string(),
                id: str_field(blob, "legacy_attachment_id").or_else(|| str_field(merged, "fbid")),
                filename: str_field(blob, "filename"),
                mime_type: str_field(blob, "mimetype").or_else(|| str_field(merged, "mimeType")),
                url: uri_field(blob, &["large_preview", "animated_image", "playable_url"])
                    .or_else(|| str_field(blob, "url")),
                preview_url: uri_field(blob, &["preview", "thumbnail", "preview_image"]),
            });
        }

        if let Some(sticker) = merged.get("sticker_attachment").and_then(Value::as_object) {
            return Ok(NormalizedAttachment {
                kind: "sticker".to_string(),
                id: str_field(sticker, "id"),
                filename: None,
                mime_type: None,
                url: str_field(sticker, "url"),
                preview_url: uri_field(sticker, &["preview_image"]),
            });
        }

        if let Some(share) = merged.get("extensible_attachment").and_then(Value::as_object) {
            let story = share
                .get("story_attachment")
                .and_then(Value::as_object)
                .ok_or(DecodeError::MissingField("story_attachment"))?;
            return Ok(NormalizedAttachment {
                kind: "share".to_string(),
                id: str_field(share, "legacy_attachment_id"),
                filename: None,
                mime_type: None,
                url: str_field(story, "url"),
                preview_url: story
                    .get("media")
                    .and_then(Value::as_object)
                    .and_then(|media| uri_field(media, &["image"])),
            });
        }

        match str_field(merged, "attach_type") {
            Some(kind) => Ok(NormalizedAttachment {
                id: str_field(merged, "fbid").or_else(|| str_field(merged, "id")),
                filename: str_field(merged, "name"),
                mime_type: str_field(merged, "mimeType"),
                url: str_field(merged, "url"),
                preview_url: str_field(merged, "preview_url"),
                kind,
            }),
            None => Err(DecodeError::UnsupportedAttachment("unknown shape".to_string())),
        }
    }
}

/// String or number field as a string.
fn str_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First `{key: {uri}}` present among `keys`.
fn uri_field(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| object.get(*key).and_then(Value::as_object))
        .find_map(|nested| str_field(nested, "uri"))
}
