use thiserror::Error;

/// Malformed payload or record data.
///
/// Always absorbed inside the decoder; callers only ever see fewer events.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("inner payload is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("unsupported attachment: {0}")]
    UnsupportedAttachment(String),
}

pub type DecodeResult<T> = Result<T, DecodeError>;
