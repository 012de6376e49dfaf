//! Errors raised while resolving the listener's files and settings.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// A setting holds a value the session cannot run with.
    #[error("invalid setting `{field}`: {reason}")]
    InvalidSetting { field: &'static str, reason: String },

    #[error("`{field}` is not a valid URL: {source}")]
    InvalidUrl {
        field: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("config file {} is malformed: {source}", .path.display())]
    MalformedConfig {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not encode config: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    /// No home directory and no explicit base directory.
    #[error("cannot locate a home directory; pass --base-dir")]
    NoHomeDir,
}

pub type CoreResult<T> = Result<T, CoreError>;
