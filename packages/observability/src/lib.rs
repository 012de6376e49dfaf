//! Process-wide tracing setup for the edge listener.
//!
//! Library crates only emit `tracing` events. The binary calls
//! [`init_with_config`] once, which installs a [`JsonLayer`] appending to the
//! central [`LogFile`] and, for foreground runs, a compact stderr layer.
//! Both honour `RUST_LOG` before the configured default level.
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "edge-listener".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! });
//! ```

mod json_layer;
mod writer;

use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub use json_layer::{JsonLayer, LogEntry};
pub use writer::{LogFile, LogFileGuard};

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Stamped on every JSONL line as `service`.
    pub service_name: String,
    /// Filter directive used when `RUST_LOG` is unset or unparsable.
    pub default_level: String,
    /// Overrides [`default_log_path`].
    pub log_path: Option<PathBuf>,
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: env!("CARGO_PKG_NAME").into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// `$HOME/.edge-listener/logs/listener.jsonl`
pub fn default_log_path() -> Option<PathBuf> {
    let mut path = dirs::home_dir()?;
    path.extend([".edge-listener", "logs", "listener.jsonl"]);
    Some(path)
}

fn level_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the global subscriber described by `config`.
///
/// An unopenable log file is reported on stderr and the JSONL layer is left
/// out. A second call finds a subscriber already installed and does nothing.
pub fn init_with_config(config: LogConfig) {
    let log_file = config
        .log_path
        .clone()
        .or_else(default_log_path)
        .and_then(|path| match LogFile::open(&path) {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("log file {} unavailable: {e}", path.display());
                None
            }
        });
    let log_path = log_file.as_ref().map(|file| file.path().to_path_buf());

    let json_layer = log_file.map(|file| {
        JsonLayer::new(config.service_name.as_str(), file)
            .with_filter(level_filter(&config.default_level))
    });
    let stderr_layer = config.also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(level_filter(&config.default_level))
    });

    let installed = tracing_subscriber::registry()
        .with(json_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!(service = %config.service_name, log_path = ?log_path, "Logging installed");
    }
}
